use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::infrastructure::persistence::entities::epochs;
use crate::infrastructure::persistence::error::DbError;

/// Repository for epoch rows. Rows are populated externally; the indexer
/// reads them and flips `indexed` once their boundary events are stored.
#[derive(Clone)]
pub struct EpochRepository {
    conn: DatabaseConnection,
}

impl EpochRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Unindexed epochs for the identifier with
    /// `epoch_number ∈ [start, end]`, lowest first
    pub async fn unindexed_epochs(
        &self,
        chain_id: i32,
        identifier: &str,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Vec<epochs::Model>, DbError> {
        let rows = epochs::Entity::find()
            .filter(epochs::Column::BlockchainId.eq(chain_id))
            .filter(epochs::Column::Identifier.eq(identifier))
            .filter(epochs::Column::EpochNumber.gte(start_epoch))
            .filter(epochs::Column::EpochNumber.lte(end_epoch))
            .filter(epochs::Column::Indexed.eq(false))
            .order_by_asc(epochs::Column::EpochNumber)
            .all(&self.conn)
            .await?;
        Ok(rows)
    }

    /// Mark an epoch's boundary events as persisted
    pub async fn mark_epoch_indexed(
        &self,
        chain_id: i32,
        identifier: &str,
        epoch_number: i64,
    ) -> Result<(), DbError> {
        let existing = epochs::Entity::find()
            .filter(epochs::Column::BlockchainId.eq(chain_id))
            .filter(epochs::Column::Identifier.eq(identifier))
            .filter(epochs::Column::EpochNumber.eq(epoch_number))
            .one(&self.conn)
            .await?;

        match existing {
            Some(model) => {
                let mut active: epochs::ActiveModel = model.into();
                active.indexed = Set(true);
                active.update(&self.conn).await?;
                Ok(())
            }
            None => Err(DbError::MissingRow(format!(
                "epoch {} for identifier {}",
                epoch_number, identifier
            ))),
        }
    }
}
