use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::infrastructure::persistence::entities::{failed_blocks, failed_event_blocks};
use crate::infrastructure::persistence::error::DbError;

/// Repository for the failure ledger: heights whose ingestion failed, kept
/// so the next run can reattempt them
#[derive(Clone)]
pub struct FailedBlockRepository {
    conn: DatabaseConnection,
}

impl FailedBlockRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Record a height whose tx ingestion failed. Insert if absent, no-op
    /// otherwise.
    pub async fn upsert_failed_block(&self, height: i64, chain_id: i32) -> Result<(), DbError> {
        let existing = failed_blocks::Entity::find()
            .filter(failed_blocks::Column::BlockchainId.eq(chain_id))
            .filter(failed_blocks::Column::Height.eq(height))
            .one(&self.conn)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let model = failed_blocks::ActiveModel {
            height: Set(height),
            blockchain_id: Set(chain_id),
            ..Default::default()
        };
        match model.insert(&self.conn).await {
            Ok(_) => Ok(()),
            // Two workers can fail the same height; one row is enough
            Err(e) if e.to_string().contains("duplicate key") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a height whose event ingestion failed
    pub async fn upsert_failed_event_block(
        &self,
        height: i64,
        chain_id: i32,
    ) -> Result<(), DbError> {
        let existing = failed_event_blocks::Entity::find()
            .filter(failed_event_blocks::Column::BlockchainId.eq(chain_id))
            .filter(failed_event_blocks::Column::Height.eq(height))
            .one(&self.conn)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let model = failed_event_blocks::ActiveModel {
            height: Set(height),
            blockchain_id: Set(chain_id),
            ..Default::default()
        };
        match model.insert(&self.conn).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("duplicate key") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All failed heights for the chain, lowest first
    pub async fn get_failed_blocks(&self, chain_id: i32) -> Result<Vec<i64>, DbError> {
        let rows = failed_blocks::Entity::find()
            .filter(failed_blocks::Column::BlockchainId.eq(chain_id))
            .order_by_asc(failed_blocks::Column::Height)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(|r| r.height).collect())
    }

    /// Remove a ledger row once its height has been re-enqueued; a height
    /// that fails again is re-recorded by the worker
    pub async fn delete_failed_block(&self, height: i64, chain_id: i32) -> Result<(), DbError> {
        failed_blocks::Entity::delete_many()
            .filter(failed_blocks::Column::BlockchainId.eq(chain_id))
            .filter(failed_blocks::Column::Height.eq(height))
            .exec(&self.conn)
            .await?;
        Ok(())
    }
}
