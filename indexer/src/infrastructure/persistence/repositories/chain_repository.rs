use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::infrastructure::persistence::entities::chains;
use crate::infrastructure::persistence::error::DbError;

/// Repository for chain rows
#[derive(Clone)]
pub struct ChainRepository {
    conn: DatabaseConnection,
}

impl ChainRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Return the database id for the chain, creating the row on first
    /// sight. The row is immutable once created.
    pub async fn get_or_create_chain(&self, chain_id: &str, name: &str) -> Result<i32, DbError> {
        if let Some(existing) = chains::Entity::find()
            .filter(chains::Column::ChainId.eq(chain_id))
            .one(&self.conn)
            .await?
        {
            return Ok(existing.id);
        }

        let model = chains::ActiveModel {
            chain_id: Set(chain_id.to_string()),
            name: Set(name.to_string()),
            ..Default::default()
        };

        match model.insert(&self.conn).await {
            Ok(created) => Ok(created.id),
            Err(e) => {
                // Another run may have raced us; re-read before giving up
                if e.to_string().contains("duplicate key") {
                    chains::Entity::find()
                        .filter(chains::Column::ChainId.eq(chain_id))
                        .one(&self.conn)
                        .await?
                        .map(|c| c.id)
                        .ok_or_else(|| DbError::MissingRow(format!("chain {}", chain_id)))
                } else {
                    Err(e.into())
                }
            }
        }
    }
}
