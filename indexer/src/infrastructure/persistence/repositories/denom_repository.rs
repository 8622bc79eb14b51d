use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::infrastructure::persistence::entities::denoms;
use crate::infrastructure::persistence::error::DbError;

/// Repository for denomination metadata
#[derive(Clone)]
pub struct DenomRepository {
    conn: DatabaseConnection,
}

impl DenomRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert or refresh metadata for a denom base. Used by the periodic
    /// refresh task; UNKNOWN placeholders get upgraded here.
    pub async fn upsert_denom(&self, base: &str, name: &str, symbol: &str) -> Result<(), DbError> {
        if let Some(existing) = denoms::Entity::find()
            .filter(denoms::Column::Base.eq(base))
            .one(&self.conn)
            .await?
        {
            let mut active: denoms::ActiveModel = existing.into();
            active.name = Set(name.to_string());
            active.symbol = Set(symbol.to_string());
            active.update(&self.conn).await?;
            return Ok(());
        }

        let model = denoms::ActiveModel {
            base: Set(base.to_string()),
            name: Set(name.to_string()),
            symbol: Set(symbol.to_string()),
            ..Default::default()
        };
        match model.insert(&self.conn).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("duplicate key") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
