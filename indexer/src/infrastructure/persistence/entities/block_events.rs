//! SeaORM Entity for the block_events table. Only events that passed the
//! chain relevance predicate are stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "block_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub block_id: i32,
    pub event_index: i32,
    #[sea_orm(column_type = "Text")]
    pub event_type: String,
    /// "begin_block" or "end_block"
    #[sea_orm(column_type = "Text")]
    pub source: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
