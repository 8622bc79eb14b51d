//! SeaORM Entity for the failed_blocks table: heights whose tx ingestion
//! failed, re-enqueued by the next run.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "failed_blocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub height: i64,
    pub blockchain_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
