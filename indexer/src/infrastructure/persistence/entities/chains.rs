//! SeaORM Entity for the chains table. One row per indexed chain, created
//! on the first run and immutable thereafter.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chains")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Chain ID string, unique (e.g. "osmosis-1")
    #[sea_orm(column_type = "Text", unique)]
    pub chain_id: String,
    #[sea_orm(column_type = "Text")]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
