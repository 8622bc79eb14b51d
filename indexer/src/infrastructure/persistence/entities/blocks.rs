//! SeaORM Entity for the blocks table.
//!
//! `indexed` flips to true only once the full tx wrapper for the height has
//! been persisted; a zero timestamp marks a speculative row the resume
//! logic must not count.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub height: i64,
    pub blockchain_id: i32,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub time_stamp: DateTimeWithTimeZone,
    pub indexed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
