//! SeaORM Entity for the epochs table. Rows are populated externally; the
//! indexer only reads them and flips `indexed`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "epochs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub blockchain_id: i32,
    #[sea_orm(column_type = "Text")]
    pub identifier: String,
    pub epoch_number: i64,
    pub start_height: i64,
    pub indexed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
