//! SeaORM Entity for the taxable_txs table. One row per value movement
//! within a message; either side may be absent.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "taxable_txs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub message_id: i32,
    #[sea_orm(column_type = "Decimal(Some((78, 0)))", nullable)]
    pub amount_sent: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((78, 0)))", nullable)]
    pub amount_received: Option<Decimal>,
    pub denomination_sent_id: Option<i32>,
    pub denomination_received_id: Option<i32>,
    pub sender_address_id: Option<i32>,
    pub receiver_address_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
