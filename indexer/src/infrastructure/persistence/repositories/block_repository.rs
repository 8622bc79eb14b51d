//! Block persistence: the transactional writes behind the DB writer plus
//! the height probes the enqueuer schedules from.
//!
//! All writes are idempotent: blocks upsert on `(blockchain_id, height)`,
//! txes upsert on hash with their child rows replaced, and denoms, message
//! types and addresses are interned by natural key.

use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, Set, Statement, TransactionTrait,
};

use crate::domain::models::events::RelevantEvent;
use crate::domain::models::tx::TxWrapper;
use crate::infrastructure::persistence::entities::{
    addresses, block_event_attributes, block_events, blocks, denoms, fees, message_types,
    messages, taxable_txs, txes,
};
use crate::infrastructure::persistence::error::DbError;
use crate::utils::logging;

/// Timestamp sentinel marking a block row whose data never landed
const ZERO_TIME: &str = "0001-01-01T00:00:00+00:00";

/// Repository for block-rooted writes and the resume probes
#[derive(Clone)]
pub struct BlockRepository {
    conn: DatabaseConnection,
}

impl BlockRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Highest height with a fully indexed block, 0 when none
    pub async fn highest_indexed_height(&self, chain_id: i32) -> Result<i64, DbError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT COALESCE(MAX(height), 0)::bigint AS height FROM blocks \
                 WHERE blockchain_id = $1 AND indexed = true AND time_stamp != '{}'",
                ZERO_TIME
            ),
            [chain_id.into()],
        );

        let row = self.conn.query_one(stmt).await?;
        match row {
            Some(row) => Ok(row.try_get("", "height")?),
            None => Ok(0),
        }
    }

    /// True when the height is already indexed with a real timestamp
    pub async fn block_already_indexed(&self, height: i64, chain_id: i32) -> Result<bool, DbError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT count(*) > 0 AS present FROM blocks \
                 WHERE height = $1 AND blockchain_id = $2 AND indexed = true \
                 AND time_stamp != '{}'",
                ZERO_TIME
            ),
            [height.into(), chain_id.into()],
        );

        let row = self.conn.query_one(stmt).await?;
        match row {
            Some(row) => Ok(row.try_get("", "present")?),
            None => Ok(false),
        }
    }

    /// First height in `[start, end]` with no indexed block; `end + 1` when
    /// the whole range is covered
    pub async fn first_missing_height(
        &self,
        start: i64,
        end: i64,
        chain_id: i32,
    ) -> Result<i64, DbError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT COALESCE(MIN(s.height), $2 + 1)::bigint AS height \
                 FROM generate_series($1::bigint, $2::bigint) AS s(height) \
                 WHERE NOT EXISTS (\
                   SELECT 1 FROM blocks \
                   WHERE blocks.height = s.height AND blocks.blockchain_id = $3 \
                   AND blocks.indexed = true AND blocks.time_stamp != '{}')",
                ZERO_TIME
            ),
            [start.into(), end.into(), chain_id.into()],
        );

        let row = self.conn.query_one(stmt).await?;
        match row {
            Some(row) => Ok(row.try_get("", "height")?),
            None => Ok(start),
        }
    }

    /// Heights in `[start, end]` containing at least one message of the
    /// given type; used for selective reindexing
    pub async fn heights_with_message_type(
        &self,
        message_type: &str,
        start: i64,
        end: i64,
        chain_id: i32,
    ) -> Result<Vec<i64>, DbError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT DISTINCT blocks.height FROM blocks \
             JOIN txes ON txes.block_id = blocks.id \
             JOIN messages ON messages.tx_id = txes.id \
             JOIN message_types ON message_types.id = messages.message_type_id \
             WHERE message_types.message_type = $1 \
             AND blocks.height >= $2 AND blocks.height <= $3 \
             AND blocks.blockchain_id = $4 \
             ORDER BY blocks.height",
            [
                message_type.into(),
                start.into(),
                end.into(),
                chain_id.into(),
            ],
        );

        let rows = self.conn.query_all(stmt).await?;
        let mut heights = Vec::with_capacity(rows.len());
        for row in rows {
            heights.push(row.try_get("", "height")?);
        }
        Ok(heights)
    }

    /// Highest height with stored block events, 0 when none
    pub async fn highest_event_block_height(&self, chain_id: i32) -> Result<i64, DbError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT COALESCE(MAX(blocks.height), 0)::bigint AS height FROM blocks \
             JOIN block_events ON block_events.block_id = blocks.id \
             WHERE blocks.blockchain_id = $1",
            [chain_id.into()],
        );

        let row = self.conn.query_one(stmt).await?;
        match row {
            Some(row) => Ok(row.try_get("", "height")?),
            None => Ok(0),
        }
    }

    /// Persist a height's parsed transactions in one transaction. The block
    /// row flips to `indexed = true` only here.
    pub async fn index_new_block(
        &self,
        height: i64,
        block_time: DateTime<FixedOffset>,
        txs: &[TxWrapper],
        chain_id: i32,
    ) -> Result<(), DbError> {
        let txn = self.conn.begin().await?;

        let block_id = upsert_block(&txn, chain_id, height, block_time, true).await?;

        for wrapper in txs {
            let signer_address_id = match &wrapper.signer_address {
                Some(address) => Some(intern_address(&txn, address).await?),
                None => None,
            };

            let tx_id = upsert_tx(&txn, block_id, wrapper, signer_address_id).await?;
            replace_tx_children(&txn, tx_id, wrapper).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Persist a height's relevant block events in one transaction. The
    /// block row is created speculatively when absent; its `indexed` flag
    /// belongs to the tx pipeline and is left untouched.
    pub async fn index_block_events(
        &self,
        height: i64,
        block_time: DateTime<FixedOffset>,
        events: &[RelevantEvent],
        chain_id: i32,
    ) -> Result<(), DbError> {
        let txn = self.conn.begin().await?;

        let block_id = match blocks::Entity::find()
            .filter(blocks::Column::BlockchainId.eq(chain_id))
            .filter(blocks::Column::Height.eq(height))
            .one(&txn)
            .await?
        {
            Some(existing) => existing.id,
            None => {
                let model = blocks::ActiveModel {
                    height: Set(height),
                    blockchain_id: Set(chain_id),
                    time_stamp: Set(block_time),
                    indexed: Set(false),
                    ..Default::default()
                };
                model.insert(&txn).await?.id
            }
        };

        // Replace any previously stored events for this block
        let old_events = block_events::Entity::find()
            .filter(block_events::Column::BlockId.eq(block_id))
            .all(&txn)
            .await?;
        if !old_events.is_empty() {
            let old_ids: Vec<i32> = old_events.iter().map(|e| e.id).collect();
            block_event_attributes::Entity::delete_many()
                .filter(block_event_attributes::Column::BlockEventId.is_in(old_ids))
                .exec(&txn)
                .await?;
            block_events::Entity::delete_many()
                .filter(block_events::Column::BlockId.eq(block_id))
                .exec(&txn)
                .await?;
        }

        for (index, event) in events.iter().enumerate() {
            let event_model = block_events::ActiveModel {
                block_id: Set(block_id),
                event_index: Set(index as i32),
                event_type: Set(event.event_type.clone()),
                source: Set(event.origin.as_str().to_string()),
                ..Default::default()
            };
            let event_id = event_model.insert(&txn).await?.id;

            for (attr_index, attr) in event.attributes.iter().enumerate() {
                let attr_model = block_event_attributes::ActiveModel {
                    block_event_id: Set(event_id),
                    key: Set(attr.key.clone()),
                    value: Set(attr.value.clone()),
                    attr_index: Set(attr_index as i32),
                    ..Default::default()
                };
                attr_model.insert(&txn).await?;
            }
        }

        txn.commit().await?;
        Ok(())
    }
}

async fn upsert_block<C: ConnectionTrait>(
    conn: &C,
    chain_id: i32,
    height: i64,
    block_time: DateTime<FixedOffset>,
    indexed: bool,
) -> Result<i32, DbError> {
    if let Some(existing) = blocks::Entity::find()
        .filter(blocks::Column::BlockchainId.eq(chain_id))
        .filter(blocks::Column::Height.eq(height))
        .one(conn)
        .await?
    {
        let id = existing.id;
        let mut active: blocks::ActiveModel = existing.into();
        active.time_stamp = Set(block_time);
        active.indexed = Set(indexed);
        active.update(conn).await?;
        return Ok(id);
    }

    let model = blocks::ActiveModel {
        height: Set(height),
        blockchain_id: Set(chain_id),
        time_stamp: Set(block_time),
        indexed: Set(indexed),
        ..Default::default()
    };
    Ok(model.insert(conn).await?.id)
}

async fn upsert_tx<C: ConnectionTrait>(
    conn: &C,
    block_id: i32,
    wrapper: &TxWrapper,
    signer_address_id: Option<i32>,
) -> Result<i32, DbError> {
    if let Some(existing) = txes::Entity::find()
        .filter(txes::Column::Hash.eq(wrapper.hash.as_str()))
        .one(conn)
        .await?
    {
        let id = existing.id;
        let mut active: txes::ActiveModel = existing.into();
        active.code = Set(wrapper.code as i64);
        active.block_id = Set(block_id);
        active.signer_address_id = Set(signer_address_id);
        active.update(conn).await?;
        return Ok(id);
    }

    let model = txes::ActiveModel {
        hash: Set(wrapper.hash.clone()),
        code: Set(wrapper.code as i64),
        block_id: Set(block_id),
        signer_address_id: Set(signer_address_id),
        ..Default::default()
    };
    Ok(model.insert(conn).await?.id)
}

/// Delete and re-insert the messages, taxable rows and fees of a tx so a
/// replay lands in the same terminal state
async fn replace_tx_children<C: ConnectionTrait>(
    conn: &C,
    tx_id: i32,
    wrapper: &TxWrapper,
) -> Result<(), DbError> {
    let old_messages = messages::Entity::find()
        .filter(messages::Column::TxId.eq(tx_id))
        .all(conn)
        .await?;
    if !old_messages.is_empty() {
        let old_ids: Vec<i32> = old_messages.iter().map(|m| m.id).collect();
        taxable_txs::Entity::delete_many()
            .filter(taxable_txs::Column::MessageId.is_in(old_ids))
            .exec(conn)
            .await?;
        messages::Entity::delete_many()
            .filter(messages::Column::TxId.eq(tx_id))
            .exec(conn)
            .await?;
    }
    fees::Entity::delete_many()
        .filter(fees::Column::TxId.eq(tx_id))
        .exec(conn)
        .await?;

    for message in &wrapper.messages {
        let message_type_id = intern_message_type(conn, &message.message_type).await?;
        let message_model = messages::ActiveModel {
            tx_id: Set(tx_id),
            message_type_id: Set(message_type_id),
            message_index: Set(message.message_index as i32),
            ..Default::default()
        };
        let message_id = message_model.insert(conn).await?.id;

        for transfer in &message.transfers {
            let denomination_sent_id = match &transfer.denomination_sent {
                Some(base) => Some(intern_denom(conn, base).await?),
                None => None,
            };
            let denomination_received_id = match &transfer.denomination_received {
                Some(base) => Some(intern_denom(conn, base).await?),
                None => None,
            };
            let sender_address_id = match &transfer.sender_address {
                Some(address) => Some(intern_address(conn, address).await?),
                None => None,
            };
            let receiver_address_id = match &transfer.receiver_address {
                Some(address) => Some(intern_address(conn, address).await?),
                None => None,
            };

            let taxable_model = taxable_txs::ActiveModel {
                message_id: Set(message_id),
                amount_sent: Set(transfer.amount_sent),
                amount_received: Set(transfer.amount_received),
                denomination_sent_id: Set(denomination_sent_id),
                denomination_received_id: Set(denomination_received_id),
                sender_address_id: Set(sender_address_id),
                receiver_address_id: Set(receiver_address_id),
                ..Default::default()
            };
            taxable_model.insert(conn).await?;
        }
    }

    for fee in &wrapper.fees {
        let denomination_id = intern_denom(conn, &fee.denomination).await?;
        // The payer can be unresolvable when address derivation failed
        let payer_address_id = if fee.payer_address.is_empty() {
            None
        } else {
            Some(intern_address(conn, &fee.payer_address).await?)
        };
        let fee_model = fees::ActiveModel {
            tx_id: Set(tx_id),
            amount: Set(fee.amount),
            denomination_id: Set(denomination_id),
            payer_address_id: Set(payer_address_id),
            ..Default::default()
        };
        fee_model.insert(conn).await?;
    }

    Ok(())
}

async fn intern_address<C: ConnectionTrait>(conn: &C, address: &str) -> Result<i32, DbError> {
    if let Some(existing) = addresses::Entity::find()
        .filter(addresses::Column::Address.eq(address))
        .one(conn)
        .await?
    {
        return Ok(existing.id);
    }

    let model = addresses::ActiveModel {
        address: Set(address.to_string()),
        ..Default::default()
    };
    Ok(model.insert(conn).await?.id)
}

async fn intern_message_type<C: ConnectionTrait>(
    conn: &C,
    message_type: &str,
) -> Result<i32, DbError> {
    if let Some(existing) = message_types::Entity::find()
        .filter(message_types::Column::MessageType.eq(message_type))
        .one(conn)
        .await?
    {
        return Ok(existing.id);
    }

    let model = message_types::ActiveModel {
        message_type: Set(message_type.to_string()),
        ..Default::default()
    };
    Ok(model.insert(conn).await?.id)
}

/// Resolve a denom base, inserting an UNKNOWN placeholder on first sight
/// of a base we have no metadata for
async fn intern_denom<C: ConnectionTrait>(conn: &C, base: &str) -> Result<i32, DbError> {
    if let Some(existing) = denoms::Entity::find()
        .filter(denoms::Column::Base.eq(base))
        .one(conn)
        .await?
    {
        return Ok(existing.id);
    }

    logging::log_warning(&format!(
        "Denom lookup failed for base {}. Will be inserted as UNKNOWN",
        base
    ));
    let model = denoms::ActiveModel {
        base: Set(base.to_string()),
        name: Set("UNKNOWN".to_string()),
        symbol: Set("UNKNOWN".to_string()),
        ..Default::default()
    };
    Ok(model.insert(conn).await?.id)
}
