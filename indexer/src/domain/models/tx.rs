//! Normalized transaction shapes flowing from the parsers to the DB writer.
//!
//! These carry denoms and addresses as plain strings; the writer interns
//! them against the database so that workers never write.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;

/// One value movement extracted from a message. Either side may be absent
/// depending on the message semantics (e.g. a delegate has no received
/// side).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxableTransfer {
    pub amount_sent: Option<Decimal>,
    pub denomination_sent: Option<String>,
    pub amount_received: Option<Decimal>,
    pub denomination_received: Option<String>,
    /// Lower-cased at construction time
    pub sender_address: Option<String>,
    /// Lower-cased at construction time
    pub receiver_address: Option<String>,
}

/// One message of a transaction, with whatever taxable content its decoder
/// extracted. An unknown or ignored message keeps its type URL and an empty
/// transfer list.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageWrapper {
    pub message_type: String,
    pub message_index: usize,
    pub transfers: Vec<TaxableTransfer>,
}

/// One fee paid by a transaction. Zero-amount fees are never constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeWrapper {
    pub amount: Decimal,
    pub denomination: String,
    /// Canonical bech32 case is preserved for the payer
    pub payer_address: String,
}

/// A fully parsed transaction ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct TxWrapper {
    /// Uppercase hex of the SHA-256 of the raw tx bytes
    pub hash: String,
    /// ABCI response code; 0 is success
    pub code: u32,
    /// Empty when code != 0
    pub messages: Vec<MessageWrapper>,
    pub fees: Vec<FeeWrapper>,
    /// The fee payer, canonical bech32 case
    pub signer_address: Option<String>,
}

/// Output of a tx worker for one height
#[derive(Debug, Clone)]
pub struct TxBatch {
    pub height: i64,
    pub block_time: DateTime<FixedOffset>,
    pub txs: Vec<TxWrapper>,
}

/// Output of the block event loop for one height
#[derive(Debug, Clone)]
pub struct BlockEventBatch {
    pub height: i64,
    pub block_time: DateTime<FixedOffset>,
    pub events: Vec<super::events::RelevantEvent>,
}

/// Output of the epoch event loop for one epoch boundary
#[derive(Debug, Clone)]
pub struct EpochEventBatch {
    pub height: i64,
    pub block_time: DateTime<FixedOffset>,
    pub events: Vec<super::events::RelevantEvent>,
    pub epoch_number: i64,
    pub epoch_identifier: String,
}
