pub mod addresses;
pub mod block_event_attributes;
pub mod block_events;
pub mod blocks;
pub mod chains;
pub mod denoms;
pub mod epochs;
pub mod failed_blocks;
pub mod failed_event_blocks;
pub mod fees;
pub mod message_types;
pub mod messages;
pub mod taxable_txs;
pub mod txes;
