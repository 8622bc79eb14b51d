pub mod events;
pub mod tx;

pub use events::{EventAttribute, EventOrigin, RelevantEvent};
pub use tx::{FeeWrapper, MessageWrapper, TaxableTransfer, TxWrapper};
