pub mod address;
pub mod event_parser;
pub mod messages;
pub mod registry;
pub mod tx_parser;

pub use event_parser::EventRelevanceRegistry;
pub use registry::MessageRegistry;
pub use tx_parser::TxParser;
