pub mod client;
pub mod error;
pub mod types;

pub use client::{NodeClient, NodeClientConfig};
pub use error::RpcError;
