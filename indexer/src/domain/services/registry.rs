//! Message type registry: maps a type URL to an ordered list of decoder
//! factories plus the set of types ignored for taxable parsing.
//!
//! The registry is populated once by the chain bootstrap, sealed, and then
//! shared immutably across the worker pool.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;

use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::TaxableTransfer;
use crate::infrastructure::rpc::types::AbciEvent;

/// A decoder for one message family. A fresh instance is produced per
/// message; `decode` fills the instance, `transfers` reads it back.
pub trait MessageDecoder: Send {
    fn decode(
        &mut self,
        type_url: &str,
        message: &Value,
        events: &[AbciEvent],
    ) -> Result<(), ParseError>;

    fn transfers(&self) -> Vec<TaxableTransfer>;
}

/// Produces a fresh decoder per message offered
pub type DecoderFactory = fn() -> Box<dyn MessageDecoder>;

/// Error raised on registry mutation after sealing
#[derive(Debug)]
pub struct RegistrySealed;

impl fmt::Display for RegistrySealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message registry is sealed")
    }
}

impl Error for RegistrySealed {}

/// Outcome of decoding one message through the registry
#[derive(Debug)]
pub struct DecodedMessage {
    pub type_url: String,
    pub transfers: Vec<TaxableTransfer>,
}

pub struct MessageRegistry {
    handlers: HashMap<String, Vec<DecoderFactory>>,
    ignored: HashSet<String>,
    sealed: bool,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            ignored: HashSet::new(),
            sealed: false,
        }
    }

    /// Append a factory for a type URL
    pub fn register(&mut self, type_url: &str, factory: DecoderFactory) -> Result<(), RegistrySealed> {
        if self.sealed {
            return Err(RegistrySealed);
        }
        self.handlers
            .entry(type_url.to_string())
            .or_default()
            .push(factory);
        Ok(())
    }

    /// Prepend a factory so it gets first attempt; used by chain-specific
    /// bootstraps to shadow the generic handlers
    pub fn register_first(
        &mut self,
        type_url: &str,
        factory: DecoderFactory,
    ) -> Result<(), RegistrySealed> {
        if self.sealed {
            return Err(RegistrySealed);
        }
        self.handlers
            .entry(type_url.to_string())
            .or_default()
            .insert(0, factory);
        Ok(())
    }

    /// Mark a type URL as not taxable; it is skipped by the parser but
    /// still counts for fee attribution
    pub fn ignore(&mut self, type_url: &str) -> Result<(), RegistrySealed> {
        if self.sealed {
            return Err(RegistrySealed);
        }
        self.ignored.insert(type_url.to_string());
        Ok(())
    }

    /// One-way switch; after this the registry is read-only
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_ignored(&self, type_url: &str) -> bool {
        self.ignored.contains(type_url)
    }

    /// Decode a single message. Factories are tried in order; the first
    /// decoder that succeeds wins. A URL with no factories yields
    /// `UnknownMessage`; a URL whose factories all fail yields
    /// `DecoderFailed` (fatal upstream: we advertise support we cannot
    /// deliver).
    pub fn decode_message(
        &self,
        message: &Value,
        events: &[AbciEvent],
    ) -> Result<DecodedMessage, ParseError> {
        let type_url = message
            .get("@type")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::MalformedField("message has no @type".to_string()))?
            .to_string();

        let factories = match self.handlers.get(&type_url) {
            Some(list) if !list.is_empty() => list,
            _ => return Err(ParseError::UnknownMessage(type_url)),
        };

        let mut last_reason = String::new();
        for factory in factories {
            let mut decoder = factory();
            match decoder.decode(&type_url, message, events) {
                Ok(()) => {
                    return Ok(DecodedMessage {
                        transfers: decoder.transfers(),
                        type_url,
                    })
                }
                Err(e) => last_reason = e.to_string(),
            }
        }

        Err(ParseError::DecoderFailed {
            type_url,
            reason: last_reason,
        })
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AlwaysFails;
    impl MessageDecoder for AlwaysFails {
        fn decode(&mut self, _: &str, _: &Value, _: &[AbciEvent]) -> Result<(), ParseError> {
            Err(ParseError::MalformedField("nope".to_string()))
        }
        fn transfers(&self) -> Vec<TaxableTransfer> {
            Vec::new()
        }
    }

    struct AlwaysSucceeds;
    impl MessageDecoder for AlwaysSucceeds {
        fn decode(&mut self, _: &str, _: &Value, _: &[AbciEvent]) -> Result<(), ParseError> {
            Ok(())
        }
        fn transfers(&self) -> Vec<TaxableTransfer> {
            vec![TaxableTransfer {
                sender_address: Some("winner".to_string()),
                ..Default::default()
            }]
        }
    }

    #[test]
    fn unknown_type_url_is_reported() {
        let registry = MessageRegistry::new();
        let msg = json!({"@type": "/cosmos.bank.v1beta1.MsgSend"});
        match registry.decode_message(&msg, &[]) {
            Err(ParseError::UnknownMessage(url)) => {
                assert_eq!(url, "/cosmos.bank.v1beta1.MsgSend")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn first_successful_factory_wins() {
        let mut registry = MessageRegistry::new();
        registry
            .register("/test.Msg", || Box::new(AlwaysFails))
            .unwrap();
        registry
            .register("/test.Msg", || Box::new(AlwaysSucceeds))
            .unwrap();

        let decoded = registry
            .decode_message(&json!({"@type": "/test.Msg"}), &[])
            .unwrap();
        assert_eq!(decoded.transfers.len(), 1);
    }

    #[test]
    fn chain_specific_factories_get_first_attempt() {
        let mut registry = MessageRegistry::new();
        registry
            .register("/test.Msg", || Box::new(AlwaysFails))
            .unwrap();
        registry
            .register_first("/test.Msg", || Box::new(AlwaysSucceeds))
            .unwrap();

        let decoded = registry
            .decode_message(&json!({"@type": "/test.Msg"}), &[])
            .unwrap();
        assert_eq!(
            decoded.transfers[0].sender_address.as_deref(),
            Some("winner")
        );
    }

    #[test]
    fn all_factories_failing_is_a_decoder_failure() {
        let mut registry = MessageRegistry::new();
        registry
            .register("/test.Msg", || Box::new(AlwaysFails))
            .unwrap();

        match registry.decode_message(&json!({"@type": "/test.Msg"}), &[]) {
            Err(ParseError::DecoderFailed { type_url, .. }) => assert_eq!(type_url, "/test.Msg"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn sealed_registry_rejects_mutation() {
        let mut registry = MessageRegistry::new();
        registry.seal();
        assert!(registry.register("/test.Msg", || Box::new(AlwaysSucceeds)).is_err());
        assert!(registry.ignore("/test.Msg").is_err());
        assert!(registry.is_sealed());
    }
}
