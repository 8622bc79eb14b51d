//! Extraction of relevant begin/end-block and epoch lifecycle events from
//! a block results response.
//!
//! Which event types matter is chain-specific; the relevance registry is
//! populated by the chain bootstrap and sealed together with the message
//! registry.

use std::collections::{HashMap, HashSet};

use crate::domain::models::events::{EventAttribute, EventOrigin, RelevantEvent};
use crate::domain::services::registry::RegistrySealed;
use crate::infrastructure::rpc::types::{AbciEvent, BlockResultsResponse};

/// Event types relevant for block and epoch indexing, per chain
pub struct EventRelevanceRegistry {
    begin_block: HashSet<String>,
    end_block: HashSet<String>,
    /// epoch identifier -> begin-blocker event types emitted at its boundary
    epoch: HashMap<String, HashSet<String>>,
    sealed: bool,
}

impl EventRelevanceRegistry {
    pub fn new() -> Self {
        Self {
            begin_block: HashSet::new(),
            end_block: HashSet::new(),
            epoch: HashMap::new(),
            sealed: false,
        }
    }

    pub fn relevant_begin_block(&mut self, event_type: &str) -> Result<(), RegistrySealed> {
        if self.sealed {
            return Err(RegistrySealed);
        }
        self.begin_block.insert(event_type.to_string());
        Ok(())
    }

    pub fn relevant_end_block(&mut self, event_type: &str) -> Result<(), RegistrySealed> {
        if self.sealed {
            return Err(RegistrySealed);
        }
        self.end_block.insert(event_type.to_string());
        Ok(())
    }

    pub fn relevant_epoch(
        &mut self,
        identifier: &str,
        event_type: &str,
    ) -> Result<(), RegistrySealed> {
        if self.sealed {
            return Err(RegistrySealed);
        }
        self.epoch
            .entry(identifier.to_string())
            .or_default()
            .insert(event_type.to_string());
        Ok(())
    }

    /// One-way switch; after this the registry is read-only
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    fn is_begin_relevant(&self, event_type: &str) -> bool {
        self.begin_block.contains(event_type)
    }

    fn is_end_relevant(&self, event_type: &str) -> bool {
        self.end_block.contains(event_type)
    }

    fn is_epoch_relevant(&self, identifier: &str, event_type: &str) -> bool {
        self.epoch
            .get(identifier)
            .map(|types| types.contains(event_type))
            .unwrap_or(false)
    }
}

impl Default for EventRelevanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the event types the chain's begin/end blockers and epochs emit
pub fn register_chain_event_handlers(
    registry: &mut EventRelevanceRegistry,
    chain_id: &str,
) -> Result<(), RegistrySealed> {
    if chain_id == super::messages::osmosis::CHAIN_ID {
        // Inflation minting happens in the begin blocker every block
        registry.relevant_begin_block("mint")?;
        // Daily epoch boundaries pay out rewards as transfer events
        registry.relevant_epoch("day", "transfer")?;
    }
    Ok(())
}

fn to_relevant(event: &AbciEvent, origin: EventOrigin) -> RelevantEvent {
    RelevantEvent {
        event_type: event.event_type.clone(),
        attributes: event
            .attributes
            .iter()
            .map(|a| EventAttribute {
                key: a.key.clone(),
                value: a.value.clone(),
            })
            .collect(),
        origin,
    }
}

/// Extract the begin/end-block events that pass the relevance predicate
pub fn process_block_events(
    block_results: &BlockResultsResponse,
    registry: &EventRelevanceRegistry,
) -> Vec<RelevantEvent> {
    let mut relevant = Vec::new();

    for event in block_results.begin_events() {
        if registry.is_begin_relevant(&event.event_type) {
            relevant.push(to_relevant(event, EventOrigin::BeginBlock));
        }
    }
    for event in block_results.end_events() {
        if registry.is_end_relevant(&event.event_type) {
            relevant.push(to_relevant(event, EventOrigin::EndBlock));
        }
    }

    relevant
}

/// Extract the begin/end-block events belonging to the given epoch
/// identifier
pub fn process_epoch_events(
    block_results: &BlockResultsResponse,
    identifier: &str,
    registry: &EventRelevanceRegistry,
) -> Vec<RelevantEvent> {
    let mut relevant = Vec::new();

    for event in block_results.begin_events() {
        if registry.is_epoch_relevant(identifier, &event.event_type) {
            relevant.push(to_relevant(event, EventOrigin::BeginBlock));
        }
    }
    for event in block_results.end_events() {
        if registry.is_epoch_relevant(identifier, &event.event_type) {
            relevant.push(to_relevant(event, EventOrigin::EndBlock));
        }
    }

    relevant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::rpc::types::AbciAttribute;

    fn block_results(begin: Vec<AbciEvent>, end: Vec<AbciEvent>) -> BlockResultsResponse {
        BlockResultsResponse {
            height: "100".to_string(),
            txs_results: None,
            begin_block_events: Some(begin),
            end_block_events: Some(end),
        }
    }

    fn event(event_type: &str) -> AbciEvent {
        AbciEvent {
            event_type: event_type.to_string(),
            attributes: vec![AbciAttribute {
                key: "amount".to_string(),
                value: "5uosmo".to_string(),
            }],
        }
    }

    #[test]
    fn filters_by_relevance_and_origin() {
        let mut registry = EventRelevanceRegistry::new();
        registry.relevant_begin_block("mint").unwrap();
        registry.relevant_end_block("liquidity_pool").unwrap();
        registry.seal();

        let results = block_results(
            vec![event("mint"), event("transfer")],
            vec![event("mint"), event("liquidity_pool")],
        );
        let relevant = process_block_events(&results, &registry);

        assert_eq!(relevant.len(), 2);
        assert_eq!(relevant[0].event_type, "mint");
        assert_eq!(relevant[0].origin, EventOrigin::BeginBlock);
        // "mint" in the end blocker is not registered as end-relevant
        assert_eq!(relevant[1].event_type, "liquidity_pool");
        assert_eq!(relevant[1].origin, EventOrigin::EndBlock);
    }

    #[test]
    fn epoch_events_are_scoped_to_their_identifier() {
        let mut registry = EventRelevanceRegistry::new();
        registry.relevant_epoch("day", "transfer").unwrap();
        registry.seal();

        let results = block_results(vec![event("transfer")], vec![]);

        assert_eq!(process_epoch_events(&results, "day", &registry).len(), 1);
        assert!(process_epoch_events(&results, "week", &registry).is_empty());
    }

    #[test]
    fn sealed_registry_rejects_mutation() {
        let mut registry = EventRelevanceRegistry::new();
        registry.seal();
        assert!(registry.relevant_begin_block("mint").is_err());
        assert!(registry.relevant_epoch("day", "transfer").is_err());
    }
}
