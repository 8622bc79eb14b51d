//! Transaction parsing: turns RPC payloads into normalized `TxWrapper`s.
//!
//! Two entry points cover the two query shapes the worker uses. The
//! preferred path consumes the tx service response directly; the fallback
//! path consumes raw block txs (decoded through the codec endpoint) paired
//! positionally with the block results. Both paths must produce the same
//! wrapper for a successful tx.
//!
//! The parser performs no database I/O: denoms and addresses travel as
//! strings and are interned by the DB writer.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::{FeeWrapper, MessageWrapper, TxWrapper};
use crate::domain::services::address::{derive_bech32_from_pubkey, is_legacy_amino_multisig};
use crate::domain::services::registry::MessageRegistry;
use crate::infrastructure::rpc::types::{
    AbciEvent, AuthInfo, BlockResultsResponse, Tx, TxLog, TxsByHeightResponse,
};
use crate::utils::logging;

/// Message body fields that identify the signing account, in the order the
/// SDK's per-message signer derivation checks them
const SIGNER_FIELDS: &[&str] = &[
    "from_address",
    "delegator_address",
    "depositor",
    "proposer",
    "sender",
    "voter",
    "grantee",
];

pub struct TxParser {
    registry: Arc<MessageRegistry>,
    account_prefix: String,
}

impl TxParser {
    pub fn new(registry: Arc<MessageRegistry>, account_prefix: &str) -> Self {
        Self {
            registry,
            account_prefix: account_prefix.to_string(),
        }
    }

    /// Preferred path: the tx service response carries decoded txs, their
    /// ABCI logs and the block timestamp. Returns the wrappers plus the
    /// block time taken from the first tx (None for an empty block).
    pub fn process_txs_response(
        &self,
        response: &TxsByHeightResponse,
    ) -> Result<(Vec<TxWrapper>, Option<DateTime<FixedOffset>>), ParseError> {
        if response.txs.len() != response.tx_responses.len() {
            return Err(ParseError::Inconsistency(format!(
                "tx service returned {} txs but {} tx responses",
                response.txs.len(),
                response.tx_responses.len()
            )));
        }

        let mut block_time = None;
        let mut wrappers = Vec::with_capacity(response.txs.len());

        for (tx, tx_response) in response.txs.iter().zip(response.tx_responses.iter()) {
            if block_time.is_none() {
                block_time = Some(parse_rfc3339(&tx_response.timestamp)?);
            }
            wrappers.push(self.process_tx(
                &tx_response.txhash,
                tx_response.code,
                tx,
                &tx_response.logs,
            )?);
        }

        Ok((wrappers, block_time))
    }

    /// Fallback path: txs decoded from the raw block, paired positionally
    /// with the block results. The hash accompanies each decoded tx
    /// (uppercase hex SHA-256 of the raw bytes, matching what the tx
    /// service reports).
    pub fn process_block_txs(
        &self,
        decoded_txs: &[(String, Tx)],
        block_results: &BlockResultsResponse,
    ) -> Result<Vec<TxWrapper>, ParseError> {
        let tx_results = block_results.tx_results();
        if decoded_txs.len() != tx_results.len() {
            return Err(ParseError::Inconsistency(format!(
                "block carries {} txs but block results carry {}",
                decoded_txs.len(),
                tx_results.len()
            )));
        }

        let mut wrappers = Vec::with_capacity(decoded_txs.len());
        for ((hash, tx), tx_result) in decoded_txs.iter().zip(tx_results.iter()) {
            // Failed txs have no JSON in their log field; their messages are
            // skipped entirely so the logs are never needed
            let logs: Vec<TxLog> = if tx_result.code == 0 {
                serde_json::from_str(&tx_result.log).map_err(|_| {
                    ParseError::MalformedField("tx logs could not be parsed".to_string())
                })?
            } else {
                Vec::new()
            };

            wrappers.push(self.process_tx(hash, tx_result.code, tx, &logs)?);
        }

        Ok(wrappers)
    }

    /// Parse one tx: messages through the registry (successful txs only),
    /// then fees and the signer from the auth info
    fn process_tx(
        &self,
        hash: &str,
        code: u32,
        tx: &Tx,
        logs: &[TxLog],
    ) -> Result<TxWrapper, ParseError> {
        let mut messages = Vec::new();

        // A single failed message fails the whole tx, so nonzero codes
        // carry no taxable content; fees still apply below
        if code == 0 {
            for (index, message) in tx.body.messages.iter().enumerate() {
                let events = message_log_for_index(logs, index);
                match self.registry.decode_message(message, events) {
                    Ok(decoded) => messages.push(MessageWrapper {
                        message_type: decoded.type_url,
                        message_index: index,
                        transfers: decoded.transfers,
                    }),
                    Err(ParseError::UnknownMessage(type_url)) => {
                        if !self.registry.is_ignored(&type_url) {
                            logging::log_warning(&format!(
                                "No message handler for type '{}' (tx {})",
                                type_url, hash
                            ));
                        }
                        messages.push(MessageWrapper {
                            message_type: type_url,
                            message_index: index,
                            transfers: Vec::new(),
                        });
                    }
                    Err(e) => {
                        // A failing decoder for a type we advertise support
                        // for poisons the dataset; surface it as fatal
                        logging::log_error(&format!(
                            "Message parsing failed for a supported type in tx {}: {}",
                            hash, e
                        ));
                        return Err(e);
                    }
                }
            }
        }

        let signers = signer_candidates(&tx.body.messages);
        let signer_address = self.fee_payer(&tx.auth_info, &signers);
        let fees = self.process_fees(&tx.auth_info, signer_address.as_deref())?;

        Ok(TxWrapper {
            hash: hash.to_string(),
            code,
            messages,
            fees,
            signer_address,
        })
    }

    /// Fee payer resolution: the explicit payer wins; else the first signer
    /// address when the first signer info carries no public key; else the
    /// address derived from the first signer's public key, unwrapping a
    /// legacy-amino multisig to its first inner key.
    fn fee_payer(&self, auth_info: &AuthInfo, signers: &[String]) -> Option<String> {
        if let Some(fee) = &auth_info.fee {
            if !fee.payer.is_empty() {
                return Some(fee.payer.clone());
            }
        }

        let first_signer = auth_info.signer_infos.first();
        match first_signer.and_then(|si| si.public_key.as_ref()) {
            None if !signers.is_empty() => Some(signers[0].clone()),
            None => None,
            Some(pubkey) => {
                let multisig = is_legacy_amino_multisig(
                    first_signer.and_then(|si| si.mode_info.as_ref()),
                );
                match derive_bech32_from_pubkey(pubkey, &self.account_prefix, multisig) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        logging::log_error(&format!(
                            "Error deriving signer address from public key: {}",
                            e
                        ));
                        None
                    }
                }
            }
        }
    }

    /// Fees from the auth info; zero-amount fees are dropped
    fn process_fees(
        &self,
        auth_info: &AuthInfo,
        payer: Option<&str>,
    ) -> Result<Vec<FeeWrapper>, ParseError> {
        let fee = match &auth_info.fee {
            Some(fee) => fee,
            None => return Ok(Vec::new()),
        };

        let mut fees = Vec::new();
        for coin in &fee.amount {
            let amount = coin
                .amount
                .parse::<Decimal>()
                .map_err(|e| ParseError::MalformedField(format!("fee amount: {}", e)))?;

            // Some chains allow fee-less txs; a zero entry is not a fee
            if amount.is_zero() {
                continue;
            }

            fees.push(FeeWrapper {
                amount,
                denomination: coin.denom.clone(),
                payer_address: payer.unwrap_or_default().to_string(),
            });
        }

        Ok(fees)
    }
}

/// The event log for a message, matched by its index in the tx body.
/// Missing logs (e.g. sparse arrays from older nodes) yield no events.
fn message_log_for_index(logs: &[TxLog], index: usize) -> &[AbciEvent] {
    logs.iter()
        .find(|l| l.msg_index as usize == index)
        .map(|l| l.events.as_slice())
        .unwrap_or(&[])
}

/// Candidate signing accounts extracted from the message bodies, first
/// message first. Mirrors the SDK's per-message signer derivation.
fn signer_candidates(messages: &[Value]) -> Vec<String> {
    let mut candidates = Vec::new();
    for message in messages {
        for field in SIGNER_FIELDS {
            if let Some(address) = message.get(*field).and_then(Value::as_str) {
                if !candidates.iter().any(|c| c == address) {
                    candidates.push(address.to_string());
                }
                break;
            }
        }
    }
    candidates
}

fn parse_rfc3339(value: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| ParseError::MalformedField(format!("timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::messages;
    use crate::infrastructure::rpc::types::{Coin, SignerInfo, TxBody, TxFee, TxResponse, TxResult};
    use serde_json::json;

    const KEY_B64: &str = "Anm+Zn753LusVaBilc6HCwcCm/zbLc4o2VnygVsW+BeY";

    fn parser() -> TxParser {
        let mut registry = messages::standard_registry().unwrap();
        registry.seal();
        TxParser::new(Arc::new(registry), "osmo")
    }

    fn send_message() -> Value {
        json!({
            "@type": "/cosmos.bank.v1beta1.MsgSend",
            "from_address": "osmo1sender",
            "to_address": "osmo1receiver",
            "amount": [{"denom": "uosmo", "amount": "1000"}],
        })
    }

    fn auth_info(payer: &str, fee_amount: &str) -> AuthInfo {
        AuthInfo {
            signer_infos: vec![SignerInfo {
                public_key: Some(json!({"@type": "/cosmos.crypto.secp256k1.PubKey", "key": KEY_B64})),
                mode_info: Some(json!({"single": {"mode": "SIGN_MODE_DIRECT"}})),
            }],
            fee: Some(TxFee {
                amount: vec![Coin {
                    denom: "uosmo".to_string(),
                    amount: fee_amount.to_string(),
                }],
                payer: payer.to_string(),
                granter: String::new(),
            }),
        }
    }

    fn tx_with(messages: Vec<Value>, auth: AuthInfo) -> Tx {
        Tx {
            body: TxBody { messages },
            auth_info: auth,
        }
    }

    fn send_log() -> TxLog {
        TxLog {
            msg_index: 0,
            events: Vec::new(),
        }
    }

    #[test]
    fn successful_tx_keeps_every_body_message() {
        let parser = parser();
        let response = TxsByHeightResponse {
            txs: vec![tx_with(
                vec![send_message(), send_message()],
                auth_info("osmo1payer", "5000"),
            )],
            tx_responses: vec![TxResponse {
                height: "100".to_string(),
                txhash: "AB12".to_string(),
                code: 0,
                raw_log: String::new(),
                logs: vec![send_log()],
                timestamp: "2023-06-01T12:00:00Z".to_string(),
            }],
        };

        let (wrappers, block_time) = parser.process_txs_response(&response).unwrap();
        assert_eq!(wrappers.len(), 1);
        assert!(block_time.is_some());
        assert_eq!(wrappers[0].messages.len(), 2);
        assert_eq!(wrappers[0].messages[1].message_index, 1);
        assert_eq!(wrappers[0].fees.len(), 1);
        assert_eq!(wrappers[0].signer_address.as_deref(), Some("osmo1payer"));
    }

    #[test]
    fn failed_tx_has_no_messages_but_keeps_fees() {
        let parser = parser();
        let decoded = vec![(
            "DEAD".to_string(),
            tx_with(vec![send_message()], auth_info("osmo1payer", "5000")),
        )];
        let results = BlockResultsResponse {
            height: "100".to_string(),
            txs_results: Some(vec![TxResult {
                code: 1,
                log: "out of gas".to_string(),
            }]),
            begin_block_events: None,
            end_block_events: None,
        };

        let wrappers = parser.process_block_txs(&decoded, &results).unwrap();
        assert_eq!(wrappers[0].code, 1);
        assert!(wrappers[0].messages.is_empty());
        assert_eq!(wrappers[0].fees.len(), 1);
        assert_eq!(wrappers[0].fees[0].amount, Decimal::from(5000));
    }

    #[test]
    fn zero_amount_fees_are_dropped() {
        let parser = parser();
        let response = TxsByHeightResponse {
            txs: vec![tx_with(vec![send_message()], auth_info("osmo1payer", "0"))],
            tx_responses: vec![TxResponse {
                height: "100".to_string(),
                txhash: "AB12".to_string(),
                code: 0,
                raw_log: String::new(),
                logs: vec![send_log()],
                timestamp: "2023-06-01T12:00:00Z".to_string(),
            }],
        };

        let (wrappers, _) = parser.process_txs_response(&response).unwrap();
        assert!(wrappers[0].fees.is_empty());
    }

    #[test]
    fn payer_falls_back_to_first_signer_without_pubkey() {
        let parser = parser();
        let auth = AuthInfo {
            signer_infos: vec![SignerInfo {
                public_key: None,
                mode_info: None,
            }],
            fee: Some(TxFee {
                amount: vec![Coin {
                    denom: "uosmo".to_string(),
                    amount: "100".to_string(),
                }],
                payer: String::new(),
                granter: String::new(),
            }),
        };
        let tx = tx_with(vec![send_message()], auth);

        let wrapper = parser.process_tx("AA", 0, &tx, &[send_log()]).unwrap();
        // Canonical case preserved for the fee payer
        assert_eq!(wrapper.fees[0].payer_address, "osmo1sender");
        assert_eq!(wrapper.signer_address.as_deref(), Some("osmo1sender"));
    }

    #[test]
    fn multisig_payer_derives_from_first_inner_key() {
        let parser = parser();
        let auth = AuthInfo {
            signer_infos: vec![SignerInfo {
                public_key: Some(json!({
                    "@type": "/cosmos.crypto.multisig.LegacyAminoPubKey",
                    "threshold": 2,
                    "public_keys": [
                        {"@type": "/cosmos.crypto.secp256k1.PubKey", "key": KEY_B64},
                    ],
                })),
                mode_info: Some(json!({
                    "multi": {
                        "bitarray": {"extra_bits_stored": 2, "elems": "wA=="},
                        "mode_infos": [
                            {"single": {"mode": "SIGN_MODE_LEGACY_AMINO_JSON"}},
                        ],
                    }
                })),
            }],
            fee: Some(TxFee {
                amount: vec![Coin {
                    denom: "uatom".to_string(),
                    amount: "5000".to_string(),
                }],
                payer: String::new(),
                granter: String::new(),
            }),
        };
        let tx = tx_with(vec![send_message()], auth);

        let wrapper = parser.process_tx("AA", 0, &tx, &[send_log()]).unwrap();
        let payer = &wrapper.fees[0].payer_address;
        assert!(payer.starts_with("osmo1"));
        // The derived address is a real account address, not the multisig blob
        assert_eq!(payer.len(), "osmo".len() + 39);
    }

    #[test]
    fn preferred_and_fallback_paths_agree() {
        let parser = parser();
        let tx = tx_with(vec![send_message()], auth_info("osmo1payer", "5000"));

        let response = TxsByHeightResponse {
            txs: vec![tx.clone()],
            tx_responses: vec![TxResponse {
                height: "100".to_string(),
                txhash: "CAFE".to_string(),
                code: 0,
                raw_log: String::new(),
                logs: vec![send_log()],
                timestamp: "2023-06-01T12:00:00Z".to_string(),
            }],
        };
        let (preferred, _) = parser.process_txs_response(&response).unwrap();

        let results = BlockResultsResponse {
            height: "100".to_string(),
            txs_results: Some(vec![TxResult {
                code: 0,
                log: "[{\"msg_index\":0,\"events\":[]}]".to_string(),
            }]),
            begin_block_events: None,
            end_block_events: None,
        };
        let fallback = parser
            .process_block_txs(&[("CAFE".to_string(), tx)], &results)
            .unwrap();

        assert_eq!(preferred, fallback);
    }

    #[test]
    fn length_mismatch_is_an_inconsistency() {
        let parser = parser();
        let results = BlockResultsResponse {
            height: "100".to_string(),
            txs_results: Some(vec![TxResult::default(), TxResult::default()]),
            begin_block_events: None,
            end_block_events: None,
        };

        let decoded = vec![(
            "AA".to_string(),
            tx_with(vec![send_message()], auth_info("osmo1payer", "1")),
        )];
        match parser.process_block_txs(&decoded, &results) {
            Err(ParseError::Inconsistency(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn unknown_message_type_is_kept_with_no_transfers() {
        let parser = parser();
        let unknown = json!({
            "@type": "/custom.module.v1.MsgMystery",
            "creator": "osmo1someone",
        });
        let tx = tx_with(vec![unknown], auth_info("osmo1payer", "10"));

        let wrapper = parser.process_tx("AA", 0, &tx, &[]).unwrap();
        assert_eq!(wrapper.messages.len(), 1);
        assert_eq!(wrapper.messages[0].message_type, "/custom.module.v1.MsgMystery");
        assert!(wrapper.messages[0].transfers.is_empty());
    }
}
