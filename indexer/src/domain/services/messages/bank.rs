//! Decoders for the bank module: direct transfers between accounts.

use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::TaxableTransfer;
use crate::domain::services::registry::MessageDecoder;
use crate::infrastructure::rpc::types::AbciEvent;

use super::{coins_field, field_str};

pub const MSG_SEND: &str = "/cosmos.bank.v1beta1.MsgSend";
pub const MSG_MULTI_SEND: &str = "/cosmos.bank.v1beta1.MsgMultiSend";

/// `MsgSend`: every coin moves in full from sender to receiver
#[derive(Default)]
pub struct MsgSendDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for MsgSendDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        _events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        let sender = field_str(message, "from_address")?.to_lowercase();
        let receiver = field_str(message, "to_address")?.to_lowercase();

        for (amount, denom) in coins_field(message, "amount")? {
            self.transfers.push(TaxableTransfer {
                amount_sent: Some(amount),
                denomination_sent: Some(denom.clone()),
                amount_received: Some(amount),
                denomination_received: Some(denom),
                sender_address: Some(sender.clone()),
                receiver_address: Some(receiver.clone()),
            });
        }
        Ok(())
    }

    fn transfers(&self) -> Vec<TaxableTransfer> {
        self.transfers.clone()
    }
}

/// `MsgMultiSend`: with a single input every output is a transfer from that
/// input; with several inputs each side is recorded one-sided since the
/// pairing is not expressed on chain.
#[derive(Default)]
pub struct MsgMultiSendDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for MsgMultiSendDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        _events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        let inputs = message
            .get("inputs")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::MalformedField("missing inputs".to_string()))?;
        let outputs = message
            .get("outputs")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::MalformedField("missing outputs".to_string()))?;

        if inputs.len() == 1 {
            let sender = field_str(&inputs[0], "address")?.to_lowercase();
            for output in outputs {
                let receiver = field_str(output, "address")?.to_lowercase();
                for (amount, denom) in coins_field(output, "coins")? {
                    self.transfers.push(TaxableTransfer {
                        amount_sent: Some(amount),
                        denomination_sent: Some(denom.clone()),
                        amount_received: Some(amount),
                        denomination_received: Some(denom),
                        sender_address: Some(sender.clone()),
                        receiver_address: Some(receiver.clone()),
                    });
                }
            }
        } else {
            for input in inputs {
                let sender = field_str(input, "address")?.to_lowercase();
                for (amount, denom) in coins_field(input, "coins")? {
                    self.transfers.push(TaxableTransfer {
                        amount_sent: Some(amount),
                        denomination_sent: Some(denom),
                        sender_address: Some(sender.clone()),
                        ..Default::default()
                    });
                }
            }
            for output in outputs {
                let receiver = field_str(output, "address")?.to_lowercase();
                for (amount, denom) in coins_field(output, "coins")? {
                    self.transfers.push(TaxableTransfer {
                        amount_received: Some(amount),
                        denomination_received: Some(denom),
                        receiver_address: Some(receiver.clone()),
                        ..Default::default()
                    });
                }
            }
        }
        Ok(())
    }

    fn transfers(&self) -> Vec<TaxableTransfer> {
        self.transfers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn msg_send_moves_every_coin() {
        let message = json!({
            "@type": MSG_SEND,
            "from_address": "osmo1SENDER",
            "to_address": "osmo1RECEIVER",
            "amount": [
                {"denom": "uosmo", "amount": "1000"},
                {"denom": "uion", "amount": "5"},
            ],
        });

        let mut decoder = MsgSendDecoder::default();
        decoder.decode(MSG_SEND, &message, &[]).unwrap();
        let transfers = decoder.transfers();

        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].amount_sent, Some(Decimal::from(1000)));
        assert_eq!(transfers[0].denomination_sent.as_deref(), Some("uosmo"));
        // Taxable addresses are lower-cased at ingestion
        assert_eq!(transfers[0].sender_address.as_deref(), Some("osmo1sender"));
        assert_eq!(
            transfers[0].receiver_address.as_deref(),
            Some("osmo1receiver")
        );
    }

    #[test]
    fn multi_send_single_input_maps_to_outputs() {
        let message = json!({
            "@type": MSG_MULTI_SEND,
            "inputs": [
                {"address": "osmo1payer", "coins": [{"denom": "uosmo", "amount": "30"}]},
            ],
            "outputs": [
                {"address": "osmo1a", "coins": [{"denom": "uosmo", "amount": "10"}]},
                {"address": "osmo1b", "coins": [{"denom": "uosmo", "amount": "20"}]},
            ],
        });

        let mut decoder = MsgMultiSendDecoder::default();
        decoder.decode(MSG_MULTI_SEND, &message, &[]).unwrap();
        let transfers = decoder.transfers();

        assert_eq!(transfers.len(), 2);
        assert!(transfers
            .iter()
            .all(|t| t.sender_address.as_deref() == Some("osmo1payer")));
        assert_eq!(transfers[1].amount_received, Some(Decimal::from(20)));
    }
}
