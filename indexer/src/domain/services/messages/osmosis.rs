//! Osmosis chain plug-in: handlers prepended by the chain bootstrap plus
//! the event types its begin/end blockers and epochs emit.

use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::TaxableTransfer;
use crate::domain::services::registry::{MessageDecoder, MessageRegistry, RegistrySealed};
use crate::infrastructure::rpc::types::AbciEvent;

use super::{field_str, last_event_attr, parse_coin_list};

pub const CHAIN_ID: &str = "osmosis-1";
pub const MSG_SWAP_EXACT_AMOUNT_IN: &str = "/osmosis.gamm.v1beta1.MsgSwapExactAmountIn";

/// Prepend the osmosis handlers so they get first attempt
pub fn register_handlers(registry: &mut MessageRegistry) -> Result<(), RegistrySealed> {
    registry.register_first(MSG_SWAP_EXACT_AMOUNT_IN, || {
        Box::new(SwapExactAmountInDecoder::default())
    })
}

/// `MsgSwapExactAmountIn`: token in comes from the message body; the token
/// actually received is only known from the `token_swapped` event, where the
/// last hop of the route carries the final output.
#[derive(Default)]
pub struct SwapExactAmountInDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for SwapExactAmountInDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        let sender = field_str(message, "sender")?.to_lowercase();
        let token_in = message
            .get("token_in")
            .ok_or_else(|| ParseError::MalformedField("missing token_in".to_string()))?;
        let (amount_in, denom_in) = super::coin_parts(token_in)?;

        let tokens_out = last_event_attr(events, "token_swapped", "tokens_out")
            .ok_or_else(|| {
                ParseError::MalformedField("no token_swapped event for swap".to_string())
            })?;
        let (amount_out, denom_out) = parse_coin_list(&tokens_out)?
            .into_iter()
            .last()
            .ok_or_else(|| ParseError::MalformedField("empty tokens_out".to_string()))?;

        // A swap sends and receives on the same account
        self.transfers.push(TaxableTransfer {
            amount_sent: Some(amount_in),
            denomination_sent: Some(denom_in),
            amount_received: Some(amount_out),
            denomination_received: Some(denom_out),
            sender_address: Some(sender.clone()),
            receiver_address: Some(sender),
        });
        Ok(())
    }

    fn transfers(&self) -> Vec<TaxableTransfer> {
        self.transfers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::rpc::types::AbciAttribute;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn swap_pairs_token_in_with_final_hop_out() {
        let message = json!({
            "@type": MSG_SWAP_EXACT_AMOUNT_IN,
            "sender": "osmo1trader",
            "routes": [
                {"pool_id": "1", "token_out_denom": "uion"},
                {"pool_id": "2", "token_out_denom": "uatom"},
            ],
            "token_in": {"denom": "uosmo", "amount": "1000000"},
            "token_out_min_amount": "1",
        });
        let events = vec![AbciEvent {
            event_type: "token_swapped".to_string(),
            attributes: vec![
                AbciAttribute {
                    key: "tokens_in".to_string(),
                    value: "1000000uosmo".to_string(),
                },
                AbciAttribute {
                    key: "tokens_out".to_string(),
                    value: "42uion".to_string(),
                },
                AbciAttribute {
                    key: "tokens_in".to_string(),
                    value: "42uion".to_string(),
                },
                AbciAttribute {
                    key: "tokens_out".to_string(),
                    value: "7uatom".to_string(),
                },
            ],
        }];

        let mut decoder = SwapExactAmountInDecoder::default();
        decoder
            .decode(MSG_SWAP_EXACT_AMOUNT_IN, &message, &events)
            .unwrap();
        let transfers = decoder.transfers();

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount_sent, Some(Decimal::from(1000000)));
        assert_eq!(transfers[0].denomination_received.as_deref(), Some("uatom"));
        assert_eq!(transfers[0].amount_received, Some(Decimal::from(7)));
    }

    #[test]
    fn swap_without_events_is_a_decoder_failure() {
        let message = json!({
            "@type": MSG_SWAP_EXACT_AMOUNT_IN,
            "sender": "osmo1trader",
            "token_in": {"denom": "uosmo", "amount": "1000000"},
        });

        let mut decoder = SwapExactAmountInDecoder::default();
        assert!(decoder
            .decode(MSG_SWAP_EXACT_AMOUNT_IN, &message, &[])
            .is_err());
    }
}
