//! Decoders for the staking module.
//!
//! Delegating, undelegating and redelegating are not themselves transfers,
//! but each one force-withdraws any pending rewards; those payouts appear
//! as `coin_received` events for the delegator and are the taxable part.

use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::TaxableTransfer;
use crate::domain::services::registry::MessageDecoder;
use crate::infrastructure::rpc::types::AbciEvent;

use super::{field_str, parse_coin_list, receiver_amount_pairs};

pub const MSG_DELEGATE: &str = "/cosmos.staking.v1beta1.MsgDelegate";
pub const MSG_UNDELEGATE: &str = "/cosmos.staking.v1beta1.MsgUndelegate";
pub const MSG_BEGIN_REDELEGATE: &str = "/cosmos.staking.v1beta1.MsgBeginRedelegate";

/// Shared by delegate, undelegate and redelegate: extract the auto-withdrawn
/// rewards credited to the delegator
#[derive(Default)]
pub struct DelegationRewardDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for DelegationRewardDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        let delegator = field_str(message, "delegator_address")?;

        for (receiver, amount) in receiver_amount_pairs(events, "coin_received") {
            if !receiver.eq_ignore_ascii_case(delegator) {
                continue;
            }
            for (amount, denom) in parse_coin_list(&amount)? {
                self.transfers.push(TaxableTransfer {
                    amount_received: Some(amount),
                    denomination_received: Some(denom),
                    receiver_address: Some(receiver.to_lowercase()),
                    ..Default::default()
                });
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
    use crate::infrastructure::rpc::types::AbciAttribute;
    use serde_json::json;

    #[test]
    fn delegate_without_pending_rewards_is_empty() {
        let message = json!({
            "@type": MSG_DELEGATE,
            "delegator_address": "osmo1delegator",
            "validator_address": "osmovaloper1xyz",
            "amount": {"denom": "uosmo", "amount": "1000000"},
        });

        let mut decoder = DelegationRewardDecoder::default();
        decoder.decode(MSG_DELEGATE, &message, &[]).unwrap();
        assert!(decoder.transfers().is_empty());
    }

    #[test]
    fn auto_withdrawn_rewards_are_extracted() {
        let message = json!({
            "@type": MSG_UNDELEGATE,
            "delegator_address": "osmo1delegator",
            "validator_address": "osmovaloper1xyz",
            "amount": {"denom": "uosmo", "amount": "1000000"},
        });
        let events = vec![AbciEvent {
            event_type: "coin_received".to_string(),
            attributes: vec![
                AbciAttribute {
                    key: "receiver".to_string(),
                    value: "osmo1delegator".to_string(),
                },
                AbciAttribute {
                    key: "amount".to_string(),
                    value: "77uosmo".to_string(),
                },
            ],
        }];

        let mut decoder = DelegationRewardDecoder::default();
        decoder.decode(MSG_UNDELEGATE, &message, &events).unwrap();
        let transfers = decoder.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(
            transfers[0].denomination_received.as_deref(),
            Some("uosmo")
        );
    }
}
