//! Decoders for the distribution module. Reward and commission withdrawals
//! carry their amounts only in the event log, not in the message body.

use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::TaxableTransfer;
use crate::domain::services::registry::MessageDecoder;
use crate::infrastructure::rpc::types::AbciEvent;

use super::{coins_field, field_str, parse_coin_list, receiver_amount_pairs};

pub const MSG_WITHDRAW_DELEGATOR_REWARD: &str =
    "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward";
pub const MSG_WITHDRAW_VALIDATOR_COMMISSION: &str =
    "/cosmos.distribution.v1beta1.MsgWithdrawValidatorCommission";
pub const MSG_FUND_COMMUNITY_POOL: &str = "/cosmos.distribution.v1beta1.MsgFundCommunityPool";

/// `MsgWithdrawDelegatorReward`: the paid-out coins appear as
/// `coin_received` events for the delegator
#[derive(Default)]
pub struct WithdrawDelegatorRewardDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for WithdrawDelegatorRewardDecoder {
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

/// `MsgWithdrawValidatorCommission`: the commission lands on whichever
/// account the `coin_received` events name
#[derive(Default)]
pub struct WithdrawValidatorCommissionDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for WithdrawValidatorCommissionDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        // The operator address is bech32-valoper; the receiving account
        // comes from the event log
        field_str(message, "validator_address")?;

        for (receiver, amount) in receiver_amount_pairs(events, "coin_received") {
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

/// `MsgFundCommunityPool`: coins leave the depositor with no account on the
/// receiving side
#[derive(Default)]
pub struct FundCommunityPoolDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for FundCommunityPoolDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        _events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        let depositor = field_str(message, "depositor")?.to_lowercase();

        for (amount, denom) in coins_field(message, "amount")? {
            self.transfers.push(TaxableTransfer {
                amount_sent: Some(amount),
                denomination_sent: Some(denom),
                sender_address: Some(depositor.clone()),
                ..Default::default()
            });
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
    use rust_decimal::Decimal;
    use serde_json::json;

    fn coin_received(receiver: &str, amount: &str) -> AbciEvent {
        AbciEvent {
            event_type: "coin_received".to_string(),
            attributes: vec![
                AbciAttribute {
                    key: "receiver".to_string(),
                    value: receiver.to_string(),
                },
                AbciAttribute {
                    key: "amount".to_string(),
                    value: amount.to_string(),
                },
            ],
        }
    }

    #[test]
    fn withdraw_reward_takes_amounts_from_the_log() {
        let message = json!({
            "@type": MSG_WITHDRAW_DELEGATOR_REWARD,
            "delegator_address": "osmo1delegator",
            "validator_address": "osmovaloper1xyz",
        });
        let events = vec![
            coin_received("osmo1delegator", "150uosmo,3uion"),
            // Rewards routed elsewhere are not this delegator's income
            coin_received("osmo1other", "999uosmo"),
        ];

        let mut decoder = WithdrawDelegatorRewardDecoder::default();
        decoder
            .decode(MSG_WITHDRAW_DELEGATOR_REWARD, &message, &events)
            .unwrap();
        let transfers = decoder.transfers();

        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].amount_received, Some(Decimal::from(150)));
        assert_eq!(transfers[1].denomination_received.as_deref(), Some("uion"));
        assert!(transfers.iter().all(|t| t.amount_sent.is_none()));
    }

    #[test]
    fn fund_community_pool_is_send_only() {
        let message = json!({
            "@type": MSG_FUND_COMMUNITY_POOL,
            "depositor": "osmo1whale",
            "amount": [{"denom": "uosmo", "amount": "1000000"}],
        });

        let mut decoder = FundCommunityPoolDecoder::default();
        decoder.decode(MSG_FUND_COMMUNITY_POOL, &message, &[]).unwrap();
        let transfers = decoder.transfers();

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount_sent, Some(Decimal::from(1000000)));
        assert!(transfers[0].receiver_address.is_none());
    }
}
