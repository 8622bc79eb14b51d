//! Concrete message decoders and the registry bootstrap.
//!
//! The standard handler table covers the core Cosmos SDK families; the
//! ignore set lists types that carry no taxable content but still pay
//! fees. Chain bootstraps prepend their own handlers so they win.

pub mod bank;
pub mod distribution;
pub mod gov;
pub mod ibc;
pub mod osmosis;
pub mod staking;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::services::registry::{MessageRegistry, RegistrySealed};
use crate::infrastructure::rpc::types::AbciEvent;

/// Types that are not parsed for taxable content. Fees are still tracked.
const IGNORED_TYPES: &[&str] = &[
    // Authz module actions are not taxable
    "/cosmos.authz.v1beta1.MsgExec",
    "/cosmos.authz.v1beta1.MsgGrant",
    "/cosmos.authz.v1beta1.MsgRevoke",
    // Making a config change is not taxable
    "/cosmos.distribution.v1beta1.MsgSetWithdrawAddress",
    // Voting is not taxable
    "/cosmos.gov.v1beta1.MsgVote",
    // IBC client/connection/channel plumbing moves no user funds
    "/ibc.core.client.v1.MsgCreateClient",
    "/ibc.core.client.v1.MsgUpdateClient",
    "/ibc.core.channel.v1.MsgRecvPacket",
    "/ibc.core.channel.v1.MsgAcknowledgement",
    "/ibc.core.channel.v1.MsgTimeout",
    "/ibc.core.channel.v1.MsgTimeoutOnClose",
    "/ibc.core.channel.v1.MsgChannelOpenInit",
    "/ibc.core.channel.v1.MsgChannelOpenTry",
    "/ibc.core.channel.v1.MsgChannelOpenAck",
    "/ibc.core.channel.v1.MsgChannelOpenConfirm",
    "/ibc.core.connection.v1.MsgConnectionOpenInit",
    "/ibc.core.connection.v1.MsgConnectionOpenTry",
    "/ibc.core.connection.v1.MsgConnectionOpenAck",
    "/ibc.core.connection.v1.MsgConnectionOpenConfirm",
    // Unjailing and updating params is not taxable
    "/cosmos.slashing.v1beta1.MsgUnjail",
    "/cosmos.slashing.v1beta1.MsgUpdateParams",
    // Creating and editing a validator is not taxable
    "/cosmos.staking.v1beta1.MsgCreateValidator",
    "/cosmos.staking.v1beta1.MsgEditValidator",
    // Create account is not taxable
    "/cosmos.vesting.v1beta1.MsgCreateVestingAccount",
    // Gauge management and lockups are not taxable
    "/osmosis.incentives.MsgCreateGauge",
    "/osmosis.incentives.MsgAddToGauge",
    "/osmosis.lockup.MsgLockTokens",
    "/osmosis.lockup.MsgBeginUnlocking",
    "/osmosis.lockup.MsgBeginUnlockingAll",
    "/osmosis.lockup.MsgUnlockPeriodLock",
    "/osmosis.superfluid.MsgSuperfluidDelegate",
    "/osmosis.superfluid.MsgSuperfluidUndelegate",
    "/osmosis.superfluid.MsgSuperfluidUnbondLock",
    "/osmosis.superfluid.MsgLockAndSuperfluidDelegate",
    "/osmosis.superfluid.MsgUnPoolWhitelistedPool",
    // The tendermint liquidity pool module is not supported yet
    "/tendermint.liquidity.v1beta1.MsgCreatePool",
    "/tendermint.liquidity.v1beta1.MsgDepositWithinBatch",
    "/tendermint.liquidity.v1beta1.MsgWithdrawWithinBatch",
    "/tendermint.liquidity.v1beta1.MsgSwapWithinBatch",
    // CosmWasm contract calls are not parsed for taxable content
    "/cosmwasm.wasm.v1.MsgExecuteContract",
    "/cosmwasm.wasm.v1.MsgInstantiateContract",
];

/// Build the registry with the standard handler table and ignore set.
/// The registry is returned unsealed so a chain bootstrap can prepend.
pub fn standard_registry() -> Result<MessageRegistry, RegistrySealed> {
    let mut registry = MessageRegistry::new();

    registry.register(bank::MSG_SEND, || Box::new(bank::MsgSendDecoder::default()))?;
    registry.register(bank::MSG_MULTI_SEND, || {
        Box::new(bank::MsgMultiSendDecoder::default())
    })?;
    registry.register(distribution::MSG_WITHDRAW_DELEGATOR_REWARD, || {
        Box::new(distribution::WithdrawDelegatorRewardDecoder::default())
    })?;
    registry.register(distribution::MSG_WITHDRAW_VALIDATOR_COMMISSION, || {
        Box::new(distribution::WithdrawValidatorCommissionDecoder::default())
    })?;
    registry.register(distribution::MSG_FUND_COMMUNITY_POOL, || {
        Box::new(distribution::FundCommunityPoolDecoder::default())
    })?;
    registry.register(gov::MSG_DEPOSIT, || Box::new(gov::MsgDepositDecoder::default()))?;
    registry.register(gov::MSG_SUBMIT_PROPOSAL, || {
        Box::new(gov::MsgSubmitProposalDecoder::default())
    })?;
    registry.register(staking::MSG_DELEGATE, || {
        Box::new(staking::DelegationRewardDecoder::default())
    })?;
    registry.register(staking::MSG_UNDELEGATE, || {
        Box::new(staking::DelegationRewardDecoder::default())
    })?;
    registry.register(staking::MSG_BEGIN_REDELEGATE, || {
        Box::new(staking::DelegationRewardDecoder::default())
    })?;
    registry.register(ibc::MSG_TRANSFER, || {
        Box::new(ibc::MsgTransferDecoder::default())
    })?;

    for type_url in IGNORED_TYPES {
        registry.ignore(type_url)?;
    }

    Ok(registry)
}

/// Prepend chain-specific handlers so they shadow the generic ones
pub fn register_chain_handlers(
    registry: &mut MessageRegistry,
    chain_id: &str,
) -> Result<(), RegistrySealed> {
    if chain_id == osmosis::CHAIN_ID {
        osmosis::register_handlers(registry)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared field helpers for the decoders

pub(crate) fn field_str<'a>(message: &'a Value, key: &str) -> Result<&'a str, ParseError> {
    message
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::MalformedField(format!("missing field {}", key)))
}

/// Parse one JSON coin `{denom, amount}`
pub(crate) fn coin_parts(coin: &Value) -> Result<(Decimal, String), ParseError> {
    let denom = field_str(coin, "denom")?.to_string();
    let amount = field_str(coin, "amount")?
        .parse::<Decimal>()
        .map_err(|e| ParseError::MalformedField(format!("coin amount: {}", e)))?;
    Ok((amount, denom))
}

/// Parse a JSON coin array field
pub(crate) fn coins_field(message: &Value, key: &str) -> Result<Vec<(Decimal, String)>, ParseError> {
    let coins = message
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::MalformedField(format!("missing coin list {}", key)))?;
    coins.iter().map(coin_parts).collect()
}

/// Parse the "123uosmo,45ibc/ABC" coin list format used by event attributes
pub fn parse_coin_list(list: &str) -> Result<Vec<(Decimal, String)>, ParseError> {
    let mut coins = Vec::new();
    for part in list.split(',').filter(|p| !p.is_empty()) {
        let split = part
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ParseError::MalformedField(format!("coin has no denom: {}", part)))?;
        if split == 0 {
            return Err(ParseError::MalformedField(format!(
                "coin has no amount: {}",
                part
            )));
        }
        let amount = part[..split]
            .parse::<Decimal>()
            .map_err(|e| ParseError::MalformedField(format!("coin amount: {}", e)))?;
        coins.push((amount, part[split..].to_string()));
    }
    Ok(coins)
}

/// Walk `coin_received` style events, pairing each `receiver` attribute with
/// the `amount` that follows it
pub(crate) fn receiver_amount_pairs(
    events: &[AbciEvent],
    event_type: &str,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for event in events.iter().filter(|e| e.event_type == event_type) {
        let mut receiver: Option<&str> = None;
        for attr in &event.attributes {
            match attr.key.as_str() {
                "receiver" => receiver = Some(attr.value.as_str()),
                "amount" => {
                    if let Some(r) = receiver.take() {
                        pairs.push((r.to_string(), attr.value.clone()));
                    }
                }
                _ => {}
            }
        }
    }
    pairs
}

/// Last value of an attribute across all events of a type
pub(crate) fn last_event_attr(
    events: &[AbciEvent],
    event_type: &str,
    key: &str,
) -> Option<String> {
    events
        .iter()
        .filter(|e| e.event_type == event_type)
        .flat_map(|e| e.attributes.iter())
        .filter(|a| a.key == key)
        .last()
        .map(|a| a.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_coin_lists() {
        let coins = parse_coin_list("123uosmo,45ibc/27394FB092D2ECCD56123C74F36E4C1F92").unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].0, Decimal::from(123));
        assert_eq!(coins[0].1, "uosmo");
        assert_eq!(coins[1].1, "ibc/27394FB092D2ECCD56123C74F36E4C1F92");
    }

    #[test]
    fn rejects_denomless_coins() {
        assert!(parse_coin_list("12345").is_err());
        assert!(parse_coin_list("uosmo").is_err());
    }
}
