//! Decoders for the gov module: deposits lock funds away from the sender.

use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::TaxableTransfer;
use crate::domain::services::registry::MessageDecoder;
use crate::infrastructure::rpc::types::AbciEvent;

use super::{coins_field, field_str};

pub const MSG_DEPOSIT: &str = "/cosmos.gov.v1beta1.MsgDeposit";
pub const MSG_SUBMIT_PROPOSAL: &str = "/cosmos.gov.v1beta1.MsgSubmitProposal";

#[derive(Default)]
pub struct MsgDepositDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for MsgDepositDecoder {
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

/// `MsgSubmitProposal` only moves value through its initial deposit
#[derive(Default)]
pub struct MsgSubmitProposalDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for MsgSubmitProposalDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        _events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        let proposer = field_str(message, "proposer")?.to_lowercase();

        for (amount, denom) in coins_field(message, "initial_deposit")? {
            self.transfers.push(TaxableTransfer {
                amount_sent: Some(amount),
                denomination_sent: Some(denom),
                sender_address: Some(proposer.clone()),
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
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn proposal_with_empty_deposit_moves_nothing() {
        let message = json!({
            "@type": MSG_SUBMIT_PROPOSAL,
            "proposer": "osmo1proposer",
            "initial_deposit": [],
        });

        let mut decoder = MsgSubmitProposalDecoder::default();
        decoder.decode(MSG_SUBMIT_PROPOSAL, &message, &[]).unwrap();
        assert!(decoder.transfers().is_empty());
    }

    #[test]
    fn deposit_is_send_only() {
        let message = json!({
            "@type": MSG_DEPOSIT,
            "proposal_id": "42",
            "depositor": "osmo1depositor",
            "amount": [{"denom": "uosmo", "amount": "500000"}],
        });

        let mut decoder = MsgDepositDecoder::default();
        decoder.decode(MSG_DEPOSIT, &message, &[]).unwrap();
        let transfers = decoder.transfers();
        assert_eq!(transfers[0].amount_sent, Some(Decimal::from(500000)));
        assert!(transfers[0].amount_received.is_none());
    }
}
