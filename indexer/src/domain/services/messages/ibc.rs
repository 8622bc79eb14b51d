//! Decoder for IBC fungible token transfers. The client/connection/channel
//! plumbing messages live in the ignore set; only `MsgTransfer` moves user
//! funds.

use serde_json::Value;

use crate::domain::errors::ParseError;
use crate::domain::models::tx::TaxableTransfer;
use crate::domain::services::registry::MessageDecoder;
use crate::infrastructure::rpc::types::AbciEvent;

use super::{coin_parts, field_str};

pub const MSG_TRANSFER: &str = "/ibc.applications.transfer.v1.MsgTransfer";

#[derive(Default)]
pub struct MsgTransferDecoder {
    transfers: Vec<TaxableTransfer>,
}

impl MessageDecoder for MsgTransferDecoder {
    fn decode(
        &mut self,
        _type_url: &str,
        message: &Value,
        _events: &[AbciEvent],
    ) -> Result<(), ParseError> {
        let sender = field_str(message, "sender")?.to_lowercase();
        let receiver = field_str(message, "receiver")?.to_lowercase();
        let token = message
            .get("token")
            .ok_or_else(|| ParseError::MalformedField("missing token".to_string()))?;
        let (amount, denom) = coin_parts(token)?;

        self.transfers.push(TaxableTransfer {
            amount_sent: Some(amount),
            denomination_sent: Some(denom.clone()),
            amount_received: Some(amount),
            denomination_received: Some(denom),
            sender_address: Some(sender),
            receiver_address: Some(receiver),
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
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn transfer_records_both_sides() {
        let message = json!({
            "@type": MSG_TRANSFER,
            "source_port": "transfer",
            "source_channel": "channel-0",
            "token": {"denom": "uosmo", "amount": "250000"},
            "sender": "osmo1sender",
            "receiver": "cosmos1receiver",
        });

        let mut decoder = MsgTransferDecoder::default();
        decoder.decode(MSG_TRANSFER, &message, &[]).unwrap();
        let transfers = decoder.transfers();

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount_sent, Some(Decimal::from(250000)));
        assert_eq!(
            transfers[0].receiver_address.as_deref(),
            Some("cosmos1receiver")
        );
    }
}
