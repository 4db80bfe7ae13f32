use super::{parse_amount, parse_field, ConversionError};
use crate::voucher::Voucher;
use serde::{Deserialize, Serialize};

/// A [Voucher] as handed from the payer to the redeemer.
///
/// ```json
/// { "from": "0x…", "to": "0x…", "amount": "1000000000000000000",
///   "timestamp": 1700000000, "chainId": 1337, "signature": "0x…" }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoucherRecord {
    pub from: String,
    pub to: String,
    pub amount: String,
    pub timestamp: u64,
    pub chain_id: u64,
    pub signature: String,
}

impl From<&Voucher> for VoucherRecord {
    fn from(value: &Voucher) -> Self {
        Self {
            from: value.from.to_string(),
            to: value.to.to_string(),
            amount: value.amount.to_string(),
            timestamp: value.issued_at,
            chain_id: value.chain_id,
            signature: value.signature.to_string(),
        }
    }
}

impl TryFrom<&VoucherRecord> for Voucher {
    type Error = ConversionError;

    fn try_from(value: &VoucherRecord) -> Result<Self, Self::Error> {
        Ok(Voucher {
            from: parse_field("from", &value.from)?,
            to: parse_field("to", &value.to)?,
            amount: parse_amount("amount", &value.amount)?,
            issued_at: value.timestamp,
            chain_id: value.chain_id,
            signature: parse_field("signature", &value.signature)?,
        })
    }
}
