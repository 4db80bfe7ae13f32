//! Records exchanged with the outside world: the persisted checkpoint, the
//! voucher handed to the redeemer and the data passed to and from the ledger
//! collaborator.
//!
//! The JSON records use text for amounts (decimal) and byte strings (`0x`
//! hex), so they survive tools that turn large integers into floats.

mod checkpoint;
mod ledger;
mod voucher;

pub use checkpoint::CheckpointRecord;
pub use ledger::{ChannelInfo, SettlementRequest, TxConfirmation};
pub use voucher::VoucherRecord;

use crate::packed::{
    self,
    types::{ParseError, U256},
};
use core::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("field `{field}`: {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Encoding(#[from] packed::Error),
}

fn parse_field<T>(field: &'static str, value: &str) -> Result<T, ConversionError>
where
    T: FromStr<Err = ParseError>,
{
    value
        .parse()
        .map_err(|source| ConversionError::InvalidField { field, source })
}

fn parse_amount(field: &'static str, value: &str) -> Result<U256, ConversionError> {
    U256::from_decimal(value).map_err(|source| ConversionError::InvalidField { field, source })
}
