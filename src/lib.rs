//! Off-chain payments between two parties of an Ethereum channel contract,
//! plus single-payer vouchers redeemable on chain.
//!
//! Both parties sign every balance update. The latest dual-signed
//! [Checkpoint](channel::Checkpoint) is kept by a
//! [ChannelLedger](channel::ChannelLedger) and can be settled on the ledger at
//! any time with a [SettlementSubmitter](settlement::SettlementSubmitter).

mod packed {
    mod error;
    mod hashing;
    mod ser;

    pub mod types;

    pub use error::Error;
    pub use hashing::to_hash;
    pub use ser::{to_writer, Writer};

    #[cfg(test)]
    pub use ser::to_bytes;

    #[cfg(test)]
    mod tests;
}
pub mod sig;

pub mod channel;
pub mod config;
pub mod messages;
pub mod settlement;
pub mod voucher;

pub use packed::types::{Address, Hash, ParseError, Signature, U256};
pub use packed::Error as EncodingError;
