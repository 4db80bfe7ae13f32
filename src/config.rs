//! Channel parameters as written down when the contract was deployed.
//!
//! ```json
//! {
//!   "contractAddress": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
//!   "partyA": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
//!   "partyB": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
//!   "chainId": 1337,
//!   "expiryTime": 1700086400,
//!   "depositA": "1000000000000000000",
//!   "depositB": "1000000000000000000",
//!   "checkpointPath": "state/channel.json"
//! }
//! ```

use crate::{
    channel::ChannelIdentity,
    packed::types::{Address, ParseError, U256},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config field `{field}`: {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: ParseError,
    },
    #[error("partyA and partyB must differ")]
    SameParties,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub contract_address: String,
    pub party_a: String,
    pub party_b: String,
    pub chain_id: u64,
    /// Unix timestamp in seconds.
    pub expiry_time: u64,
    /// Decimal, smallest currency unit.
    pub deposit_a: String,
    pub deposit_b: String,
    /// Where to keep the latest checkpoint. Relative paths are resolved by
    /// the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_path: Option<PathBuf>,
}

impl ChannelConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let val = std::fs::read_to_string(path)?;
        Self::from_json_str(&val)
    }

    pub fn identity(&self) -> Result<ChannelIdentity, ConfigError> {
        let party_a: Address = field("partyA", self.party_a.parse())?;
        let party_b: Address = field("partyB", self.party_b.parse())?;
        if party_a == party_b {
            return Err(ConfigError::SameParties);
        }
        Ok(ChannelIdentity {
            contract: field("contractAddress", self.contract_address.parse())?,
            parties: [party_a, party_b],
            chain_id: self.chain_id,
            expiry: self.expiry_time,
        })
    }

    /// `(deposit_a, deposit_b)`
    pub fn deposits(&self) -> Result<(U256, U256), ConfigError> {
        Ok((
            field("depositA", U256::from_decimal(&self.deposit_a))?,
            field("depositB", U256::from_decimal(&self.deposit_b))?,
        ))
    }
}

fn field<T>(field: &'static str, res: Result<T, ParseError>) -> Result<T, ConfigError> {
    res.map_err(|source| ConfigError::InvalidField { field, source })
}
