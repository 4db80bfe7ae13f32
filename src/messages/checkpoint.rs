use super::{parse_amount, parse_field, ConversionError};
use crate::channel::{ChannelIdentity, ChannelState, Checkpoint, Role};
use serde::{Deserialize, Serialize};

/// The durable form of a [Checkpoint].
///
/// ```json
/// { "balanceA": "800", "balanceB": "1200", "nonce": 1, "sigA": "0x…", "sigB": "0x…" }
/// ```
///
/// The digest is not stored, it is recomputed from the state and the channel
/// identity when the record is loaded. Once the channel is settled the record
/// also carries `"closed": true`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub balance_a: String,
    pub balance_b: String,
    pub nonce: u64,
    pub sig_a: String,
    pub sig_b: String,
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub closed: bool,
}

impl From<&Checkpoint> for CheckpointRecord {
    fn from(value: &Checkpoint) -> Self {
        let state = value.state();
        Self {
            balance_a: state.balance_a.to_string(),
            balance_b: state.balance_b.to_string(),
            nonce: state.nonce,
            sig_a: value.signature(Role::A).to_string(),
            sig_b: value.signature(Role::B).to_string(),
            closed: false,
        }
    }
}

impl CheckpointRecord {
    /// Decode the record for the channel described by `identity`.
    ///
    /// The signatures are not verified here.
    pub fn to_checkpoint(&self, identity: &ChannelIdentity) -> Result<Checkpoint, ConversionError> {
        let state = ChannelState::new(
            parse_amount("balanceA", &self.balance_a)?,
            parse_amount("balanceB", &self.balance_b)?,
            self.nonce,
        );
        Ok(Checkpoint::new(
            identity,
            state,
            parse_field("sigA", &self.sig_a)?,
            parse_field("sigB", &self.sig_b)?,
        )?)
    }
}
