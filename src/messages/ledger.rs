use crate::{
    channel::{ChannelState, Checkpoint, Role},
    packed::types::{Address, Hash, Signature, U256},
};

/// Arguments of the contract's `submitFinalState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementRequest {
    pub final_balance_a: U256,
    pub final_balance_b: U256,
    pub final_nonce: u64,
    pub sig_a: Signature,
    pub sig_b: Signature,
}

impl From<&Checkpoint> for SettlementRequest {
    fn from(value: &Checkpoint) -> Self {
        let state = value.state();
        Self {
            final_balance_a: state.balance_a,
            final_balance_b: state.balance_b,
            final_nonce: state.nonce,
            sig_a: value.signature(Role::A),
            sig_b: value.signature(Role::B),
        }
    }
}

/// Channel contract state as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub nonce: u64,
    pub deposit_a: U256,
    pub deposit_b: U256,
    pub balance_a: U256,
    pub balance_b: U256,
    pub is_closed: bool,
    pub expiry_time: u64,
    pub party_a: Address,
    pub party_b: Address,
}

impl ChannelInfo {
    /// `true` if the contract holds exactly `state`: same nonce, same
    /// balances.
    pub fn matches_state(&self, state: &ChannelState) -> bool {
        self.nonce == state.nonce
            && self.balance_a == state.balance_a
            && self.balance_b == state.balance_b
    }
}

/// A mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxConfirmation {
    pub tx_hash: Hash,
    pub block_number: u64,
}
