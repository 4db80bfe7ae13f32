//! Bidirectional channel: state model, checkpoint ledger and the update
//! negotiation between the two parties.

mod checkpoint;
mod ledger;
mod negotiator;
mod state;
pub mod store;


use crate::packed::types::Address;
use core::fmt::Display;
use serde::{Deserialize, Serialize};

pub use checkpoint::*;
pub use ledger::*;
pub use negotiator::*;
pub use state::*;
pub use store::{CheckpointStore, FileStore, MemoryStore, StoreError};

/// One of the two parties of a channel.
///
/// `A` is the first party listed by the contract.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    A,
    B,
}

impl Role {
    pub const BOTH: [Role; 2] = [Role::A, Role::B];

    pub fn counterparty(self) -> Role {
        match self {
            Role::A => Role::B,
            Role::B => Role::A,
        }
    }

    /// Index into per-party arrays (signatures, addresses).
    pub fn index(self) -> usize {
        match self {
            Role::A => 0,
            Role::B => 1,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Role::A => f.write_str("A"),
            Role::B => f.write_str("B"),
        }
    }
}

/// Everything fixed when the channel contract is deployed.
///
/// Shared read-only by both parties; never mutated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    /// Address of the channel contract, folded into every state digest so
    /// signatures cannot be replayed against another channel.
    pub contract: Address,
    pub parties: [Address; 2],
    pub chain_id: u64,
    /// Unix timestamp (seconds) after which the contract allows unilateral
    /// exit. Enforced by the ledger, only carried here.
    pub expiry: u64,
}

impl ChannelIdentity {
    pub fn party(&self, role: Role) -> Address {
        self.parties[role.index()]
    }
}
