//! Rust representation of the state checked by the channel contract.

use super::{ChannelIdentity, ProposeError, Role};
use crate::packed::{
    self,
    types::{Address, Hash, U256},
};
use serde::Serialize;

/// Balances and nonce of a channel at one point in time.
///
/// Amounts are in the smallest currency unit. The sum of both balances never
/// changes over the life of a channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub balance_a: U256,
    pub balance_b: U256,
    pub nonce: u64,
}

/// What the contract hashes in `submitFinalState`:
/// `keccak256(abi.encodePacked(balanceA, balanceB, nonce, address(this)))`.
///
/// The field order is part of the on-chain format.
#[derive(Serialize)]
struct StateCommitment {
    balance_a: U256,
    balance_b: U256,
    nonce: u64,
    contract: Address,
}

impl ChannelState {
    pub fn new(balance_a: U256, balance_b: U256, nonce: u64) -> Self {
        ChannelState {
            balance_a,
            balance_b,
            nonce,
        }
    }

    /// The state right after both parties funded the contract.
    pub fn funded(deposit_a: U256, deposit_b: U256) -> Self {
        Self::new(deposit_a, deposit_b, 0)
    }

    pub fn balance(&self, role: Role) -> U256 {
        match role {
            Role::A => self.balance_a,
            Role::B => self.balance_b,
        }
    }

    /// `None` if the sum does not fit into 256 bits.
    pub fn total(&self) -> Option<U256> {
        self.balance_a.checked_add(self.balance_b)
    }

    /// Digest both parties sign, bound to this channel's contract address.
    pub fn digest(&self, identity: &ChannelIdentity) -> Result<Hash, packed::Error> {
        packed::to_hash(&StateCommitment {
            balance_a: self.balance_a,
            balance_b: self.balance_b,
            nonce: self.nonce,
            contract: identity.contract,
        })
    }

    /// Create the state that follows this one when `from` pays `amount` to
    /// the other party.
    ///
    /// This is the only way to advance the nonce, which keeps callers from
    /// producing a follow-up state that skips or repeats a nonce.
    pub fn make_transfer(&self, from: Role, amount: U256) -> Result<Self, ProposeError> {
        if amount.is_zero() {
            return Err(ProposeError::InvalidAmount);
        }
        let available = self.balance(from);
        if amount > available {
            return Err(ProposeError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        let nonce = self
            .nonce
            .checked_add(1)
            .ok_or(ProposeError::NonceExhausted)?;

        let mut next = Self::new(self.balance_a, self.balance_b, nonce);
        // Cannot underflow (checked above) and cannot overflow as long as the
        // current state conserves a representable total.
        let to = from.counterparty();
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or(ProposeError::BalanceOverflow)?;
        match from {
            Role::A => {
                next.balance_a = available - amount;
                next.balance_b = credited;
            }
            Role::B => {
                next.balance_b = available - amount;
                next.balance_a = credited;
            }
        }
        Ok(next)
    }
}
