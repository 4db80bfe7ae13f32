use super::{
    store::{CheckpointStore, StoreError},
    ChannelIdentity, ChannelState, Checkpoint, CheckpointError, Role,
};
use crate::{
    messages::{CheckpointRecord, ConversionError},
    packed::types::U256,
};
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdoptError {
    #[error("channel is closed")]
    ChannelClosed,
    #[error("checkpoint nonce {candidate} is not newer than the current nonce {current}")]
    StaleNonce { current: u64, candidate: u64 },
    #[error("balances {balance_a} + {balance_b} do not add up to the deposit {expected}")]
    ConservationViolation {
        expected: U256,
        balance_a: U256,
        balance_b: U256,
    },
    #[error(transparent)]
    Invalid(#[from] CheckpointError),
    #[error("could not persist checkpoint: {0}")]
    Persist(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("deposits overflow 256 bits")]
    DepositOverflow,
    #[error("could not read stored checkpoint: {0}")]
    Store(#[from] StoreError),
    #[error("stored checkpoint is malformed: {0}")]
    Record(#[from] ConversionError),
    #[error("stored checkpoint is not valid for this channel: {0}")]
    Invalid(#[source] AdoptError),
}

struct LedgerInner<S> {
    current: Option<Checkpoint>,
    closed: bool,
    store: S,
}

/// Authoritative record of the latest checkpoint both parties signed.
///
/// Checks and replacement happen under one lock, concurrent negotiation
/// rounds sharing a ledger race on [Self::adopt] and exactly one of two
/// checkpoints with the same nonce wins.
pub struct ChannelLedger<S> {
    identity: ChannelIdentity,
    deposits: [U256; 2],
    total: U256,
    inner: Mutex<LedgerInner<S>>,
}

impl<S: CheckpointStore> ChannelLedger<S> {
    /// Open the ledger of a funded channel, resuming from the checkpoint in
    /// `store` if there is one.
    pub fn open(
        identity: ChannelIdentity,
        deposit_a: U256,
        deposit_b: U256,
        store: S,
    ) -> Result<Self, OpenError> {
        let total = deposit_a
            .checked_add(deposit_b)
            .ok_or(OpenError::DepositOverflow)?;
        let mut ledger = ChannelLedger {
            identity,
            deposits: [deposit_a, deposit_b],
            total,
            inner: Mutex::new(LedgerInner {
                current: None,
                closed: false,
                store,
            }),
        };

        let record = ledger.lock().store.load()?;
        if let Some(record) = record {
            let checkpoint = record.to_checkpoint(&ledger.identity)?;
            ledger.verify(&checkpoint).map_err(OpenError::Invalid)?;
            info!(
                "Resuming channel {} at nonce {}{}",
                ledger.identity.contract,
                checkpoint.nonce(),
                if record.closed { ", closed" } else { "" }
            );
            let inner = ledger.inner.get_mut().unwrap_or_else(|e| e.into_inner());
            inner.current = Some(checkpoint);
            inner.closed = record.closed;
        }
        Ok(ledger)
    }

    /// Accept `candidate` as the new current checkpoint.
    ///
    /// The store is written before the in-memory checkpoint is replaced, on
    /// any error the ledger keeps its previous state.
    pub fn adopt(&self, candidate: Checkpoint) -> Result<(), AdoptError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(AdoptError::ChannelClosed);
        }
        if let Some(current) = &inner.current {
            if candidate.nonce() <= current.nonce() {
                warn!(
                    "Rejecting checkpoint with nonce {}, already at {}",
                    candidate.nonce(),
                    current.nonce()
                );
                return Err(AdoptError::StaleNonce {
                    current: current.nonce(),
                    candidate: candidate.nonce(),
                });
            }
        }
        self.verify(&candidate)?;

        inner.store.save(&CheckpointRecord::from(&candidate))?;
        inner.current = Some(candidate);
        info!(
            "Adopted checkpoint nonce={} balance_a={} balance_b={}",
            candidate.nonce(),
            candidate.state().balance_a,
            candidate.state().balance_b
        );
        Ok(())
    }

    /// Everything [Self::adopt] checks except the nonce ordering and the
    /// closed flag.
    pub fn verify(&self, checkpoint: &Checkpoint) -> Result<(), AdoptError> {
        let state = checkpoint.state();
        if state.total() != Some(self.total) {
            return Err(AdoptError::ConservationViolation {
                expected: self.total,
                balance_a: state.balance_a,
                balance_b: state.balance_b,
            });
        }
        checkpoint.verify(&self.identity)?;
        Ok(())
    }

    pub fn snapshot(&self) -> Option<Checkpoint> {
        self.lock().current
    }

    /// Nonce of the current checkpoint, `None` before the channel is
    /// established.
    pub fn nonce(&self) -> Option<u64> {
        self.lock().current.map(|c| c.nonce())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Terminal, there is no way to reopen.
    ///
    /// The flag is stored next to the current checkpoint, a ledger opened
    /// from the same store later is closed as well. If the store cannot be
    /// written the ledger stays open.
    pub fn mark_closed(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(());
        }
        if let Some(current) = inner.current {
            let record = CheckpointRecord {
                closed: true,
                ..CheckpointRecord::from(&current)
            };
            inner.store.save(&record)?;
        }
        debug!("Marking channel {} closed", self.identity.contract);
        inner.closed = true;
        Ok(())
    }

    /// The funded state every channel starts from.
    pub fn initial_state(&self) -> ChannelState {
        ChannelState::funded(self.deposits[0], self.deposits[1])
    }

    pub fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    pub fn deposit(&self, role: Role) -> U256 {
        self.deposits[role.index()]
    }

    pub fn total_deposit(&self) -> U256 {
        self.total
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner<S>> {
        // Mutations are applied only after every fallible step, a poisoned
        // lock still guards a consistent state.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S> core::fmt::Debug for ChannelLedger<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelLedger")
            .field("identity", &self.identity)
            .field("deposits", &self.deposits)
            .finish_non_exhaustive()
    }
}
