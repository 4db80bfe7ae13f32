use super::{store::CheckpointStore, AdoptError, ChannelLedger, ChannelState, Checkpoint, Role};
use crate::{
    packed::{self, types::U256},
    sig::{self, DigestSigner},
};
use core::future::Future;
use log::{debug, info, warn};
use thiserror::Error;

/// Error returned when a transfer cannot even be proposed. Nothing changed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProposeError {
    #[error("another proposal is still waiting for a decision")]
    RoundInProgress,
    #[error("channel is closed")]
    ChannelClosed,
    #[error("channel has no funded checkpoint yet")]
    NotEstablished,
    #[error("transfer amount must be positive")]
    InvalidAmount,
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: U256, requested: U256 },
    #[error("nonce space exhausted")]
    NonceExhausted,
    #[error("receiving balance would overflow")]
    BalanceOverflow,
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Propose(#[from] ProposeError),
    #[error("counterparty declined the update to nonce {nonce}")]
    Declined { nonce: u64 },
    #[error("no proposal is pending")]
    NoPendingProposal,
    #[error("signer for party {0} does not control the party's address")]
    SignerMismatch(Role),
    #[error("party {role} could not sign: {source}")]
    Sign {
        role: Role,
        #[source]
        source: sig::Error,
    },
    #[error("checkpoint was not adopted: {0}")]
    Adopt(#[from] AdoptError),
    #[error(transparent)]
    Encoding(#[from] packed::Error),
}

/// Where a negotiation round currently stands.
///
/// `Committed` and `Rejected` resolve a round, like `Idle` they allow the
/// next proposal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ProposalSent,
    AwaitingAck,
    Committed,
    Rejected,
}

impl Phase {
    pub fn is_open(self) -> bool {
        matches!(self, Phase::ProposalSent | Phase::AwaitingAck)
    }
}

/// A tentative update: `sender` pays `amount`, moving the channel from
/// `base_nonce` to `state`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub sender: Role,
    pub amount: U256,
    pub base_nonce: u64,
    pub state: ChannelState,
}

/// Delivers the counterparty's accept/reject decision for a proposal.
///
/// Anything that can eventually answer yes or no fits here: a prompt, a
/// message from the peer, a policy.
pub trait AcceptanceSource {
    fn decide(&mut self, proposal: &Proposal) -> impl Future<Output = bool> + Send;
}

/// [AcceptanceSource] answering synchronously with a closure.
#[derive(Debug, Clone)]
pub struct AcceptWith<F>(F);

pub fn accept_with<F>(f: F) -> AcceptWith<F>
where
    F: FnMut(&Proposal) -> bool,
{
    AcceptWith(f)
}

impl<F> AcceptanceSource for AcceptWith<F>
where
    F: FnMut(&Proposal) -> bool,
{
    fn decide(&mut self, proposal: &Proposal) -> impl Future<Output = bool> + Send {
        core::future::ready((self.0)(proposal))
    }
}

/// Drives update rounds for one channel.
///
/// Holds a signer per party. For the local party that is usually a
/// [Signer](crate::sig::Signer), for the remote party an implementation that
/// obtains the signature from the peer.
#[derive(Debug)]
pub struct Negotiator<'l, S, A, B> {
    ledger: &'l ChannelLedger<S>,
    signer_a: A,
    signer_b: B,
    phase: Phase,
    pending: Option<Proposal>,
}

impl<'l, S, A, B> Negotiator<'l, S, A, B>
where
    S: CheckpointStore,
    A: DigestSigner,
    B: DigestSigner,
{
    pub fn new(
        ledger: &'l ChannelLedger<S>,
        signer_a: A,
        signer_b: B,
    ) -> Result<Self, NegotiationError> {
        let identity = ledger.identity();
        if signer_a.address() != identity.party(Role::A) {
            return Err(NegotiationError::SignerMismatch(Role::A));
        }
        if signer_b.address() != identity.party(Role::B) {
            return Err(NegotiationError::SignerMismatch(Role::B));
        }
        Ok(Negotiator {
            ledger,
            signer_a,
            signer_b,
            phase: Phase::Idle,
            pending: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending(&self) -> Option<&Proposal> {
        self.pending.as_ref()
    }

    pub fn ledger(&self) -> &'l ChannelLedger<S> {
        self.ledger
    }

    /// Make sure the ledger holds a checkpoint: sign and adopt the funded
    /// state, or return the checkpoint a recovered ledger already has.
    pub fn establish(&mut self) -> Result<Checkpoint, NegotiationError> {
        if let Some(current) = self.ledger.snapshot() {
            debug!("Channel already established at nonce {}", current.nonce());
            return Ok(current);
        }
        let checkpoint = self.countersign(self.ledger.initial_state())?;
        self.ledger.adopt(checkpoint)?;
        Ok(checkpoint)
    }

    /// Start a round in which `sender` pays `amount` to the other party.
    ///
    /// The ledger is not touched until the counterparty accepted.
    pub fn propose(&mut self, sender: Role, amount: U256) -> Result<Proposal, ProposeError> {
        if self.phase.is_open() {
            return Err(ProposeError::RoundInProgress);
        }
        if self.ledger.is_closed() {
            return Err(ProposeError::ChannelClosed);
        }
        let current = self.ledger.snapshot().ok_or(ProposeError::NotEstablished)?;
        let state = current.state().make_transfer(sender, amount)?;

        let proposal = Proposal {
            sender,
            amount,
            base_nonce: current.nonce(),
            state,
        };
        debug!(
            "Party {} proposes paying {} (nonce {} -> {})",
            sender, amount, proposal.base_nonce, state.nonce
        );
        self.pending = Some(proposal);
        self.phase = Phase::ProposalSent;
        Ok(proposal)
    }

    /// Resolve the pending round with the counterparty's decision.
    ///
    /// On acceptance both parties sign the tentative state and the resulting
    /// checkpoint is adopted by the ledger. Whatever goes wrong, the round
    /// ends `Rejected` and the ledger keeps its previous checkpoint.
    pub fn counterparty_decision(&mut self, accept: bool) -> Result<Checkpoint, NegotiationError> {
        if !self.phase.is_open() {
            return Err(NegotiationError::NoPendingProposal);
        }
        let proposal = self
            .pending
            .take()
            .ok_or(NegotiationError::NoPendingProposal)?;

        if !accept {
            warn!(
                "Counterparty declined update to nonce {}",
                proposal.state.nonce
            );
            self.phase = Phase::Rejected;
            return Err(NegotiationError::Declined {
                nonce: proposal.state.nonce,
            });
        }

        match self.commit(proposal.state) {
            Ok(checkpoint) => {
                info!("Committed update to nonce {}", checkpoint.nonce());
                self.phase = Phase::Committed;
                Ok(checkpoint)
            }
            Err(e) => {
                warn!("Update to nonce {} failed: {}", proposal.state.nonce, e);
                self.phase = Phase::Rejected;
                Err(e)
            }
        }
    }

    /// Wait for `source` to decide on the pending proposal, then resolve the
    /// round.
    pub async fn await_acceptance<D: AcceptanceSource>(
        &mut self,
        source: &mut D,
    ) -> Result<Checkpoint, NegotiationError> {
        let proposal = match (self.phase, self.pending) {
            (Phase::ProposalSent | Phase::AwaitingAck, Some(p)) => p,
            _ => return Err(NegotiationError::NoPendingProposal),
        };
        self.phase = Phase::AwaitingAck;
        let accept = source.decide(&proposal).await;
        self.counterparty_decision(accept)
    }

    /// Propose and wait for the decision in one go.
    pub async fn transfer<D: AcceptanceSource>(
        &mut self,
        sender: Role,
        amount: U256,
        source: &mut D,
    ) -> Result<Checkpoint, NegotiationError> {
        self.propose(sender, amount)?;
        self.await_acceptance(source).await
    }

    /// Drop the pending proposal, if any. The ledger is unaffected.
    pub fn abandon(&mut self) -> Option<Proposal> {
        let pending = self.pending.take();
        if let Some(p) = &pending {
            debug!("Abandoning proposal for nonce {}", p.state.nonce);
        }
        self.phase = Phase::Idle;
        pending
    }

    fn commit(&self, state: ChannelState) -> Result<Checkpoint, NegotiationError> {
        let checkpoint = self.countersign(state)?;
        self.ledger.adopt(checkpoint)?;
        Ok(checkpoint)
    }

    /// Both parties sign the same digest, independently.
    fn countersign(&self, state: ChannelState) -> Result<Checkpoint, NegotiationError> {
        let digest = state.digest(self.ledger.identity())?;
        let sig_a = self
            .signer_a
            .sign_digest(digest)
            .map_err(|source| NegotiationError::Sign {
                role: Role::A,
                source,
            })?;
        let sig_b = self
            .signer_b
            .sign_digest(digest)
            .map_err(|source| NegotiationError::Sign {
                role: Role::B,
                source,
            })?;
        Ok(Checkpoint::from_parts(state, digest, [sig_a, sig_b]))
    }
}
