//! Putting the off-chain result on the ledger: submitting the final channel
//! checkpoint and redeeming vouchers.
//!
//! The ledger itself is reached through a [LedgerClient], implemented by
//! whatever talks to the node (RPC provider, test double, ...).

use crate::{
    channel::{AdoptError, ChannelLedger, CheckpointStore, Role, StoreError},
    messages::{ChannelInfo, SettlementRequest, TxConfirmation, VoucherRecord},
    voucher::{Voucher, VoucherError, VoucherVerifier},
};
use core::future::Future;
use log::{debug, info, warn};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Failure reported by the [LedgerClient]. Reasons are passed on verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The ledger could not be reached, trying again later may work.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// The ledger refused the request, e.g. a reverted transaction.
    #[error("ledger rejected the request: {0}")]
    Rejected(String),
}

/// Access to the channel contract on the ledger.
///
/// Returned futures resolve once the transaction is mined.
pub trait LedgerClient {
    /// Call `submitFinalState` with both signatures.
    fn submit_settlement(
        &self,
        request: SettlementRequest,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send;

    fn channel_info(&self) -> impl Future<Output = Result<ChannelInfo, CollaboratorError>> + Send;

    fn redeem_voucher(
        &self,
        voucher: VoucherRecord,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send;
}

impl<T: LedgerClient + ?Sized> LedgerClient for &T {
    fn submit_settlement(
        &self,
        request: SettlementRequest,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send {
        (**self).submit_settlement(request)
    }

    fn channel_info(&self) -> impl Future<Output = Result<ChannelInfo, CollaboratorError>> + Send {
        (**self).channel_info()
    }

    fn redeem_voucher(
        &self,
        voucher: VoucherRecord,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send {
        (**self).redeem_voucher(voucher)
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("channel has no checkpoint")]
    NoCheckpoint,
    #[error("channel never advanced past the funded state")]
    NothingToSettle,
    #[error("checkpoint cannot be settled: {0}")]
    InvalidCheckpoint(#[source] AdoptError),
    #[error(transparent)]
    Voucher(#[from] VoucherError),
    #[error("ledger unavailable: {0}")]
    CollaboratorUnavailable(String),
    #[error("ledger rejected the request: {0}")]
    CollaboratorRejected(String),
    #[error("ledger disagrees with the local checkpoint: {0}")]
    SettlementInconsistency(String),
    /// The channel is closed on the ledger but the local ledger could not
    /// record it. Calling again reports [Settlement::AlreadySettled].
    #[error("could not record the closed channel: {0}")]
    Persist(#[from] StoreError),
}

impl SettlementError {
    /// `true` if the local and on-chain views diverged. Retrying does not
    /// help, a human has to look at it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SettlementError::SettlementInconsistency(_))
    }
}

impl From<CollaboratorError> for SettlementError {
    fn from(e: CollaboratorError) -> Self {
        match e {
            CollaboratorError::Unavailable(reason) => Self::CollaboratorUnavailable(reason),
            CollaboratorError::Rejected(reason) => Self::CollaboratorRejected(reason),
        }
    }
}

/// Outcome of [SettlementSubmitter::finalize_bidirectional].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Our transaction closed the channel.
    Settled {
        confirmation: TxConfirmation,
        info: ChannelInfo,
    },
    /// The channel was already closed with our balances, e.g. by an earlier
    /// attempt or by the counterparty. Nothing was submitted.
    AlreadySettled(ChannelInfo),
}

impl Settlement {
    pub fn info(&self) -> &ChannelInfo {
        match self {
            Settlement::Settled { info, .. } => info,
            Settlement::AlreadySettled(info) => info,
        }
    }
}

#[derive(Debug)]
pub struct SettlementSubmitter<C> {
    client: C,
    verifier: VoucherVerifier,
}

impl<C: LedgerClient> SettlementSubmitter<C> {
    /// `chain_id` is the chain `client` is connected to.
    pub fn new(client: C, chain_id: u64) -> Self {
        Self {
            client,
            verifier: VoucherVerifier::new(chain_id),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn chain_id(&self) -> u64 {
        self.verifier.chain_id()
    }

    /// Close the channel on the ledger with the latest checkpoint of
    /// `ledger`.
    ///
    /// Safe to call again after a failure: a channel the ledger already
    /// closed with the same balances is reported as
    /// [Settlement::AlreadySettled]. On success `ledger` is marked closed.
    pub async fn finalize_bidirectional<S: CheckpointStore>(
        &self,
        ledger: &ChannelLedger<S>,
    ) -> Result<Settlement, SettlementError> {
        let checkpoint = ledger.snapshot().ok_or(SettlementError::NoCheckpoint)?;
        if checkpoint.nonce() == 0 {
            return Err(SettlementError::NothingToSettle);
        }
        ledger
            .verify(&checkpoint)
            .map_err(SettlementError::InvalidCheckpoint)?;
        let state = checkpoint.state();

        let before = self.client.channel_info().await?;
        let identity = ledger.identity();
        for (role, reported) in [(Role::A, before.party_a), (Role::B, before.party_b)] {
            if reported != identity.party(role) {
                return Err(inconsistency(format!(
                    "ledger reports party {} as {}, expected {}",
                    role,
                    reported,
                    identity.party(role)
                )));
            }
        }
        if before.is_closed {
            if before.matches_state(&state) {
                info!(
                    "Channel {} already settled, nothing to submit",
                    identity.contract
                );
                ledger.mark_closed()?;
                return Ok(Settlement::AlreadySettled(before));
            }
            return Err(inconsistency(format!(
                "channel closed at nonce {} with {}/{}, checkpoint is nonce {} with {}/{}",
                before.nonce,
                before.balance_a,
                before.balance_b,
                state.nonce,
                state.balance_a,
                state.balance_b
            )));
        }

        debug!(
            "Submitting checkpoint nonce={} to {}",
            state.nonce, identity.contract
        );
        let confirmation = self
            .client
            .submit_settlement(SettlementRequest::from(&checkpoint))
            .await?;

        let after = self.client.channel_info().await?;
        if !after.is_closed {
            return Err(inconsistency(format!(
                "channel still open after transaction {}",
                confirmation.tx_hash
            )));
        }
        if !after.matches_state(&state) {
            return Err(inconsistency(format!(
                "ledger settled nonce {} with {}/{}, checkpoint is nonce {} with {}/{}",
                after.nonce,
                after.balance_a,
                after.balance_b,
                state.nonce,
                state.balance_a,
                state.balance_b
            )));
        }

        ledger.mark_closed()?;
        info!(
            "Settled channel {} at nonce {} in block {}",
            identity.contract, state.nonce, confirmation.block_number
        );
        Ok(Settlement::Settled {
            confirmation,
            info: after,
        })
    }

    /// Verify `voucher` for this chain and hand it to the ledger.
    ///
    /// Double redemption is detected by the ledger and comes back as
    /// [SettlementError::CollaboratorRejected].
    pub async fn redeem_voucher(
        &self,
        voucher: &Voucher,
    ) -> Result<TxConfirmation, SettlementError> {
        self.verifier.verify(voucher)?;
        let confirmation = self
            .client
            .redeem_voucher(VoucherRecord::from(voucher))
            .await
            .inspect_err(|e| warn!("Voucher from {} not redeemed: {}", voucher.from, e))?;
        info!(
            "Redeemed voucher from {} for {} in tx {}",
            voucher.from, voucher.amount, confirmation.tx_hash
        );
        Ok(confirmation)
    }
}

fn inconsistency(reason: String) -> SettlementError {
    warn!("Settlement inconsistency: {}", reason);
    SettlementError::SettlementInconsistency(reason)
}
