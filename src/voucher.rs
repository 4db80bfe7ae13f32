//! Unidirectional payments: a voucher signed by the payer alone, redeemable
//! by a third party through the ledger.

use crate::{
    packed::{
        self,
        types::{Address, Hash, Signature, U256},
    },
    sig::{self, DigestSigner},
};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;


#[derive(Debug, Error)]
pub enum VoucherError {
    #[error("voucher amount must be positive")]
    InvalidAmount,
    #[error("voucher is bound to chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },
    #[error("voucher claims to be from {expected} but was signed by {recovered}")]
    SignatureMismatch { expected: Address, recovered: Address },
    #[error("malformed voucher signature: {0}")]
    InvalidSignatureEncoding(#[from] sig::Error),
    #[error(transparent)]
    Encoding(#[from] packed::Error),
}

/// Signed promise of `from` to pay `amount` to `to` on chain `chain_id`.
///
/// Whether a voucher was already redeemed is only known to the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Voucher {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    /// Unix timestamp in seconds.
    pub issued_at: u64,
    pub chain_id: u64,
    pub signature: Signature,
}

// Field order is the layout the redeeming contract hashes.
#[derive(Serialize)]
struct VoucherCommitment {
    from: Address,
    to: Address,
    amount: U256,
    timestamp: u64,
    chain_id: u64,
}

impl Voucher {
    /// Issue a voucher timestamped with the current time.
    pub fn issue<S: DigestSigner>(
        signer: &S,
        to: Address,
        amount: U256,
        chain_id: u64,
    ) -> Result<Self, VoucherError> {
        // Pre-1970 clocks are clamped to zero.
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        Self::issue_at(signer, to, amount, now, chain_id)
    }

    pub fn issue_at<S: DigestSigner>(
        signer: &S,
        to: Address,
        amount: U256,
        issued_at: u64,
        chain_id: u64,
    ) -> Result<Self, VoucherError> {
        if amount.is_zero() {
            return Err(VoucherError::InvalidAmount);
        }
        let from = signer.address();
        let digest = Self::commitment_digest(from, to, amount, issued_at, chain_id)?;
        let signature = signer.sign_digest(digest)?;
        debug!(
            "Issued voucher {} -> {} for {} on chain {}",
            from, to, amount, chain_id
        );
        Ok(Voucher {
            from,
            to,
            amount,
            issued_at,
            chain_id,
            signature,
        })
    }

    pub fn digest(&self) -> Result<Hash, packed::Error> {
        Self::commitment_digest(
            self.from,
            self.to,
            self.amount,
            self.issued_at,
            self.chain_id,
        )
    }

    /// Check that the voucher is for a positive amount and was signed by
    /// `from`, returning the signer.
    ///
    /// The chain is not checked, use a [VoucherVerifier] for that.
    pub fn verify(&self) -> Result<Address, VoucherError> {
        if self.amount.is_zero() {
            return Err(VoucherError::InvalidAmount);
        }
        let recovered = sig::recover_signer(self.digest()?, self.signature)?;
        if recovered != self.from {
            return Err(VoucherError::SignatureMismatch {
                expected: self.from,
                recovered,
            });
        }
        Ok(recovered)
    }

    fn commitment_digest(
        from: Address,
        to: Address,
        amount: U256,
        timestamp: u64,
        chain_id: u64,
    ) -> Result<Hash, packed::Error> {
        packed::to_hash(&VoucherCommitment {
            from,
            to,
            amount,
            timestamp,
            chain_id,
        })
    }
}

/// Verifies vouchers for one chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VoucherVerifier {
    chain_id: u64,
}

impl VoucherVerifier {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Reject vouchers for other chains, then check the signature.
    pub fn verify(&self, voucher: &Voucher) -> Result<Address, VoucherError> {
        if voucher.chain_id != self.chain_id {
            warn!(
                "Voucher from {} is bound to chain {}, this is chain {}",
                voucher.from, voucher.chain_id, self.chain_id
            );
            return Err(VoucherError::WrongChain {
                expected: self.chain_id,
                actual: voucher.chain_id,
            });
        }
        voucher.verify()
    }
}
