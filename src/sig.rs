//! Handles the creation and verification of (Ethereum) Signatures.

use crate::packed::types::{Address, Hash, Signature};
use sha3::{Digest, Keccak256};
use thiserror::Error;

mod k256;
pub use self::k256::{recover_signer, Signer};

#[cfg(test)]
pub(crate) mod tests;

#[derive(Debug, Error)]
pub enum Error {
    /// `v` has to be 27 or 28, anything else cannot come out of
    /// [Signer::sign_eth] or `eth_sign`.
    #[error("signature recovery byte must be 27 or 28, got {0}")]
    InvalidRecoveryId(u8),
    /// The `s` value is in the upper half of the curve order. Its low-s twin
    /// recovers to the same key, contracts and wallets only accept that one.
    #[error("signature s value is not in the lower half of the curve order")]
    NonCanonicalS,
    #[error("invalid signature encoding: {0}")]
    InvalidEncoding(#[from] ::k256::ecdsa::Error),
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
}

/// Produces Ethereum signatures over 32-byte digests.
///
/// This is the seam for wallets: the key may live in this process
/// ([Signer]), in a hardware wallet, or with the counterparty, who returns its
/// signature over the transport.
pub trait DigestSigner {
    /// Address the signatures recover to.
    fn address(&self) -> Address;

    /// Sign `digest` in the `eth_sign` format.
    fn sign_digest(&self, digest: Hash) -> Result<Signature, Error>;
}

impl<T: DigestSigner + ?Sized> DigestSigner for &T {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn sign_digest(&self, digest: Hash) -> Result<Signature, Error> {
        (**self).sign_digest(digest)
    }
}

/// Check that `sig` over `digest` was produced by `expected`.
///
/// A well-formed signature from someone else is `Ok(false)`, only malformed
/// signatures are an error.
pub fn verify(expected: Address, digest: Hash, sig: Signature) -> Result<bool, Error> {
    Ok(recover_signer(digest, sig)? == expected)
}

/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
///
/// This is the format expected by the Solidity contracts.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding of a fixed prefix, no need for the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}
