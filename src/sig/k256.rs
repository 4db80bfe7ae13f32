//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use crate::packed::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as k256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha3::{Digest, Keccak256};

use super::{hash_to_eth_signed_msg_hash, DigestSigner, Error};

/// Half the secp256k1 group order, big endian. Signatures with a larger `s`
/// are rejected.
pub(super) const HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Holds a secp256k1 key in memory.
#[derive(Debug)]
pub struct Signer {
    key: SigningKey,
    addr: Address,
}

impl From<VerifyingKey> for Address {
    fn from(key: VerifyingKey) -> Self {
        // See https://ethereum.stackexchange.com/questions/65233/goethereum-getting-public-key-from-private-key-hex-formatting
        //
        // The uncompressed encoding is `0x04 || x || y`. Throw away the first
        // byte, which is not part of the public key.
        let point = key.to_encoded_point(false);
        let hash: [u8; 32] = Keccak256::digest(&point.as_bytes()[1..]).into();

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash[32 - 20..]);
        addr
    }
}

impl Signer {
    /// Generate a fresh key.
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        Self::from_key(SigningKey::random(&mut *rng))
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, Error> {
        let key = SigningKey::from_bytes(secret)?;
        Ok(Self::from_key(key))
    }

    /// Parse a hex secret as exported by common wallets (`0x` prefix
    /// optional).
    pub fn from_secret_hex(secret: &str) -> Result<Self, Error> {
        let digits = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes: [u8; 32] = hex::decode(digits)
            .map_err(|e| Error::InvalidSecretKey(e.to_string()))?
            .try_into()
            .map_err(|b: Vec<u8>| {
                Error::InvalidSecretKey(format!("expected 32 bytes, got {}", b.len()))
            })?;
        Self::from_secret_bytes(&bytes)
    }

    fn from_key(key: SigningKey) -> Self {
        let addr = key.verifying_key().into();
        Self { key, addr }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig: recoverable::Signature = self.key.sign_prehash(&hash.0)?;

        // Luckily for us, this Signature type already has the format we need:
        // - 65 bytes containing r, s and v in this order
        //
        // But we still have to add 27 to v for the signature to be valid in the
        // EVM.
        let mut sig_bytes: [u8; 65] = sig
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidEncoding(k256::ecdsa::Error::new()))?;
        // k256 normalizes s, OpenZeppelin rejects the high-s solution.
        debug_assert!(sig_bytes[32] & 0x80 == 0);
        sig_bytes[64] += 27;

        Ok(Signature(sig_bytes))
    }
}

impl DigestSigner for Signer {
    fn address(&self) -> Address {
        self.addr
    }

    fn sign_digest(&self, digest: Hash) -> Result<Signature, Error> {
        self.sign_eth(digest)
    }
}

/// Recover the address that produced `eth_sig`.
///
/// `msg` is the digest given to [Signer::sign_eth], it should not include the
/// `Ethereum Signed Message` prefix.
pub fn recover_signer(msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
    // "\x19Ethereum Signed Message:\n32" format
    let hash = hash_to_eth_signed_msg_hash(msg);

    // Undo adding the 27, to go back to the format expected below
    let mut sig_bytes: [u8; 65] = eth_sig.0;
    sig_bytes[64] = match eth_sig.v() {
        v @ (27 | 28) => v - 27,
        v => return Err(Error::InvalidRecoveryId(v)),
    };
    // Equal length slices compare like big endian numbers
    if sig_bytes[32..64] > HALF_ORDER[..] {
        return Err(Error::NonCanonicalS);
    }

    let sig = recoverable::Signature::from_bytes(&sig_bytes)?;

    let verifying_key = sig.recover_verifying_key_from_digest_bytes(&hash.0.into())?;
    Ok(verifying_key.into())
}
