use super::{ChannelIdentity, ChannelState, Role};
use crate::{
    packed::{
        self,
        types::{Hash, Signature},
    },
    sig,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint digest does not match its state")]
    DigestMismatch,
    #[error("signature of party {0} does not verify")]
    BadSignature(Role),
    #[error("malformed signature of party {role}: {source}")]
    InvalidSignatureEncoding {
        role: Role,
        #[source]
        source: sig::Error,
    },
    #[error(transparent)]
    Encoding(#[from] packed::Error),
}

/// A [ChannelState] signed by both parties.
///
/// Immutable: every transfer produces a new checkpoint. Exchanged by value
/// between the parties.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    state: ChannelState,
    digest: Hash,
    signatures: [Signature; 2],
}

impl Checkpoint {
    /// Assemble a checkpoint, computing the digest of `state` under
    /// `identity`. The signatures are not checked here, see [Self::verify].
    pub fn new(
        identity: &ChannelIdentity,
        state: ChannelState,
        sig_a: Signature,
        sig_b: Signature,
    ) -> Result<Self, packed::Error> {
        Ok(Self::from_parts(
            state,
            state.digest(identity)?,
            [sig_a, sig_b],
        ))
    }

    /// Assemble a checkpoint as received, with the digest the sender claims.
    pub fn from_parts(state: ChannelState, digest: Hash, signatures: [Signature; 2]) -> Self {
        Checkpoint {
            state,
            digest,
            signatures,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn nonce(&self) -> u64 {
        self.state.nonce
    }

    pub fn digest(&self) -> Hash {
        self.digest
    }

    pub fn signature(&self, role: Role) -> Signature {
        self.signatures[role.index()]
    }

    /// Check that the digest belongs to the state and both signatures over it
    /// recover to the parties of `identity`.
    ///
    /// Does not look at balances or the nonce, that is up to the
    /// [ChannelLedger](super::ChannelLedger).
    pub fn verify(&self, identity: &ChannelIdentity) -> Result<(), CheckpointError> {
        if self.state.digest(identity)? != self.digest {
            return Err(CheckpointError::DigestMismatch);
        }
        for role in Role::BOTH {
            let valid = sig::verify(identity.party(role), self.digest, self.signature(role))
                .map_err(|source| CheckpointError::InvalidSignatureEncoding { role, source })?;
            if !valid {
                return Err(CheckpointError::BadSignature(role));
            }
        }
        Ok(())
    }
}
