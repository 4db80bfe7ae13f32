use core::{
    fmt::{Debug, Display},
    str::FromStr,
};

use rand::{distributions::Standard, prelude::Distribution};
use serde::Serialize;
use thiserror::Error;
use uint::construct_uint;

/// Error returned when parsing the text form of a value fails.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid decimal integer: {0}")]
    Decimal(String),
}

fn decode_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits)?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseError::Length { expected: N, actual })
}

macro_rules! impl_hex_fmt {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }

        impl Display for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                Debug::fmt(self, f)
            }
        }

        impl FromStr for $T {
            type Err = ParseError;

            /// Accepts hex with or without the `0x` prefix, in either case.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($T(decode_hex(s)?))
            }
        }
    };
}

macro_rules! bytesN {
    ( $T:ident, $N:literal ) => {
        #[derive(PartialEq, Eq, Hash, Copy, Clone)]
        pub struct $T(pub [u8; $N]);

        /// Written as the raw bytes, without padding.
        impl Serialize for $T {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl Distribution<$T> for Standard {
            fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> $T {
                $T(rng.gen())
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self([0; $N])
            }
        }

        impl_hex_fmt!($T);
    };
}

bytesN!(Hash, 32);

bytesN!(Signature, 65);
impl Signature {
    pub fn new(rs: &[u8; 64], v: u8) -> Self {
        let mut sig: Signature = Signature([0; 65]);
        sig.0[..64].copy_from_slice(rs);
        sig.0[64] = v;
        sig
    }

    /// The recovery byte (`v`), 27 or 28 for well-formed signatures.
    pub fn v(&self) -> u8 {
        self.0[64]
    }
}

// An address is written packed (20 bytes). The regular ABI encoding would
// right-align it in a 32 byte slot instead, which would give a different
// hash than the one computed by `abi.encodePacked` in the contracts.
bytesN!(Address, 20);

// We could use primitive_types::U256 here, but its serde implementation writes
// a hex string, which is not what we want for hashing. construct_uint gives us
// the same arithmetic without that.
construct_uint! {
    pub struct U256(4);
}

impl U256 {
    /// Parses the decimal text form used in the persisted records.
    pub fn from_decimal(s: &str) -> Result<Self, ParseError> {
        U256::from_dec_str(s).map_err(|e| ParseError::Decimal(format!("{s:?}: {e:?}")))
    }
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        serializer.serialize_bytes(&bytes)
    }
}

impl Distribution<U256> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let buf: [u8; 32] = rng.gen();
        U256::from_big_endian(&buf)
    }
}
