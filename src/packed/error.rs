//! Error type and Return values used by the packed Serializer.

use serde::ser;
use thiserror::Error;

/// Represents all possible errors that can happen during Serialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The struct contains a type that has no `abi.encodePacked` equivalent.
    ///
    /// For example floating point numbers, enums, options and maps. We do not
    /// pick a representation for them, as that would force a specific layout
    /// on the Solidity side. Convert the value into a representable type (or
    /// implement a custom serialize method) before hashing it.
    #[error("type is not representable in packed encoding: {0}")]
    TypeNotRepresentable(&'static str),
    /// Although the type is representable in Solidity, the Serializer
    /// currently does not implement this functionality.
    #[error("type is not yet implemented: {0}")]
    TypeNotYetSupported(&'static str),
    /// Raised by a custom `Serialize` implementation.
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: core::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

/// Alias for `Result` using the [Error] returned by the Serializer.
pub type Result<T> = core::result::Result<T, Error>;
