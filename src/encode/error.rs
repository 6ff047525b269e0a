//! Error type returned by the canonical slot encoder.

use serde::ser;
use thiserror::Error;

/// Represents all possible errors that can happen while encoding a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The value contains a type that has no canonical slot representation.
    ///
    /// For example floating point numbers, maps and optional values. Anything
    /// that ends up inside a signed message must have exactly one byte
    /// representation, so we reject these instead of picking one.
    #[error("type has no canonical slot encoding: {0}")]
    TypeNotRepresentable(&'static str),
    /// Error raised by a custom `Serialize` implementation.
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

/// Alias for `Result` using the [Error] returned by the encoder.
pub type Result<T> = std::result::Result<T, Error>;
