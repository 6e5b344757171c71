//! Error types for sessiondb
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for sessiondb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the session store
#[derive(Debug, Error)]
pub enum Error {
    /// A caller passed an argument the operation cannot accept
    /// (empty namespace, composite value given to an equality query, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored text or JSON could not be decoded into a value
    #[error("Decode failure: {0}")]
    Decode(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The durable backing store rejected an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error (file-backed storage media)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a `Decode` error
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Create a `Storage` error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a `Config` error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for `InvalidArgument`
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// True for `Decode`
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
