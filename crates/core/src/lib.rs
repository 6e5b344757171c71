//! Core types for sessiondb
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum for everything a session stores
//! - Lifetime: Temporary / Persistent / Authenticated tiers and their resolution table
//! - Namespace: Validated store namespace and the durable keying scheme
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keys;
pub mod lifetime;
pub mod value;

pub use error::{Error, Result};
pub use keys::{Namespace, DEFAULT_NAMESPACE, PSA_KEYS, PS_DATA_VERSION, PS_KEYS};
pub use lifetime::Lifetime;
pub use value::Value;
