//! Storage layer for sessiondb
//!
//! This crate implements the durable backing store the session engine syncs
//! with:
//! - DurableStore: synchronous string-keyed JSON store (the engine's only contract)
//! - StorageMedium: raw string medium underneath a store
//! - EnvelopeStore: `{"data", "expires"}` framing with logical expiration
//! - MemoryMedium: in-process medium (tests, simulated reloads)
//! - FileMedium: single JSON file, atomic rewrite on every mutation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod file;
pub mod medium;
pub mod traits;

pub use envelope::{Envelope, EnvelopeStore, ENVELOPE_PREFIX};
pub use file::FileMedium;
pub use medium::MemoryMedium;
pub use traits::{DurableStore, StorageMedium};
