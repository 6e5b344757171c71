//! Dependency tracking for sessiondb
//!
//! A small transparent-reactivity runtime:
//! - Tracker: current computation, `autorun`, `nonreactive`, deferred `flush`
//! - Computation: a closure that re-runs after its dependencies change
//! - Dependency: a change source computations register on while they run
//!
//! Reads inside an `autorun` register the running computation on the
//! dependencies they touch. `Dependency::changed` invalidates those
//! computations; they re-run on the next `Tracker::flush` of the thread that
//! scheduled them, never synchronously inside the write.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod computation;
pub mod dependency;
pub mod tracker;

pub use computation::Computation;
pub use dependency::Dependency;
pub use tracker::{Tracker, MAX_FLUSH_RERUNS};
