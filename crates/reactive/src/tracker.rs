//! The tracker: current computation, autorun, and the deferred flush queue
//!
//! The current computation and the queue of invalidated computations are
//! thread-local. Invalidation only enqueues; computations re-run when the
//! owning thread calls [`Tracker::flush`].

use crate::computation::Computation;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use tracing::{trace, warn};

/// Re-runs allowed in one flush before it gives up on a cycle
pub const MAX_FLUSH_RERUNS: usize = 10_000;

thread_local! {
    static CURRENT: RefCell<Option<Computation>> = const { RefCell::new(None) };
    static PENDING: RefCell<VecDeque<Computation>> = const { RefCell::new(VecDeque::new()) };
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

struct RestoreCurrent(Option<Computation>);

impl Drop for RestoreCurrent {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Run `f` with `computation` as the current computation, restoring the
/// previous one afterwards (also on unwind).
pub(crate) fn with_current<R>(computation: Option<Computation>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT.with(|current| current.replace(computation));
    let _restore = RestoreCurrent(previous);
    f()
}

pub(crate) fn schedule(computation: Computation) {
    PENDING.with(|pending| pending.borrow_mut().push_back(computation));
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flushing| flushing.set(false));
    }
}

/// Entry points of the dependency-tracking runtime
pub struct Tracker;

impl Tracker {
    /// True while a computation is running on this thread
    pub fn active() -> bool {
        CURRENT.with(|current| current.borrow().is_some())
    }

    /// The computation running on this thread, if any
    pub fn current() -> Option<Computation> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Run `f` now and again after anything it read changes.
    ///
    /// Called inside another computation, the new computation is stopped
    /// when the outer one is invalidated. The returned handle keeps the
    /// computation alive; dropping every handle ends tracking.
    pub fn autorun<F>(f: F) -> Computation
    where
        F: FnMut(&Computation) + Send + 'static,
    {
        let computation = Computation::new(Box::new(f));

        if let Some(parent) = Self::current() {
            let child = computation.clone();
            parent.on_invalidate(move |_| child.stop());
        }

        computation.start();
        computation
    }

    /// Run `f` with no current computation
    pub fn nonreactive<R>(f: impl FnOnce() -> R) -> R {
        with_current(None, f)
    }

    /// Register `f` on the current computation's next invalidation.
    ///
    /// Returns false, without registering, outside a computation.
    pub fn on_invalidate<F>(f: F) -> bool
    where
        F: FnOnce(&Computation) + Send + 'static,
    {
        match Self::current() {
            Some(computation) => {
                computation.on_invalidate(f);
                true
            }
            None => false,
        }
    }

    /// Number of computations waiting to re-run on this thread
    pub fn pending() -> usize {
        PENDING.with(|pending| pending.borrow().len())
    }

    /// Re-run every invalidated computation on this thread until none remain.
    ///
    /// Returns the number of re-runs. A nested call (from inside a re-run) is
    /// ignored and returns 0.
    pub fn flush() -> usize {
        if FLUSHING.with(|flushing| flushing.replace(true)) {
            trace!(target: "sessiondb::reactive", "Nested flush ignored");
            return 0;
        }
        let _guard = FlushGuard;

        let mut reruns = 0;
        while let Some(computation) = PENDING.with(|pending| pending.borrow_mut().pop_front()) {
            if reruns >= MAX_FLUSH_RERUNS {
                let dropped = PENDING.with(|pending| {
                    let mut pending = pending.borrow_mut();
                    let dropped = pending.len() + 1;
                    pending.clear();
                    dropped
                });
                warn!(
                    target: "sessiondb::reactive",
                    reruns,
                    dropped,
                    "Flush did not settle, dropping pending computations"
                );
                break;
            }
            if computation.recompute() {
                reruns += 1;
            }
        }

        if reruns > 0 {
            trace!(target: "sessiondb::reactive", reruns, "Flushed");
        }
        reruns
    }
}
