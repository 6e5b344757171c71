//! Computations: re-runnable closures that track what they read

use crate::tracker::{schedule, with_current};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_COMPUTATION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type ComputeFn = Box<dyn FnMut(&Computation) + Send>;
type Callback = Box<dyn FnOnce(&Computation) + Send>;

#[derive(Default)]
struct ComputationState {
    invalidated: bool,
    stopped: bool,
    first_run: bool,
    recomputing: bool,
    on_invalidate: Vec<Callback>,
    on_stop: Vec<Callback>,
}

pub(crate) struct ComputationInner {
    id: u64,
    state: Mutex<ComputationState>,
    func: Mutex<Option<ComputeFn>>,
}

/// Handle to a running computation.
///
/// A computation re-runs its closure after something it depended on changed.
/// Re-runs never happen inside `changed()`; they wait for
/// [`Tracker::flush`](crate::Tracker::flush).
///
/// Handles are cheap to clone and compare equal when they refer to the same
/// computation.
#[derive(Clone)]
pub struct Computation {
    pub(crate) inner: Arc<ComputationInner>,
}

impl Computation {
    pub(crate) fn new(func: ComputeFn) -> Self {
        Computation {
            inner: Arc::new(ComputationInner {
                id: NEXT_COMPUTATION_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(ComputationState {
                    first_run: true,
                    ..ComputationState::default()
                }),
                func: Mutex::new(Some(func)),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ComputationInner>) -> Self {
        Computation { inner }
    }

    /// Process-unique id
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// True while the closure runs for the first time
    pub fn is_first_run(&self) -> bool {
        self.inner.state.lock().first_run
    }

    /// True once invalidated and not yet re-run
    pub fn is_invalidated(&self) -> bool {
        self.inner.state.lock().invalidated
    }

    /// True once stopped; a stopped computation never re-runs
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// Register a callback for the next invalidation.
    ///
    /// Runs immediately if the computation is already invalidated. Callbacks
    /// run in registration order, outside any reactive context.
    pub fn on_invalidate<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.invalidated {
            drop(state);
            with_current(None, || f(self));
        } else {
            state.on_invalidate.push(Box::new(f));
        }
    }

    /// Register a callback for when the computation stops.
    ///
    /// Runs immediately if the computation is already stopped.
    pub fn on_stop<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.stopped {
            drop(state);
            with_current(None, || f(self));
        } else {
            state.on_stop.push(Box::new(f));
        }
    }

    /// Mark the computation for re-run and fire its invalidation callbacks.
    ///
    /// Idempotent until the next re-run.
    pub fn invalidate(&self) {
        let (schedule_rerun, callbacks) = {
            let mut state = self.inner.state.lock();
            if state.invalidated {
                return;
            }
            state.invalidated = true;
            let schedule_rerun = !state.recomputing && !state.stopped;
            (schedule_rerun, std::mem::take(&mut state.on_invalidate))
        };

        if schedule_rerun {
            schedule(self.clone());
        }

        with_current(None, || {
            for callback in callbacks {
                callback(self);
            }
        });
    }

    /// Stop the computation: invalidate it one last time and never re-run.
    pub fn stop(&self) {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            std::mem::take(&mut state.on_stop)
        };

        self.invalidate();

        // Release whatever the closure captured; `None` while it is running.
        let func = self.inner.func.lock().take();
        drop(func);

        with_current(None, || {
            for callback in callbacks {
                callback(self);
            }
        });
    }

    /// Run the closure with this computation as the current one.
    fn run(&self) {
        let func = self.inner.func.lock().take();
        let Some(mut func) = func else {
            return;
        };

        with_current(Some(self.clone()), || func(self));

        if !self.is_stopped() {
            *self.inner.func.lock() = Some(func);
        }
    }

    /// First run, straight from `Tracker::autorun`
    pub(crate) fn start(&self) {
        self.inner.state.lock().recomputing = true;
        self.run();
        self.finish_run();
    }

    /// Re-run if invalidated and not stopped. Returns true if the closure ran.
    pub(crate) fn recompute(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.invalidated || state.stopped {
                return false;
            }
            state.invalidated = false;
            state.recomputing = true;
        }
        self.run();
        self.finish_run();
        true
    }

    fn finish_run(&self) {
        let needs_rerun = {
            let mut state = self.inner.state.lock();
            state.recomputing = false;
            state.first_run = false;
            state.invalidated && !state.stopped
        };
        // invalidated by its own run: the invalidate() call skipped scheduling
        if needs_rerun {
            schedule(self.clone());
        }
    }
}

impl PartialEq for Computation {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Computation {}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("invalidated", &state.invalidated)
            .field("stopped", &state.stopped)
            .field("first_run", &state.first_run)
            .finish()
    }
}
