//! Startup hooks
//!
//! A session defers migration and rehydration to "startup". What startup
//! means belongs to the host: a CLI starts immediately, an application shell
//! may wait until its runtime is ready. Hosts that are not clients (servers,
//! build tools) never run startup at all.

use parking_lot::Mutex;
use std::fmt;
use tracing::debug;

/// Deferred startup work
pub type StartupTask = Box<dyn FnOnce() + Send>;

/// Host lifecycle as seen by a session
pub trait Lifecycle: Send + Sync {
    /// True if this process is a client; only clients rehydrate
    fn is_client(&self) -> bool {
        true
    }

    /// Run `task` once the host has started (immediately if it already has)
    fn on_startup(&self, task: StartupTask);
}

/// Runs startup work on registration
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateStartup;

impl Lifecycle for ImmediateStartup {
    fn on_startup(&self, task: StartupTask) {
        task();
    }
}

/// Non-client host: startup work is dropped
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerLifecycle;

impl Lifecycle for ServerLifecycle {
    fn is_client(&self) -> bool {
        false
    }

    fn on_startup(&self, _task: StartupTask) {}
}

#[derive(Default)]
struct QueueState {
    started: bool,
    tasks: Vec<StartupTask>,
}

/// Holds startup work until [`fire`](StartupQueue::fire) is called
#[derive(Default)]
pub struct StartupQueue {
    state: Mutex<QueueState>,
}

impl StartupQueue {
    /// Queue that has not started yet
    pub fn new() -> Self {
        Self::default()
    }

    /// True once fired
    pub fn has_started(&self) -> bool {
        self.state.lock().started
    }

    /// Number of tasks waiting for startup
    pub fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Mark the host started and run every queued task in registration order.
    ///
    /// Later calls are no-ops; tasks registered afterwards run immediately.
    pub fn fire(&self) {
        let tasks = {
            let mut state = self.state.lock();
            if state.started {
                return;
            }
            state.started = true;
            std::mem::take(&mut state.tasks)
        };
        debug!(target: "sessiondb::session", tasks = tasks.len(), "Running startup tasks");
        for task in tasks {
            task();
        }
    }
}

impl Lifecycle for StartupQueue {
    fn on_startup(&self, task: StartupTask) {
        let mut state = self.state.lock();
        if state.started {
            drop(state);
            task();
        } else {
            state.tasks.push(task);
        }
    }
}

impl fmt::Debug for StartupQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StartupQueue")
            .field("started", &state.started)
            .field("pending", &state.tasks.len())
            .finish()
    }
}
