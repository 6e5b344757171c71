//! Dependencies: the thing a computation waits on

use crate::computation::{Computation, ComputationInner};
use crate::tracker::Tracker;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};

type Dependents = FxHashMap<u64, Weak<ComputationInner>>;

/// A source of change that computations can depend on.
///
/// Dependents are held weakly: dropping every handle to a computation
/// releases it from all of its dependencies. A computation is also removed
/// as soon as it is invalidated, so each run re-registers what it reads.
#[derive(Clone, Default)]
pub struct Dependency {
    dependents: Arc<Mutex<Dependents>>,
}

impl Dependency {
    /// New dependency with no dependents
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the current computation depend on this one.
    ///
    /// Returns true if a new dependent was registered; false outside a
    /// computation or if it was already registered.
    pub fn depend(&self) -> bool {
        match Tracker::current() {
            Some(computation) => self.depend_on(&computation),
            None => false,
        }
    }

    /// Make `computation` depend on this one
    pub fn depend_on(&self, computation: &Computation) -> bool {
        let id = computation.id();
        {
            let mut dependents = self.dependents.lock();
            if dependents.contains_key(&id) {
                return false;
            }
            dependents.insert(id, Arc::downgrade(&computation.inner));
        }

        let weak = Arc::downgrade(&self.dependents);
        computation.on_invalidate(move |_| {
            if let Some(dependents) = weak.upgrade() {
                dependents.lock().remove(&id);
            }
        });
        true
    }

    /// Invalidate every dependent.
    ///
    /// Re-runs are deferred to the next flush; nothing re-runs inside this call.
    pub fn changed(&self) {
        let targets: Vec<Computation> = self
            .dependents
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .map(Computation::from_inner)
            .collect();

        for computation in targets {
            computation.invalidate();
        }
    }

    /// True while at least one live computation depends on this
    pub fn has_dependents(&self) -> bool {
        let mut dependents = self.dependents.lock();
        dependents.retain(|_, weak| weak.strong_count() > 0);
        !dependents.is_empty()
    }

    /// Number of live dependents
    pub fn dependent_count(&self) -> usize {
        self.dependents
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("dependents", &self.dependent_count())
            .finish()
    }
}
