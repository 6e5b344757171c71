//! Shared test utilities for the root integration suites.
//!
//! Import via `mod common;`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
pub use sessiondb::{
    DurableStore, EnvelopeStore, FileMedium, PersistentSession, ReactiveIdentity, SessionEnv,
    Tracker, Value,
};
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (`RUST_LOG` filters it).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Namespace unique within the test process
pub fn unique_namespace(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{}_{}", prefix, n, uuid::Uuid::new_v4().simple())
}

// ============================================================================
// TestProfile - a browser profile on disk
// ============================================================================

/// File-backed storage that can be reopened to simulate a restart.
pub struct TestProfile {
    pub dir: TempDir,
}

impl TestProfile {
    pub fn new() -> Self {
        init_tracing();
        TestProfile {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn storage_path(&self) -> PathBuf {
        self.dir.path().join("local_storage.json")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A store over the profile's file, as a fresh process would open it
    pub fn store(&self) -> Arc<dyn DurableStore> {
        let medium = FileMedium::open(self.storage_path()).expect("Failed to open storage file");
        Arc::new(EnvelopeStore::new(medium))
    }

    pub fn env(&self) -> SessionEnv {
        SessionEnv::new(self.store())
    }

    /// Open `namespace` as a freshly started process would
    pub fn open(&self, namespace: &str) -> PersistentSession {
        PersistentSession::open(namespace, self.env()).expect("Failed to open session")
    }
}

impl Default for TestProfile {
    fn default() -> Self {
        Self::new()
    }
}
