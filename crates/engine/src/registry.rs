//! Process-wide default session
//!
//! Opening the reserved namespace `"session"` always yields the same
//! instance. It is created once, by whichever of [`install_default`] or
//! [`default_session`] runs first, and lives until the process exits.

use crate::env::SessionEnv;
use crate::session::PersistentSession;
use once_cell::sync::OnceCell;
use sessiondb_core::Namespace;
use tracing::debug;

static DEFAULT_SESSION: OnceCell<PersistentSession> = OnceCell::new();

/// Install the default session built from `env`.
///
/// If a default session already exists it is returned unchanged and `env`
/// is dropped.
pub fn install_default(env: SessionEnv) -> PersistentSession {
    let mut installed = false;
    let session = DEFAULT_SESSION
        .get_or_init(|| {
            installed = true;
            PersistentSession::create(Namespace::default_instance(), env)
        })
        .clone();
    if !installed {
        debug!(target: "sessiondb::session", "Default session already installed, ignoring new environment");
    }
    session
}

/// The default session, created over an in-memory store if none is installed
pub fn default_session() -> PersistentSession {
    DEFAULT_SESSION
        .get_or_init(|| PersistentSession::create(Namespace::default_instance(), SessionEnv::in_memory()))
        .clone()
}

/// True once a default session exists
pub fn is_default_installed() -> bool {
    DEFAULT_SESSION.get().is_some()
}
