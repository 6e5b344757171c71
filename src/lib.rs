//! sessiondb - Tiered, reactive, durably persisted session store
//!
//! A session is a key-value store where each key lives for one of three
//! lifetimes: `Temporary` (memory only), `Persistent` (survives restarts) or
//! `Authenticated` (survives restarts, wiped on logout). Every read can be
//! observed by the dependency tracker, so computations re-run when the values
//! they read change.
//!
//! # Quick Start
//!
//! ```ignore
//! use sessiondb::{PersistentSession, SessionEnv, Tracker, Value};
//!
//! let session = PersistentSession::open("app", SessionEnv::in_memory())?;
//! session.set_persistent("theme", "dark")?;
//!
//! let watcher = Tracker::autorun({
//!     let session = session.clone();
//!     move |_| println!("dark mode: {}", session.equals("theme", "dark").unwrap_or(false))
//! });
//!
//! session.set_persistent("theme", "light")?;
//! Tracker::flush(); // the watcher re-runs here
//! ```
//!
//! # Architecture
//!
//! - `sessiondb-core`: values, lifetimes, namespaces, errors
//! - `sessiondb-codec`: extended-JSON value codec
//! - `sessiondb-storage`: durable stores and media
//! - `sessiondb-reactive`: dependency tracking
//! - `sessiondb-engine`: sessions, migrations, configuration

pub use sessiondb_codec::{get_codec, CodecError, EjsonCodec, ValueCodec};
pub use sessiondb_core::{Error, Lifetime, Namespace, Result, Value};
pub use sessiondb_engine::{
    data_version, default_session, install_default, run_migrations, IdentityProvider,
    ImmediateStartup, Lifecycle, MigrationReport, PersistentSession, ReactiveDict,
    ReactiveIdentity, ServerLifecycle, SessionConfig, SessionEnv, StartupQueue,
    CONFIG_FILE_NAME, CURRENT_DATA_VERSION,
};
pub use sessiondb_reactive::{Computation, Dependency, Tracker};
pub use sessiondb_storage::{
    DurableStore, Envelope, EnvelopeStore, FileMedium, MemoryMedium, StorageMedium,
};
