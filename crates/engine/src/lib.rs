//! Session engine for sessiondb
//!
//! This crate orchestrates the lower layers into a working session store:
//! - PersistentSession: tiered reads and writes, clears, equality queries
//! - ReactiveDict: in-memory values with per-key and per-value dependencies
//! - Migrations: versioned rewrites of durable data at startup
//! - Lifecycle / IdentityProvider: host seams for startup and logout
//! - Default instance: the process-wide `"session"` namespace
//!
//! The engine is the only component that knows about:
//! - Key lists and how they decide a key's lifetime
//! - Keeping memory and the durable store in step
//! - When migration and rehydration run

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dict;
pub mod env;
pub mod identity;
pub mod lifecycle;
pub mod migrate;
pub mod registry;
pub mod session;

pub use config::{SessionConfig, CONFIG_FILE_NAME};
pub use dict::ReactiveDict;
pub use env::SessionEnv;
pub use identity::{IdentityProvider, ReactiveIdentity};
pub use lifecycle::{ImmediateStartup, Lifecycle, ServerLifecycle, StartupQueue, StartupTask};
pub use migrate::{data_version, run_migrations, MigrationReport, CURRENT_DATA_VERSION};
pub use registry::{default_session, install_default};
pub use session::PersistentSession;
