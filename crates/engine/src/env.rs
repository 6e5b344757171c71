//! Collaborators a session is built from

use crate::config::SessionConfig;
use crate::identity::IdentityProvider;
use crate::lifecycle::{ImmediateStartup, Lifecycle};
use sessiondb_codec::{EjsonCodec, ValueCodec};
use sessiondb_storage::{DurableStore, EnvelopeStore, MemoryMedium};
use std::fmt;
use std::sync::Arc;

/// Everything a [`PersistentSession`](crate::PersistentSession) talks to.
///
/// Defaults: EJSON codec, no identity provider, immediate startup, default
/// config.
#[derive(Clone)]
pub struct SessionEnv {
    /// Durable backing store
    pub store: Arc<dyn DurableStore>,
    /// Value codec for durable slots and canonical text
    pub codec: Arc<dyn ValueCodec>,
    /// Signed-in user source; `None` disables logout eviction
    pub identity: Option<Arc<dyn IdentityProvider>>,
    /// When startup work runs
    pub lifecycle: Arc<dyn Lifecycle>,
    /// Default lifetime and friends
    pub config: SessionConfig,
}

impl SessionEnv {
    /// Environment over `store` with default collaborators
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        SessionEnv {
            store,
            codec: Arc::new(EjsonCodec),
            identity: None,
            lifecycle: Arc::new(ImmediateStartup),
            config: SessionConfig::default(),
        }
    }

    /// Environment over a fresh in-memory envelope store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(EnvelopeStore::new(MemoryMedium::new())))
    }

    /// Replace the codec
    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Enable logout eviction driven by `identity`
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Replace the lifecycle
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Replace the config
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for SessionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEnv")
            .field("codec", &self.codec.codec_id())
            .field("identity", &self.identity.is_some())
            .field("is_client", &self.lifecycle.is_client())
            .field("config", &self.config)
            .finish()
    }
}
