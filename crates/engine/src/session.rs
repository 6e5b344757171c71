//! Tiered session store
//!
//! A [`PersistentSession`] is a reactive dictionary whose keys each carry a
//! lifetime:
//!
//! - Temporary keys live in memory only.
//! - Persistent keys are mirrored to a durable slot and listed in the
//!   namespace's persistent key list, so they come back after a restart.
//! - Authenticated keys are persistent keys that are also wiped when the
//!   user signs out.
//!
//! ## Durable layout
//!
//! The tier of a key is never stored on the value. It is its membership in
//! one of two durable key lists (see [`sessiondb_core::keys`]). Every write
//! first removes the key from both lists and then adds it to the list of its
//! new tier, so a key is listed at most once. Demoting a key to Temporary, or
//! writing `Null`, replaces an existing slot with `null` instead of deleting
//! it.
//!
//! ## Startup
//!
//! On client hosts a session runs migrations and then rehydrates: every
//! listed key that is not already in memory is decoded from its slot into the
//! dictionary. Rehydration only writes memory. A key whose slot is missing or
//! unreadable is skipped.
//!
//! ## Logout
//!
//! With an identity provider configured, a standing computation watches the
//! user id and runs [`clear_auth`](PersistentSession::clear_auth) when a
//! signed-in user signs out.

use crate::dict::ReactiveDict;
use crate::env::SessionEnv;
use crate::identity::IdentityProvider;
use crate::migrate::{read_key_list, run_migrations};
use crate::registry;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use sessiondb_codec::ValueCodec;
use sessiondb_core::{Error, Lifetime, Namespace, Result, Value, DEFAULT_NAMESPACE};
use sessiondb_reactive::{Computation, Tracker};
use sessiondb_storage::DurableStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

struct Inner {
    namespace: Namespace,
    dict: ReactiveDict,
    store: Arc<dyn DurableStore>,
    codec: Arc<dyn ValueCodec>,
    default_lifetime: RwLock<Lifetime>,
    logout_watch: Mutex<Option<Computation>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(watch) = self.logout_watch.get_mut().take() {
            watch.stop();
        }
    }
}

/// Tiered, reactive, durably persisted key-value session.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PersistentSession {
    inner: Arc<Inner>,
}

impl PersistentSession {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Open the session for `name`.
    ///
    /// The reserved name `"session"` returns the process-wide default
    /// instance, installing it with `env` if nothing is installed yet. Any
    /// other name builds a new, independent instance.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `name` is empty.
    pub fn open(name: &str, env: SessionEnv) -> Result<Self> {
        let namespace = Namespace::new(name)?;
        if namespace.is_default() {
            return Ok(registry::install_default(env));
        }
        Ok(Self::create(namespace, env))
    }

    pub(crate) fn create(namespace: Namespace, env: SessionEnv) -> Self {
        let dict_name = if namespace.is_default() {
            format!("_{}", DEFAULT_NAMESPACE)
        } else {
            namespace.name().to_string()
        };
        let inner = Arc::new(Inner {
            dict: ReactiveDict::new(dict_name, Arc::clone(&env.codec)),
            namespace,
            store: env.store,
            codec: env.codec,
            default_lifetime: RwLock::new(env.config.default_method),
            logout_watch: Mutex::new(None),
        });

        debug!(
            target: "sessiondb::session",
            namespace = %inner.namespace,
            default_lifetime = %env.config.default_method,
            "Opened session"
        );

        if env.lifecycle.is_client() {
            let weak = Arc::downgrade(&inner);
            env.lifecycle.on_startup(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    PersistentSession { inner }.startup();
                }
            }));
        }

        if let Some(identity) = env.identity {
            let watch = watch_identity(Arc::downgrade(&inner), identity);
            *inner.logout_watch.lock() = Some(watch);
        }

        PersistentSession { inner }
    }

    fn startup(&self) {
        let ns = &self.inner.namespace;
        if let Err(e) = run_migrations(self.inner.store.as_ref(), self.inner.codec.as_ref(), ns) {
            warn!(
                target: "sessiondb::session",
                namespace = %ns,
                error = %e,
                "Migration failed, rehydrating what is readable"
            );
        }

        let persistent = self.rehydrate(&ns.persistent_list_key());
        let authenticated = self.rehydrate(&ns.authenticated_list_key());
        info!(
            target: "sessiondb::session",
            namespace = %ns,
            persistent,
            authenticated,
            "Session rehydrated"
        );
    }

    /// Copy listed keys that are not yet in memory from their slots.
    /// Returns the number of keys loaded.
    fn rehydrate(&self, list_key: &str) -> usize {
        let keys = match read_key_list(self.inner.store.as_ref(), list_key) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(target: "sessiondb::session", list = list_key, error = %e, "Could not read key list");
                return 0;
            }
        };

        let mut loaded = 0;
        for key in keys {
            if self.inner.dict.contains_key(&key) {
                continue;
            }
            match self.read_slot(&key) {
                Ok(Some(value)) => {
                    self.inner.dict.set(&key, Some(&value));
                    loaded += 1;
                }
                Ok(None) => {
                    debug!(target: "sessiondb::session", key = %key, "Listed key has no value, skipping");
                }
                Err(e) => {
                    warn!(target: "sessiondb::session", key = %key, error = %e, "Skipping unreadable key");
                }
            }
        }
        loaded
    }

    // ========================================================================
    // Durable state
    // ========================================================================

    /// Decoded durable value of `key`; a `null` slot reads as absent.
    ///
    /// A slot the codec rejects falls back to its plain JSON reading.
    fn read_slot(&self, key: &str) -> Result<Option<Value>> {
        let json = match self.inner.store.get(&self.inner.namespace.slot_key(key))? {
            None | Some(JsonValue::Null) => return Ok(None),
            Some(json) => json,
        };
        match self.inner.codec.from_json_value(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(
                    target: "sessiondb::session",
                    key,
                    error = %e,
                    "Slot is not in codec form, reading it as plain JSON"
                );
                Ok(Some(Value::from(json)))
            }
        }
    }

    fn list(&self, list_key: &str) -> Vec<String> {
        read_key_list(self.inner.store.as_ref(), list_key).unwrap_or_else(|e| {
            warn!(target: "sessiondb::session", list = list_key, error = %e, "Could not read key list");
            Vec::new()
        })
    }

    /// Bring the durable side of `key` in line with `lifetime`
    fn sync_durable(&self, lifetime: Lifetime, key: &str, value: Option<&Value>) -> Result<()> {
        let ns = &self.inner.namespace;
        let store = self.inner.store.as_ref();
        let (ps_key, psa_key) = (ns.persistent_list_key(), ns.authenticated_list_key());

        let ps_before = read_key_list(store, &ps_key)?;
        let psa_before = read_key_list(store, &psa_key)?;
        let mut ps: Vec<String> = ps_before.iter().filter(|k| *k != key).cloned().collect();
        let mut psa: Vec<String> = psa_before.iter().filter(|k| *k != key).cloned().collect();

        let slot = match (lifetime, value.filter(|v| !v.is_null())) {
            (Lifetime::Persistent, Some(value)) => {
                ps.push(key.to_string());
                Some(self.inner.codec.to_json_value(value))
            }
            (Lifetime::Authenticated, Some(value)) => {
                psa.push(key.to_string());
                Some(self.inner.codec.to_json_value(value))
            }
            _ => None,
        };

        if ps != ps_before {
            store.set(&ps_key, JsonValue::from(ps))?;
        }
        if psa != psa_before {
            store.set(&psa_key, JsonValue::from(psa))?;
        }

        let slot_key = ns.slot_key(key);
        match slot {
            Some(json) => store.set(&slot_key, json)?,
            None => {
                if store.get(&slot_key)?.is_some_and(|json| !json.is_null()) {
                    store.set(&slot_key, JsonValue::Null)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current value of `key`.
    ///
    /// The in-memory value wins; otherwise the durable slot is decoded.
    /// Registers a dependency on the key when a computation is active.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.inner.dict.get(key);
        if value.is_some() {
            return value;
        }
        self.durable_fallback(key)
    }

    /// As [`get`](Self::get) but without registering any dependency
    fn peek(&self, key: &str) -> Option<Value> {
        self.inner.dict.peek(key).or_else(|| self.durable_fallback(key))
    }

    fn durable_fallback(&self, key: &str) -> Option<Value> {
        self.read_slot(key).unwrap_or_else(|e| {
            warn!(target: "sessiondb::session", key, error = %e, "Could not read durable value");
            None
        })
    }

    /// Snapshot of every in-memory key, registering a dependency on the key set
    pub fn all(&self) -> BTreeMap<String, Value> {
        self.inner.dict.all()
    }

    /// True if `key` currently holds a value equal to `value`.
    ///
    /// Inside a computation this registers a dependency that fires only when
    /// the key starts or stops holding `value`, not on every change of the key.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `value` is an array or object.
    pub fn equals(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.equals_value(key, Some(&value.into()))
    }

    /// [`equals`](Self::equals) where `None` asks whether the key is unset
    pub fn equals_value(&self, key: &str, value: Option<&Value>) -> Result<bool> {
        if let Some(value) = value {
            if !value.is_scalar() {
                return Err(Error::invalid_argument(format!(
                    "equals: value for '{}' must be scalar, got {}",
                    key,
                    value.type_name()
                )));
            }
        }

        if Tracker::active() {
            let equality = self.inner.dict.equality_key(value);
            self.inner.dict.depend_on_value(key, &equality);
        }

        let current = self.peek(key);
        Ok(match (current.as_ref(), value) {
            (None, None) => true,
            (Some(current), Some(value)) => self.inner.codec.equals(current, value),
            _ => false,
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Durable value readers see for `key` while it is absent from memory
    fn shadowed(&self, key: &str) -> Option<Value> {
        if self.inner.dict.contains_key(key) {
            return None;
        }
        self.durable_fallback(key)
    }

    fn write(&self, key: &str, value: Option<Value>, lifetime: Lifetime) -> Result<()> {
        let shadowed = self.shadowed(key);
        self.sync_durable(lifetime, key, value.as_ref())?;
        self.inner
            .dict
            .set_shadowing(key, value.as_ref(), shadowed.as_ref());
        debug!(
            target: "sessiondb::session",
            namespace = %self.inner.namespace,
            key,
            lifetime = %lifetime,
            "Set"
        );
        Ok(())
    }

    fn resolve(&self, persist: Option<bool>, auth: Option<bool>) -> Lifetime {
        Lifetime::resolve(persist, auth, self.default_lifetime())
    }

    /// Set `key`, choosing its lifetime from `persist`, `auth` and the
    /// session default (see [`Lifetime::resolve`]).
    pub fn set(
        &self,
        key: &str,
        value: impl Into<Value>,
        persist: Option<bool>,
        auth: Option<bool>,
    ) -> Result<()> {
        self.write(key, Some(value.into()), self.resolve(persist, auth))
    }

    /// [`set`](Self::set) every entry with the same flags
    pub fn set_many<I, K, V>(&self, entries: I, persist: Option<bool>, auth: Option<bool>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let lifetime = self.resolve(persist, auth);
        for (key, value) in entries {
            self.write(key.as_ref(), Some(value.into()), lifetime)?;
        }
        Ok(())
    }

    /// Set a memory-only value
    pub fn set_temporary(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.write(key, Some(value.into()), Lifetime::Temporary)
    }

    /// Set a value that survives reloads
    pub fn set_persistent(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.write(key, Some(value.into()), Lifetime::Persistent)
    }

    /// Set a value that survives reloads but not logout
    pub fn set_auth(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.write(key, Some(value.into()), Lifetime::Authenticated)
    }

    /// Batch [`set_temporary`](Self::set_temporary)
    pub fn set_temporary_many<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (persist, auth) = Lifetime::Temporary.as_flags();
        self.set_many(entries, persist, auth)
    }

    /// Batch [`set_persistent`](Self::set_persistent)
    pub fn set_persistent_many<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (persist, auth) = Lifetime::Persistent.as_flags();
        self.set_many(entries, persist, auth)
    }

    /// Batch [`set_auth`](Self::set_auth)
    pub fn set_auth_many<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (persist, auth) = Lifetime::Authenticated.as_flags();
        self.set_many(entries, persist, auth)
    }

    /// Make `key` memory-only. The in-memory value is kept.
    pub fn make_temp(&self, key: &str) -> Result<()> {
        self.sync_durable(Lifetime::Temporary, key, None)
    }

    /// Make `key` persistent, keeping its current value
    pub fn make_persistent(&self, key: &str) -> Result<()> {
        let value = self.peek(key);
        self.sync_durable(Lifetime::Persistent, key, value.as_ref())
    }

    /// Make `key` authenticated, keeping its current value
    pub fn make_auth(&self, key: &str) -> Result<()> {
        let value = self.peek(key);
        self.sync_durable(Lifetime::Authenticated, key, value.as_ref())
    }

    /// Replace the value of `key` without changing its tier.
    ///
    /// A key in neither durable list is written as Temporary.
    pub fn update(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let lifetime = self.lifetime_of(key);
        self.write(key, Some(value.into()), lifetime)
    }

    /// [`set`](Self::set) only if `key` has no value yet
    pub fn set_default(
        &self,
        key: &str,
        value: impl Into<Value>,
        persist: Option<bool>,
        auth: Option<bool>,
    ) -> Result<()> {
        if self.peek(key).is_some() {
            return Ok(());
        }
        self.set(key, value, persist, auth)
    }

    /// [`set_default`](Self::set_default) every entry with the same flags
    pub fn set_default_many<I, K, V>(
        &self,
        entries: I,
        persist: Option<bool>,
        auth: Option<bool>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in entries {
            self.set_default(key.as_ref(), value, persist, auth)?;
        }
        Ok(())
    }

    /// Memory-only [`set_default`](Self::set_default)
    pub fn set_default_temp(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let (persist, auth) = Lifetime::Temporary.as_flags();
        self.set_default(key, value, persist, auth)
    }

    /// Persistent [`set_default`](Self::set_default)
    pub fn set_default_persistent(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let (persist, auth) = Lifetime::Persistent.as_flags();
        self.set_default(key, value, persist, auth)
    }

    /// Authenticated [`set_default`](Self::set_default)
    pub fn set_default_auth(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let (persist, auth) = Lifetime::Authenticated.as_flags();
        self.set_default(key, value, persist, auth)
    }

    /// Batch [`set_default_temp`](Self::set_default_temp)
    pub fn set_default_temp_many<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (persist, auth) = Lifetime::Temporary.as_flags();
        self.set_default_many(entries, persist, auth)
    }

    /// Batch [`set_default_persistent`](Self::set_default_persistent)
    pub fn set_default_persistent_many<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (persist, auth) = Lifetime::Persistent.as_flags();
        self.set_default_many(entries, persist, auth)
    }

    /// Batch [`set_default_auth`](Self::set_default_auth)
    pub fn set_default_auth_many<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (persist, auth) = Lifetime::Authenticated.as_flags();
        self.set_default_many(entries, persist, auth)
    }

    // ========================================================================
    // Clearing
    // ========================================================================

    /// Clear `keys`: each becomes an unset Temporary key and leaves memory.
    ///
    /// Observers of each key, of its old value and of the unset value are
    /// notified, then observers of the whole key set once.
    ///
    /// If the durable side of a key fails, the keys before it are still
    /// removed from memory and the error is returned.
    pub fn clear_keys<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        let mut cleared = Vec::with_capacity(keys.len());
        let mut shadowed = HashMap::new();
        let mut outcome = Ok(());
        for key in keys {
            let key = key.as_ref();
            let before = self.shadowed(key);
            if let Err(e) = self.sync_durable(Lifetime::Temporary, key, None) {
                outcome = Err(e);
                break;
            }
            if let Some(value) = before {
                shadowed.insert(key.to_string(), value);
            }
            cleared.push(key.to_string());
        }

        self.inner.dict.remove_shadowing(&cleared, &shadowed);
        debug!(
            target: "sessiondb::session",
            namespace = %self.inner.namespace,
            cleared = cleared.len(),
            "Cleared keys"
        );
        outcome
    }

    /// Clear a single key
    pub fn clear_key(&self, key: &str) -> Result<()> {
        self.clear_keys(&[key])
    }

    /// Clear every in-memory key
    pub fn clear_all(&self) -> Result<()> {
        let keys = self.inner.dict.keys();
        self.clear_keys(&keys)
    }

    /// Clear every in-memory key that is in neither durable list
    pub fn clear_temp(&self) -> Result<()> {
        let durable: HashSet<String> = self
            .persistent_keys()
            .into_iter()
            .chain(self.authenticated_keys())
            .collect();
        let keys: Vec<String> = self
            .inner
            .dict
            .keys()
            .into_iter()
            .filter(|k| !durable.contains(k))
            .collect();
        self.clear_keys(&keys)
    }

    /// Clear every persistent key
    pub fn clear_persistent(&self) -> Result<()> {
        let keys = self.persistent_keys();
        self.clear_keys(&keys)
    }

    /// Clear every authenticated key
    pub fn clear_auth(&self) -> Result<()> {
        let keys = self.authenticated_keys();
        self.clear_keys(&keys)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Namespace name the session was opened under
    pub fn namespace(&self) -> &str {
        self.inner.namespace.name()
    }

    /// Lifetime used when a write passes neither flag
    pub fn default_lifetime(&self) -> Lifetime {
        *self.inner.default_lifetime.read()
    }

    /// Change the default lifetime for later writes
    pub fn set_default_lifetime(&self, lifetime: Lifetime) {
        *self.inner.default_lifetime.write() = lifetime;
    }

    /// Current tier of `key`, from the durable lists
    pub fn lifetime_of(&self, key: &str) -> Lifetime {
        let ns = &self.inner.namespace;
        if self.list(&ns.authenticated_list_key()).iter().any(|k| k == key) {
            Lifetime::Authenticated
        } else if self.list(&ns.persistent_list_key()).iter().any(|k| k == key) {
            Lifetime::Persistent
        } else {
            Lifetime::Temporary
        }
    }

    /// Keys in the persistent list
    pub fn persistent_keys(&self) -> Vec<String> {
        self.list(&self.inner.namespace.persistent_list_key())
    }

    /// Keys in the authenticated list
    pub fn authenticated_keys(&self) -> Vec<String> {
        self.list(&self.inner.namespace.authenticated_list_key())
    }

    /// In-memory keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.inner.dict.keys()
    }

    /// The underlying reactive dictionary
    pub fn reactive_dict(&self) -> &ReactiveDict {
        &self.inner.dict
    }

    /// True if both handles refer to the same session
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Standing computation that clears authenticated keys on sign-out
fn watch_identity(session: Weak<Inner>, identity: Arc<dyn IdentityProvider>) -> Computation {
    let mut was_signed_in = false;
    Tracker::nonreactive(|| {
        Tracker::autorun(move |_| {
            let signed_in = identity.user_id().is_some();
            if was_signed_in && !signed_in {
                if let Some(inner) = session.upgrade() {
                    let session = PersistentSession { inner };
                    info!(
                        target: "sessiondb::session",
                        namespace = %session.inner.namespace,
                        "User signed out, clearing authenticated keys"
                    );
                    if let Err(e) = Tracker::nonreactive(|| session.clear_auth()) {
                        warn!(target: "sessiondb::session", error = %e, "Clearing authenticated keys failed");
                    }
                }
            }
            was_signed_in = signed_in;
        })
    })
}

impl fmt::Debug for PersistentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentSession")
            .field("namespace", &self.inner.namespace.name())
            .field("default_lifetime", &self.default_lifetime())
            .field("keys", &self.inner.dict.len())
            .finish()
    }
}
