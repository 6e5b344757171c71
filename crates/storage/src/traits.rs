//! Backing store trait definitions.

use serde_json::Value as JsonValue;
use sessiondb_core::Result;
use std::sync::Arc;

/// Durable string-keyed store of JSON values.
///
/// This is the only contract the session engine has with persistence:
/// synchronous get/set by string key. Implementations decide the medium and
/// the at-rest framing.
///
/// # Null handling
///
/// Storing `JsonValue::Null` keeps the key present with a null payload. Use
/// [`DurableStore::remove`] to delete a key.
pub trait DurableStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent or expired.
    fn get(&self, key: &str) -> Result<Option<JsonValue>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: JsonValue) -> Result<()>;

    /// Delete a key. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Every key currently held by this store.
    fn keys(&self) -> Result<Vec<String>>;
}

/// String-keyed string medium (browser `localStorage`, a file, a map).
pub trait StorageMedium: Send + Sync {
    /// Read a raw item.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw item.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a raw item.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Every raw key in the medium.
    fn item_keys(&self) -> Result<Vec<String>>;
}

impl<S: DurableStore + ?Sized> DurableStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: JsonValue) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }
}

impl<M: StorageMedium + ?Sized> StorageMedium for Arc<M> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }

    fn item_keys(&self) -> Result<Vec<String>> {
        (**self).item_keys()
    }
}
