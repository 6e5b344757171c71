//! Envelope store: JSON values framed for a string medium
//!
//! Each durable value is written to the medium under `"__amplify__" + key` as
//!
//! ```json
//! {"data": <json value>, "expires": <unix millis | null>}
//! ```
//!
//! This is the framing existing browser data already uses, so a medium
//! populated by earlier releases can be read without conversion.
//!
//! ## Expiration
//!
//! Expiration is logical: an expired envelope reads as absent and is removed
//! from the medium on that read. Nothing sweeps expired keys in the background.

use crate::traits::{DurableStore, StorageMedium};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sessiondb_core::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// Prefix of every envelope item in the medium
pub const ENVELOPE_PREFIX: &str = "__amplify__";

/// At-rest framing of one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The stored JSON value
    pub data: JsonValue,
    /// Absolute expiry in Unix milliseconds, `None` for no expiry
    #[serde(default)]
    pub expires: Option<i64>,
}

impl Envelope {
    /// Envelope without expiry
    pub fn new(data: JsonValue) -> Self {
        Envelope {
            data,
            expires: None,
        }
    }

    /// True if the envelope expired at or before `now_millis`
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires.is_some_and(|expires| expires <= now_millis)
    }
}

/// [`DurableStore`] that frames values in [`Envelope`]s over a [`StorageMedium`]
#[derive(Debug)]
pub struct EnvelopeStore<M> {
    medium: M,
}

impl<M: StorageMedium> EnvelopeStore<M> {
    /// Wrap a medium
    pub fn new(medium: M) -> Self {
        EnvelopeStore { medium }
    }

    /// The underlying medium
    pub fn medium(&self) -> &M {
        &self.medium
    }

    fn item_key(key: &str) -> String {
        format!("{}{}", ENVELOPE_PREFIX, key)
    }

    fn write(&self, key: &str, envelope: &Envelope) -> Result<()> {
        let raw = serde_json::to_string(envelope)?;
        self.medium.set_item(&Self::item_key(key), &raw)
    }

    /// Write a value that reads as absent once `ttl` has elapsed
    pub fn set_with_expiry(&self, key: &str, value: JsonValue, ttl: Duration) -> Result<()> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            data: value,
            expires: Some(Utc::now().timestamp_millis().saturating_add(ttl_millis)),
        };
        self.write(key, &envelope)
    }

    /// Read the full envelope, including expiry metadata.
    ///
    /// Expired envelopes are removed and reported as `None`.
    ///
    /// # Errors
    ///
    /// `Decode` when the raw item is not a valid envelope.
    pub fn get_envelope(&self, key: &str) -> Result<Option<Envelope>> {
        let item_key = Self::item_key(key);
        let raw = match self.medium.get_item(&item_key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let envelope: Envelope = serde_json::from_str(&raw)
            .map_err(|e| Error::decode(format!("invalid envelope for '{}': {}", key, e)))?;

        if envelope.is_expired_at(Utc::now().timestamp_millis()) {
            debug!(target: "sessiondb::storage", key, "Removing expired entry");
            self.medium.remove_item(&item_key)?;
            return Ok(None);
        }
        Ok(Some(envelope))
    }
}

impl<M: StorageMedium> DurableStore for EnvelopeStore<M> {
    fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        Ok(self.get_envelope(key)?.map(|envelope| envelope.data))
    }

    fn set(&self, key: &str, value: JsonValue) -> Result<()> {
        self.write(key, &Envelope::new(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.medium.remove_item(&Self::item_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .medium
            .item_keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(ENVELOPE_PREFIX).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MemoryMedium;
    use serde_json::json;

    fn store() -> EnvelopeStore<MemoryMedium> {
        EnvelopeStore::new(MemoryMedium::new())
    }

    #[test]
    fn values_are_framed_in_envelopes() {
        let store = store();
        store.set("k", json!(["a"])).unwrap();

        let raw = store.medium().get_item("__amplify__k").unwrap().unwrap();
        let parsed: JsonValue = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!({"data": ["a"], "expires": null}));
        assert_eq!(store.get("k").unwrap(), Some(json!(["a"])));
    }

    #[test]
    fn reads_existing_raw_items() {
        let store = store();
        store
            .medium()
            .set_item("__amplify__foo", r#"{"data":"[]","expires":null}"#)
            .unwrap();
        assert_eq!(store.get("foo").unwrap(), Some(json!("[]")));
    }

    #[test]
    fn null_is_stored_not_removed() {
        let store = store();
        store.set("k", json!(1)).unwrap();
        store.set("k", JsonValue::Null).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(JsonValue::Null));
        assert_eq!(store.keys().unwrap(), vec!["k"]);

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn expired_entries_read_as_absent_and_are_removed() {
        let store = store();
        store
            .medium()
            .set_item("__amplify__old", r#"{"data":1,"expires":1}"#)
            .unwrap();

        assert_eq!(store.get("old").unwrap(), None);
        assert_eq!(store.medium().get_item("__amplify__old").unwrap(), None);
    }

    #[test]
    fn unexpired_entries_are_returned() {
        let store = store();
        store
            .set_with_expiry("fresh", json!("v"), Duration::from_secs(3600))
            .unwrap();
        let envelope = store.get_envelope("fresh").unwrap().unwrap();
        assert_eq!(envelope.data, json!("v"));
        assert!(envelope.expires.is_some());
    }

    #[test]
    fn corrupt_item_is_a_decode_error() {
        let store = store();
        store.medium().set_item("__amplify__bad", "nope").unwrap();
        let err = store.get("bad").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn keys_only_lists_envelope_items() {
        let store = store();
        store.set("a", json!(1)).unwrap();
        store.medium().set_item("unrelated", "x").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a"]);
    }
}
