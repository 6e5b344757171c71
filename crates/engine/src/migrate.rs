//! Durable data migrations
//!
//! Each namespace carries a schema version marker (absent means 0). At
//! startup the passes below run in order, each gated on the stored version,
//! so a namespace is migrated once and later startups are no-ops.
//!
//! | Pass | Gate | Effect | Version after |
//! |---|---|---|---|
//! | `migrate_to_canonical` | `< 1` | raw slot → canonical text (a JSON string) | 2 |
//! | `normalize_canonical` | `< 4` | canonical text → JSON value | 4 |
//!
//! Both passes only touch keys listed in the namespace's persistent or
//! authenticated key list. A key that cannot be migrated is logged and left
//! as it is; the version is bumped regardless.
//!
//! The second pass cannot tell a legacy canonical string from a plain string
//! that happens to parse: a raw string slot `"123"` comes out as the number
//! 123.

use serde_json::Value as JsonValue;
use sessiondb_codec::ValueCodec;
use sessiondb_core::{Namespace, Result, Value};
use sessiondb_storage::DurableStore;
use tracing::{debug, info, warn};

/// Schema version written by the latest pass
pub const CURRENT_DATA_VERSION: u64 = 4;

/// Version written by `migrate_to_canonical`
const CANONICAL_TEXT_VERSION: u64 = 2;

/// What one startup's migration run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version found before any pass ran
    pub initial_version: u64,
    /// Version stored after the run
    pub final_version: u64,
    /// The canonical-text pass ran
    pub canonical_pass: bool,
    /// The normalization pass ran
    pub normalize_pass: bool,
    /// Slots rewritten across both passes
    pub rewritten: usize,
    /// Slots left untouched (already current, absent or unreadable)
    pub skipped: usize,
}

/// Stored schema version of a namespace; absent or non-numeric reads as 0
pub fn data_version(store: &dyn DurableStore, namespace: &Namespace) -> Result<u64> {
    let version = store
        .get(&namespace.version_key())?
        .and_then(|json| json.as_u64().or_else(|| json.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0);
    Ok(version)
}

fn set_data_version(store: &dyn DurableStore, namespace: &Namespace, version: u64) -> Result<()> {
    store.set(&namespace.version_key(), JsonValue::from(version))
}

/// Read a durable key list; absent reads as empty.
///
/// Non-string entries are dropped and a non-array value reads as empty, both
/// with a warning.
pub fn read_key_list(store: &dyn DurableStore, list_key: &str) -> Result<Vec<String>> {
    match store.get(list_key)? {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => {
            let total = items.len();
            let keys: Vec<String> = items
                .into_iter()
                .filter_map(|item| match item {
                    JsonValue::String(key) => Some(key),
                    _ => None,
                })
                .collect();
            if keys.len() != total {
                warn!(
                    target: "sessiondb::migrate",
                    list = list_key,
                    dropped = total - keys.len(),
                    "Ignoring non-string entries in key list"
                );
            }
            Ok(keys)
        }
        Some(other) => {
            warn!(
                target: "sessiondb::migrate",
                list = list_key,
                found = %other,
                "Key list is not an array, treating it as empty"
            );
            Ok(Vec::new())
        }
    }
}

fn listed_keys(store: &dyn DurableStore, namespace: &Namespace) -> Result<Vec<String>> {
    let mut keys = read_key_list(store, &namespace.persistent_list_key())?;
    keys.extend(read_key_list(store, &namespace.authenticated_list_key())?);
    Ok(keys)
}

/// Re-encode every listed slot as canonical text.
///
/// Runs only when the stored version is below 1; leaves version 2 behind.
/// Returns `None` when gated off, else `(rewritten, skipped)`.
pub fn migrate_to_canonical(
    store: &dyn DurableStore,
    codec: &dyn ValueCodec,
    namespace: &Namespace,
) -> Result<Option<(usize, usize)>> {
    if data_version(store, namespace)? >= 1 {
        return Ok(None);
    }

    let (mut rewritten, mut skipped) = (0, 0);
    for key in listed_keys(store, namespace)? {
        let slot_key = namespace.slot_key(&key);
        let outcome = store.get(&slot_key).and_then(|raw| match raw {
            Some(raw) => {
                let text = codec.stringify(&Value::from(raw));
                store.set(&slot_key, JsonValue::String(text)).map(|()| true)
            }
            None => Ok(false),
        });
        match outcome {
            Ok(true) => rewritten += 1,
            Ok(false) => skipped += 1,
            Err(e) => {
                warn!(
                    target: "sessiondb::migrate",
                    namespace = %namespace,
                    key = %key,
                    error = %e,
                    "Could not re-encode slot, leaving it"
                );
                skipped += 1;
            }
        }
    }

    set_data_version(store, namespace, CANONICAL_TEXT_VERSION)?;
    debug!(
        target: "sessiondb::migrate",
        namespace = %namespace,
        rewritten,
        skipped,
        "Re-encoded slots as canonical text"
    );
    Ok(Some((rewritten, skipped)))
}

/// Replace canonical-text slots with their JSON-value form.
///
/// Runs only when the stored version is below 4; leaves version 4 behind.
/// A slot that is not a string, or whose text does not parse, is already in
/// the current format and is left alone.
pub fn normalize_canonical(
    store: &dyn DurableStore,
    codec: &dyn ValueCodec,
    namespace: &Namespace,
) -> Result<Option<(usize, usize)>> {
    if data_version(store, namespace)? >= CURRENT_DATA_VERSION {
        return Ok(None);
    }

    let (mut rewritten, mut skipped) = (0, 0);
    for key in listed_keys(store, namespace)? {
        let slot_key = namespace.slot_key(&key);
        let text = match store.get(&slot_key) {
            Ok(Some(JsonValue::String(text))) => text,
            Ok(_) => {
                skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(
                    target: "sessiondb::migrate",
                    namespace = %namespace,
                    key = %key,
                    error = %e,
                    "Could not read slot, leaving it"
                );
                skipped += 1;
                continue;
            }
        };

        let value = match codec.parse(&text) {
            Ok(value) => value,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        match store.set(&slot_key, codec.to_json_value(&value)) {
            Ok(()) => rewritten += 1,
            Err(e) => {
                warn!(
                    target: "sessiondb::migrate",
                    namespace = %namespace,
                    key = %key,
                    error = %e,
                    "Could not rewrite slot, leaving it"
                );
                skipped += 1;
            }
        }
    }

    set_data_version(store, namespace, CURRENT_DATA_VERSION)?;
    debug!(
        target: "sessiondb::migrate",
        namespace = %namespace,
        rewritten,
        skipped,
        "Normalized canonical-text slots"
    );
    Ok(Some((rewritten, skipped)))
}

/// Run every pass in order
pub fn run_migrations(
    store: &dyn DurableStore,
    codec: &dyn ValueCodec,
    namespace: &Namespace,
) -> Result<MigrationReport> {
    let mut report = MigrationReport {
        initial_version: data_version(store, namespace)?,
        ..MigrationReport::default()
    };

    if let Some((rewritten, skipped)) = migrate_to_canonical(store, codec, namespace)? {
        report.canonical_pass = true;
        report.rewritten += rewritten;
        report.skipped += skipped;
    }
    if let Some((rewritten, skipped)) = normalize_canonical(store, codec, namespace)? {
        report.normalize_pass = true;
        report.rewritten += rewritten;
        report.skipped += skipped;
    }
    report.final_version = data_version(store, namespace)?;

    if report.canonical_pass || report.normalize_pass {
        info!(
            target: "sessiondb::migrate",
            namespace = %namespace,
            from = report.initial_version,
            to = report.final_version,
            rewritten = report.rewritten,
            skipped = report.skipped,
            "Migrated session data"
        );
    }
    Ok(report)
}
