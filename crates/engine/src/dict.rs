//! In-memory reactive dictionary
//!
//! Values are held in canonical text form (the codec's `stringify`, with
//! `"undefined"` standing for an unset key). Three kinds of dependency hang
//! off the dictionary:
//!
//! - one per key, depended on by `get`
//! - one per `(key, canonical value)` bucket, depended on by equality queries
//! - one for the whole key set, depended on by `all`
//!
//! A write compares canonical text, so storing an equal value notifies
//! nobody. A changed value notifies the key dependency plus the buckets of
//! the old and the new value, leaving queries against any other value alone.
//! Buckets are filed under the codec's equality key rather than the canonical
//! text, so `2` and `2.0` land in the same bucket.
//!
//! Buckets are deleted as soon as their dependency has no dependents left,
//! so memory stays proportional to the values currently being watched.

use parking_lot::Mutex;
use sessiondb_codec::ValueCodec;
use sessiondb_core::Value;
use sessiondb_reactive::{Dependency, Tracker};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Canonical text of an unset value
pub const UNDEFINED: &str = "undefined";

struct Entry {
    serialized: String,
    equality: String,
}

#[derive(Default)]
struct DictState {
    keys: HashMap<String, Entry>,
    key_deps: HashMap<String, Dependency>,
    key_value_deps: HashMap<String, HashMap<String, Dependency>>,
}

impl DictState {
    fn key_dep(&mut self, key: &str) -> Dependency {
        self.key_deps.entry(key.to_string()).or_default().clone()
    }

    fn bucket(&self, key: &str, equality: &str) -> Option<Dependency> {
        self.key_value_deps.get(key)?.get(equality).cloned()
    }

    /// Dependencies to notify when `key` goes from `old` to `new`
    fn value_change_targets(&self, key: &str, old: &str, new: &str, out: &mut Vec<Dependency>) {
        if let Some(dep) = self.key_deps.get(key) {
            out.push(dep.clone());
        }
        if let Some(buckets) = self.key_value_deps.get(key) {
            out.extend(buckets.get(old).cloned());
            out.extend(buckets.get(new).cloned());
        }
    }
}

/// Reactive string-keyed dictionary
///
/// Clones share the same state.
#[derive(Clone)]
pub struct ReactiveDict {
    name: String,
    codec: Arc<dyn ValueCodec>,
    state: Arc<Mutex<DictState>>,
    all_deps: Dependency,
}

impl ReactiveDict {
    /// Empty dictionary named `name`
    pub fn new(name: impl Into<String>, codec: Arc<dyn ValueCodec>) -> Self {
        ReactiveDict {
            name: name.into(),
            codec,
            state: Arc::new(Mutex::new(DictState::default())),
            all_deps: Dependency::new(),
        }
    }

    /// Name the dictionary was created with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical text of a value (`"undefined"` for `None`)
    pub fn serialize(&self, value: Option<&Value>) -> String {
        match value {
            Some(value) => self.codec.stringify(value),
            None => UNDEFINED.to_string(),
        }
    }

    /// Bucket key of a value (`"undefined"` for `None`)
    pub fn equality_key(&self, value: Option<&Value>) -> String {
        match value {
            Some(value) => self.codec.equality_key(value),
            None => UNDEFINED.to_string(),
        }
    }

    fn deserialize(&self, key: &str, serialized: &str) -> Option<Value> {
        if serialized == UNDEFINED {
            return None;
        }
        match self.codec.parse(serialized) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    target: "sessiondb::session",
                    dict = %self.name,
                    key,
                    error = %e,
                    "Unreadable in-memory value"
                );
                None
            }
        }
    }

    /// Store `value` under `key`, notifying whoever observes the change.
    pub fn set(&self, key: &str, value: Option<&Value>) {
        self.set_shadowing(key, value, None);
    }

    /// [`set`](Self::set) for a key whose readers saw `shadowed` while it was
    /// absent from memory.
    ///
    /// The bucket of `shadowed` is notified along with the usual ones. Has no
    /// extra effect once the key is in memory.
    pub fn set_shadowing(&self, key: &str, value: Option<&Value>, shadowed: Option<&Value>) {
        let serialized = self.serialize(value);
        let equality = self.equality_key(value);
        let shadowed = shadowed.map(|v| self.codec.equality_key(v));
        let mut notify = Vec::new();
        {
            let mut state = self.state.lock();
            let entry = Entry {
                serialized: serialized.clone(),
                equality: equality.clone(),
            };
            let old = state.keys.insert(key.to_string(), entry);
            let key_existed = old.is_some();
            let (old_serialized, old_equality) = match old {
                Some(old) => (old.serialized, old.equality),
                None => (UNDEFINED.to_string(), UNDEFINED.to_string()),
            };
            if old_serialized != serialized {
                state.value_change_targets(key, &old_equality, &equality, &mut notify);
            }
            if !key_existed {
                if let Some(shadowed) = shadowed.filter(|s| *s != equality) {
                    notify.extend(state.bucket(key, &shadowed));
                }
            }
            if old_serialized != serialized || !key_existed {
                notify.push(self.all_deps.clone());
            }
        }
        for dep in notify {
            dep.changed();
        }
    }

    /// Current value of `key`, registering a dependency on the key when a
    /// computation is active
    pub fn get(&self, key: &str) -> Option<Value> {
        if Tracker::active() {
            let dep = self.state.lock().key_dep(key);
            dep.depend();
        }
        self.peek(key)
    }

    /// Current value of `key` without registering any dependency
    pub fn peek(&self, key: &str) -> Option<Value> {
        let serialized = self.state.lock().keys.get(key)?.serialized.clone();
        self.deserialize(key, &serialized)
    }

    /// True if `key` is in the key set (possibly holding an unset value)
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().keys.contains_key(key)
    }

    /// Keys currently in the dictionary, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// True when no keys are present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every set key, registering a dependency on the key set.
    ///
    /// Keys holding an unset value are omitted.
    pub fn all(&self) -> BTreeMap<String, Value> {
        self.all_deps.depend();
        let entries: Vec<(String, String)> = self
            .state
            .lock()
            .keys
            .iter()
            .map(|(k, entry)| (k.clone(), entry.serialized.clone()))
            .collect();
        entries
            .into_iter()
            .filter_map(|(key, serialized)| {
                let value = self.deserialize(&key, &serialized)?;
                Some((key, value))
            })
            .collect()
    }

    /// Register the current computation on the `(key, equality)` bucket,
    /// `equality` being a key from [`equality_key`](Self::equality_key).
    ///
    /// No-op outside a computation. The bucket is created on demand and
    /// deleted when the last computation watching it is invalidated.
    pub fn depend_on_value(&self, key: &str, equality: &str) {
        if !Tracker::active() {
            return;
        }
        let dep = self
            .state
            .lock()
            .key_value_deps
            .entry(key.to_string())
            .or_default()
            .entry(equality.to_string())
            .or_default()
            .clone();

        if dep.depend() {
            let state = Arc::downgrade(&self.state);
            let (key, equality) = (key.to_string(), equality.to_string());
            Tracker::on_invalidate(move |_| release_bucket(&state, &key, &equality));
        }
    }

    /// Number of live equality buckets for `key`
    pub fn value_bucket_count(&self, key: &str) -> usize {
        self.state
            .lock()
            .key_value_deps
            .get(key)
            .map_or(0, HashMap::len)
    }

    /// Remove `keys`, notifying key and bucket observers of each, then the
    /// key-set observers once.
    ///
    /// Keys that are not present still notify their `"undefined"` bucket.
    pub fn remove(&self, keys: &[String]) {
        self.remove_shadowing(keys, &HashMap::new());
    }

    /// [`remove`](Self::remove) where `shadowed` holds, for keys absent from
    /// memory, the value readers saw in their place. Those buckets are
    /// notified too.
    pub fn remove_shadowing(&self, keys: &[String], shadowed: &HashMap<String, Value>) {
        let shadowed: HashMap<&str, String> = shadowed
            .iter()
            .map(|(k, v)| (k.as_str(), self.codec.equality_key(v)))
            .collect();
        let mut notify = Vec::new();
        {
            let mut state = self.state.lock();
            for key in keys {
                let old = match state.keys.remove(key) {
                    Some(old) => old.equality,
                    None => shadowed
                        .get(key.as_str())
                        .cloned()
                        .unwrap_or_else(|| UNDEFINED.to_string()),
                };
                state.value_change_targets(key, &old, UNDEFINED, &mut notify);
            }
        }
        notify.push(self.all_deps.clone());
        for dep in notify {
            dep.changed();
        }
    }

    /// Remove every key
    pub fn clear(&self) {
        let keys = self.keys();
        self.remove(&keys);
    }
}

fn release_bucket(state: &Weak<Mutex<DictState>>, key: &str, equality: &str) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock();
    let Some(buckets) = state.key_value_deps.get_mut(key) else {
        return;
    };
    if buckets
        .get(equality)
        .is_some_and(|dep| !dep.has_dependents())
    {
        buckets.remove(equality);
    }
}

impl fmt::Debug for ReactiveDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveDict")
            .field("name", &self.name)
            .field("keys", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessiondb_codec::EjsonCodec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dict() -> ReactiveDict {
        ReactiveDict::new("test", Arc::new(EjsonCodec))
    }

    fn watch_get(dict: &ReactiveDict, key: &'static str) -> (Arc<AtomicUsize>, sessiondb_reactive::Computation) {
        let runs = Arc::new(AtomicUsize::new(0));
        let (d, r) = (dict.clone(), Arc::clone(&runs));
        let comp = Tracker::autorun(move |_| {
            d.get(key);
            r.fetch_add(1, Ordering::SeqCst);
        });
        (runs, comp)
    }

    #[test]
    fn set_and_get() {
        let dict = dict();
        assert_eq!(dict.get("k"), None);
        dict.set("k", Some(&Value::from("v")));
        assert_eq!(dict.get("k"), Some(Value::from("v")));
        assert!(dict.contains_key("k"));
    }

    #[test]
    fn unset_value_keeps_the_key() {
        let dict = dict();
        dict.set("k", None);
        assert!(dict.contains_key("k"));
        assert_eq!(dict.peek("k"), None);
        assert!(dict.all().is_empty());
    }

    #[test]
    fn equal_write_does_not_notify() {
        let dict = dict();
        dict.set("k", Some(&Value::Int(1)));
        let (runs, _comp) = watch_get(&dict, "k");

        dict.set("k", Some(&Value::Int(1)));
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        dict.set("k", Some(&Value::Int(2)));
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn other_keys_do_not_notify() {
        let dict = dict();
        let (runs, _comp) = watch_get(&dict, "a");
        dict.set("b", Some(&Value::Int(1)));
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn new_key_notifies_all_observers() {
        let dict = dict();
        let runs = Arc::new(AtomicUsize::new(0));
        let (d, r) = (dict.clone(), Arc::clone(&runs));
        let _comp = Tracker::autorun(move |_| {
            d.all();
            r.fetch_add(1, Ordering::SeqCst);
        });

        // key did not exist, even an unset write adds it
        dict.set("k", None);
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        dict.set("k", None);
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn buckets_are_released_when_unwatched() {
        let dict = dict();
        let d = dict.clone();
        let comp = Tracker::autorun(move |_| {
            let equality = d.equality_key(Some(&Value::from("x")));
            d.depend_on_value("k", &equality);
        });
        assert_eq!(dict.value_bucket_count("k"), 1);

        comp.stop();
        assert_eq!(dict.value_bucket_count("k"), 0);
    }

    #[test]
    fn depend_on_value_outside_computation_creates_nothing() {
        let dict = dict();
        dict.depend_on_value("k", "\"x\"");
        assert_eq!(dict.value_bucket_count("k"), 0);
    }

    #[test]
    fn remove_notifies_key_observers() {
        let dict = dict();
        dict.set("a", Some(&Value::Int(1)));
        dict.set("b", Some(&Value::Int(2)));
        let (runs, _comp) = watch_get(&dict, "a");

        dict.remove(&["a".to_string()]);
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(dict.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn get_outside_computation_allocates_no_dependency() {
        let dict = dict();
        for i in 0..10 {
            dict.get(&format!("k{}", i));
        }
        assert!(dict.state.lock().key_deps.is_empty());
    }

    #[test]
    fn integral_float_shares_bucket_with_int() {
        let dict = dict();
        dict.set("k", Some(&Value::Int(1)));
        let runs = Arc::new(AtomicUsize::new(0));
        let (d, r) = (dict.clone(), Arc::clone(&runs));
        let _comp = Tracker::autorun(move |_| {
            let equality = d.equality_key(Some(&Value::Float(2.0)));
            d.depend_on_value("k", &equality);
            r.fetch_add(1, Ordering::SeqCst);
        });

        dict.set("k", Some(&Value::Int(2)));
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shadowed_value_bucket_is_notified() {
        let dict = dict();
        let runs = Arc::new(AtomicUsize::new(0));
        let (d, r) = (dict.clone(), Arc::clone(&runs));
        let _comp = Tracker::autorun(move |_| {
            let equality = d.equality_key(Some(&Value::from("slot")));
            d.depend_on_value("k", &equality);
            r.fetch_add(1, Ordering::SeqCst);
        });

        dict.set_shadowing("k", Some(&Value::from("other")), Some(&Value::from("slot")));
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // in memory now, the shadow no longer applies
        dict.set_shadowing("k", Some(&Value::from("third")), Some(&Value::from("slot")));
        Tracker::flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_empties_the_dictionary() {
        let dict = dict();
        dict.set("a", Some(&Value::Int(1)));
        dict.set("b", Some(&Value::Int(2)));
        dict.clear();
        assert!(dict.is_empty());
    }
}
