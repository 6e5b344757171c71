//! Reactive behaviour of sessions: which computations re-run, and when

use serde_json::json;
use sessiondb_core::Value;
use sessiondb_engine::{PersistentSession, ReactiveIdentity, SessionEnv};
use sessiondb_reactive::{Computation, Tracker};
use sessiondb_storage::{DurableStore, EnvelopeStore, MemoryMedium};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn fresh() -> PersistentSession {
    let name = uuid::Uuid::new_v4().simple().to_string();
    PersistentSession::open(&name, SessionEnv::in_memory()).unwrap()
}

/// Autorun `body` against `session`, counting runs
fn watch<F>(session: &PersistentSession, mut body: F) -> (Arc<AtomicUsize>, Computation)
where
    F: FnMut(&PersistentSession) + Send + 'static,
{
    let runs = Arc::new(AtomicUsize::new(0));
    let (s, r) = (session.clone(), Arc::clone(&runs));
    let comp = Tracker::autorun(move |_| {
        body(&s);
        r.fetch_add(1, Ordering::SeqCst);
    });
    (runs, comp)
}

fn runs_after_flush(runs: &AtomicUsize) -> usize {
    Tracker::flush();
    runs.load(Ordering::SeqCst)
}

// ============================================================================
// get / all
// ============================================================================

#[test]
fn get_reruns_on_change_only() {
    let session = fresh();
    session.set_temporary("k", 1i64).unwrap();
    let (runs, _comp) = watch(&session, |s| {
        s.get("k");
    });

    session.set_temporary("k", 1i64).unwrap();
    assert_eq!(runs_after_flush(&runs), 1);

    session.set_persistent("k", 2i64).unwrap();
    assert_eq!(runs_after_flush(&runs), 2);

    session.set_temporary("other", 2i64).unwrap();
    assert_eq!(runs_after_flush(&runs), 2);
}

#[test]
fn writes_never_rerun_synchronously() {
    let session = fresh();
    let (runs, _comp) = watch(&session, |s| {
        s.get("k");
    });
    session.set_temporary("k", "a").unwrap();
    session.set_temporary("k", "b").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(runs_after_flush(&runs), 2);
}

#[test]
fn all_reruns_when_keys_change() {
    let session = fresh();
    let (runs, _comp) = watch(&session, |s| {
        s.all();
    });

    session.set_temporary("a", 1i64).unwrap();
    assert_eq!(runs_after_flush(&runs), 2);

    session.clear_key("a").unwrap();
    assert_eq!(runs_after_flush(&runs), 3);
}

#[test]
fn clear_notifies_key_observers() {
    let session = fresh();
    session.set_auth("k", "v").unwrap();
    let (runs, _comp) = watch(&session, |s| {
        s.get("k");
    });

    session.clear_auth().unwrap();
    assert_eq!(runs_after_flush(&runs), 2);
}

// ============================================================================
// equals
// ============================================================================

#[test]
fn equals_reruns_only_on_transitions_of_its_value() {
    let session = fresh();
    let (runs, _comp) = watch(&session, |s| {
        s.equals("color", "red").unwrap();
    });

    // unset -> blue: not about red
    session.set_temporary("color", "blue").unwrap();
    assert_eq!(runs_after_flush(&runs), 1);

    // blue -> red
    session.set_temporary("color", "red").unwrap();
    assert_eq!(runs_after_flush(&runs), 2);

    // red -> green
    session.set_temporary("color", "green").unwrap();
    assert_eq!(runs_after_flush(&runs), 3);

    // green -> yellow
    session.set_temporary("color", "yellow").unwrap();
    assert_eq!(runs_after_flush(&runs), 3);
}

#[test]
fn equals_observes_clearing() {
    let session = fresh();
    session.set_temporary("k", "v").unwrap();
    let (runs, _comp) = watch(&session, |s| {
        s.equals("k", "v").unwrap();
    });

    session.clear_key("k").unwrap();
    assert_eq!(runs_after_flush(&runs), 2);
}

#[test]
fn equals_unset_observes_first_write() {
    let session = fresh();
    let (runs, _comp) = watch(&session, |s| {
        s.equals_value("k", None).unwrap();
    });

    session.set_temporary("k", 1i64).unwrap();
    assert_eq!(runs_after_flush(&runs), 2);
}

#[test]
fn equality_buckets_are_released() {
    let session = fresh();
    let (_runs, comp) = watch(&session, |s| {
        s.equals("k", "a").unwrap();
        s.equals("k", "b").unwrap();
    });
    assert_eq!(session.reactive_dict().value_bucket_count("k"), 2);

    comp.stop();
    assert_eq!(session.reactive_dict().value_bucket_count("k"), 0);
}

#[test]
fn buckets_follow_the_watched_value() {
    let session = fresh();
    let target = Arc::new(parking_lot::Mutex::new(Value::from("a")));
    let t = Arc::clone(&target);
    let (_runs, comp) = watch(&session, move |s| {
        let value = t.lock().clone();
        s.equals("k", value).unwrap();
    });

    // re-run watches "b" instead; the "a" bucket goes away
    *target.lock() = Value::from("b");
    comp.invalidate();
    Tracker::flush();
    assert_eq!(session.reactive_dict().value_bucket_count("k"), 1);

    comp.stop();
}

#[test]
fn equals_observes_numerically_equal_values() {
    let session = fresh();
    session.set_temporary("k", 1i64).unwrap();
    let seen = Arc::new(parking_lot::Mutex::new(false));
    let s = Arc::clone(&seen);
    let (runs, _comp) = watch(&session, move |session| {
        *s.lock() = session.equals("k", 2.0f64).unwrap();
    });
    assert!(!*seen.lock());

    session.set_temporary("k", 2i64).unwrap();
    assert_eq!(runs_after_flush(&runs), 2);
    assert!(*seen.lock());

    session.set_temporary("k", -0.0f64).unwrap();
    assert_eq!(runs_after_flush(&runs), 3);
    assert!(!*seen.lock());
}

/// Session over a store holding an unlisted slot `foo = "awesome"`
fn with_unlisted_slot() -> PersistentSession {
    let name = uuid::Uuid::new_v4().simple().to_string();
    let store = Arc::new(EnvelopeStore::new(MemoryMedium::new()));
    store.set(&format!("{}foo", name), json!("awesome")).unwrap();
    let session =
        PersistentSession::open(&name, SessionEnv::new(store as Arc<dyn DurableStore>)).unwrap();
    assert!(session.keys().is_empty());
    session
}

#[test]
fn overwriting_a_durable_only_value_notifies_its_observers() {
    let session = with_unlisted_slot();
    let seen = Arc::new(parking_lot::Mutex::new(false));
    let s = Arc::clone(&seen);
    let (runs, _comp) = watch(&session, move |session| {
        *s.lock() = session.equals("foo", "awesome").unwrap();
    });
    assert!(*seen.lock());

    session.set_temporary("foo", "other").unwrap();
    assert_eq!(runs_after_flush(&runs), 2);
    assert!(!*seen.lock());
}

#[test]
fn clearing_a_durable_only_value_notifies_its_observers() {
    let session = with_unlisted_slot();
    let seen = Arc::new(parking_lot::Mutex::new(false));
    let s = Arc::clone(&seen);
    let (runs, _comp) = watch(&session, move |session| {
        *s.lock() = session.equals("foo", "awesome").unwrap();
    });
    assert!(*seen.lock());

    session.clear_key("foo").unwrap();
    assert_eq!(runs_after_flush(&runs), 2);
    assert!(!*seen.lock());
    assert_eq!(session.get("foo"), None);
}

#[test]
fn equals_outside_computation_allocates_nothing() {
    let session = fresh();
    assert!(!session.equals("k", "a").unwrap());
    assert_eq!(session.reactive_dict().value_bucket_count("k"), 0);
}

// ============================================================================
// Logout
// ============================================================================

#[test]
fn logout_clears_authenticated_keys() {
    let identity = Arc::new(ReactiveIdentity::signed_in("user-1"));
    let name = uuid::Uuid::new_v4().simple().to_string();
    let session =
        PersistentSession::open(&name, SessionEnv::in_memory().with_identity(identity.clone()))
            .unwrap();

    session.set("secret", "s3", Some(true), Some(true)).unwrap();
    session.set_persistent("theme", "dark").unwrap();
    session.set_temporary("scroll", 10i64).unwrap();

    identity.logout();
    Tracker::flush();

    assert_eq!(session.get("secret"), None);
    assert!(session.authenticated_keys().is_empty());
    assert_eq!(session.get("theme"), Some(Value::from("dark")));
    assert_eq!(session.get("scroll"), Some(Value::Int(10)));
}

#[test]
fn signed_out_start_clears_nothing() {
    let identity = Arc::new(ReactiveIdentity::new());
    let name = uuid::Uuid::new_v4().simple().to_string();
    let session =
        PersistentSession::open(&name, SessionEnv::in_memory().with_identity(identity.clone()))
            .unwrap();
    session.set_auth("k", "v").unwrap();

    // sign in, then out: only the second transition clears
    identity.login("user-1");
    Tracker::flush();
    assert_eq!(session.get("k"), Some(Value::from("v")));

    identity.logout();
    Tracker::flush();
    assert_eq!(session.get("k"), None);
}

#[test]
fn switching_users_does_not_clear() {
    let identity = Arc::new(ReactiveIdentity::signed_in("user-1"));
    let name = uuid::Uuid::new_v4().simple().to_string();
    let session =
        PersistentSession::open(&name, SessionEnv::in_memory().with_identity(identity.clone()))
            .unwrap();
    session.set_auth("k", "v").unwrap();

    identity.login("user-2");
    Tracker::flush();
    assert_eq!(session.get("k"), Some(Value::from("v")));
}

#[test]
fn dropped_session_stops_watching_identity() {
    let identity = Arc::new(ReactiveIdentity::signed_in("user-1"));
    let name = uuid::Uuid::new_v4().simple().to_string();
    let session =
        PersistentSession::open(&name, SessionEnv::in_memory().with_identity(identity.clone()))
            .unwrap();
    drop(session);

    identity.logout();
    assert_eq!(Tracker::flush(), 0);
}
