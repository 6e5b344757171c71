//! Signed-in user identity

use parking_lot::Mutex;
use sessiondb_reactive::Dependency;
use tracing::debug;

/// Source of the signed-in user's id.
///
/// `user_id` must register a reactive dependency so that a session's logout
/// watcher re-runs when the user signs in or out.
pub trait IdentityProvider: Send + Sync {
    /// Id of the signed-in user, `None` when signed out
    fn user_id(&self) -> Option<String>;
}

/// In-process identity with explicit login and logout
#[derive(Debug, Default)]
pub struct ReactiveIdentity {
    user: Mutex<Option<String>>,
    dep: Dependency,
}

impl ReactiveIdentity {
    /// Signed-out identity
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity already signed in as `user_id`
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        ReactiveIdentity {
            user: Mutex::new(Some(user_id.into())),
            dep: Dependency::new(),
        }
    }

    /// Sign in as `user_id`
    pub fn login(&self, user_id: impl Into<String>) {
        self.replace(Some(user_id.into()));
    }

    /// Sign out
    pub fn logout(&self) {
        self.replace(None);
    }

    fn replace(&self, next: Option<String>) {
        let changed = {
            let mut user = self.user.lock();
            if *user == next {
                false
            } else {
                *user = next;
                true
            }
        };
        if changed {
            debug!(target: "sessiondb::session", signed_in = self.user.lock().is_some(), "Identity changed");
            self.dep.changed();
        }
    }
}

impl IdentityProvider for ReactiveIdentity {
    fn user_id(&self) -> Option<String> {
        self.dep.depend();
        self.user.lock().clone()
    }
}
