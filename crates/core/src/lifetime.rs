//! Lifetime tiers
//!
//! A key's lifetime decides where its value survives:
//!
//! | Lifetime | Memory | Durable store | Cleared on logout |
//! |----------|--------|---------------|-------------------|
//! | Temporary | yes | no | no |
//! | Persistent | yes | yes | no |
//! | Authenticated | yes | yes | yes |
//!
//! The tier is never stored on an entry. It is derived from membership in the
//! namespace's persistent/authenticated key lists.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifetime tier of a session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// Memory only
    #[default]
    Temporary,
    /// Survives reloads
    Persistent,
    /// Survives reloads, wiped on logout
    Authenticated,
}

impl Lifetime {
    /// All tiers, in ascending order of durability
    pub const ALL: [Lifetime; 3] = [
        Lifetime::Temporary,
        Lifetime::Persistent,
        Lifetime::Authenticated,
    ];

    /// Resolve the effective lifetime of a write.
    ///
    /// `persist` and `auth` are tri-state: `None` means the caller did not say.
    ///
    /// | persist | auth | default | result |
    /// |---|---|---|---|
    /// | `Some(false)` | any | any | Temporary |
    /// | `Some(true)` | `Some(true)` | any | Authenticated |
    /// | `Some(true)` | otherwise | any | Persistent |
    /// | `None` | any | Temporary | Temporary |
    /// | `None` | `Some(true)` | Persistent / Authenticated | Authenticated |
    /// | `None` | `Some(false)` | Persistent / Authenticated | Persistent |
    /// | `None` | `None` | Persistent | Persistent |
    /// | `None` | `None` | Authenticated | Authenticated |
    pub fn resolve(persist: Option<bool>, auth: Option<bool>, default: Lifetime) -> Lifetime {
        match (persist, auth, default) {
            (Some(false), _, _) => Lifetime::Temporary,
            (Some(true), Some(true), _) => Lifetime::Authenticated,
            (Some(true), _, _) => Lifetime::Persistent,
            (None, _, Lifetime::Temporary) => Lifetime::Temporary,
            (None, Some(true), _) => Lifetime::Authenticated,
            (None, Some(false), _) => Lifetime::Persistent,
            (None, None, tier) => tier,
        }
    }

    /// The `(persist, auth)` flags that resolve to this tier under any default
    pub fn as_flags(self) -> (Option<bool>, Option<bool>) {
        match self {
            Lifetime::Temporary => (Some(false), Some(false)),
            Lifetime::Persistent => (Some(true), Some(false)),
            Lifetime::Authenticated => (Some(true), Some(true)),
        }
    }

    /// True for tiers backed by the durable store
    pub fn is_durable(self) -> bool {
        !matches!(self, Lifetime::Temporary)
    }

    /// Lowercase name, as used in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            Lifetime::Temporary => "temporary",
            Lifetime::Persistent => "persistent",
            Lifetime::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifetime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temporary" => Ok(Lifetime::Temporary),
            "persistent" => Ok(Lifetime::Persistent),
            "authenticated" => Ok(Lifetime::Authenticated),
            other => Err(Error::invalid_argument(format!(
                "unknown lifetime '{}', expected \"temporary\", \"persistent\" or \"authenticated\"",
                other
            ))),
        }
    }
}
