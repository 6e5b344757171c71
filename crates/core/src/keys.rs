//! Namespaces and the durable keying scheme
//!
//! Every store instance owns one namespace. Durable keys are built by plain
//! string concatenation so that data written by earlier releases stays
//! addressable:
//!
//! | Durable key | Contents |
//! |---|---|
//! | `"__PSKEYS__" + N` | persistent key list |
//! | `"__PSAKEYS__" + N` | authenticated key list |
//! | `"__PSDATAVERSION__" + N` | schema version marker |
//! | `N + key` | encoded value of `key` |
//!
//! The default instance is opened under the reserved name `"session"` and
//! uses the empty prefix.

use crate::error::{Error, Result};
use std::fmt;

/// Prefix of the persistent key list
pub const PS_KEYS: &str = "__PSKEYS__";
/// Prefix of the authenticated key list
pub const PSA_KEYS: &str = "__PSAKEYS__";
/// Prefix of the schema version marker
pub const PS_DATA_VERSION: &str = "__PSDATAVERSION__";
/// Namespace name that designates the process-wide default instance
pub const DEFAULT_NAMESPACE: &str = "session";

/// Validated store namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: String,
    prefix: String,
}

impl Namespace {
    /// Validate a namespace name.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("namespace must be a non-empty string"));
        }
        let prefix = if name == DEFAULT_NAMESPACE {
            String::new()
        } else {
            name.clone()
        };
        Ok(Namespace { name, prefix })
    }

    /// The namespace of the default instance
    pub fn default_instance() -> Self {
        Namespace {
            name: DEFAULT_NAMESPACE.to_string(),
            prefix: String::new(),
        }
    }

    /// Name the namespace was opened under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix applied to durable keys (empty for the default instance)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True for the default instance
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_NAMESPACE
    }

    /// Durable key of the persistent key list
    pub fn persistent_list_key(&self) -> String {
        format!("{}{}", PS_KEYS, self.prefix)
    }

    /// Durable key of the authenticated key list
    pub fn authenticated_list_key(&self) -> String {
        format!("{}{}", PSA_KEYS, self.prefix)
    }

    /// Durable key of the schema version marker
    pub fn version_key(&self) -> String {
        format!("{}{}", PS_DATA_VERSION, self.prefix)
    }

    /// Durable slot of a user key
    pub fn slot_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
