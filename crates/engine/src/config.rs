//! Session configuration via `sessiondb.toml`
//!
//! The only setting is the default lifetime applied when a write does not say
//! how long the value should live. It can come from a TOML file or from an
//! application settings document of the form
//! `{"public": {"persistent_session": {"default_method": "persistent"}}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sessiondb_core::{Error, Lifetime, Result};
use std::path::Path;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "sessiondb.toml";

/// JSON pointer of the default method inside a settings document
pub const SETTINGS_POINTER: &str = "/public/persistent_session/default_method";

/// Session configuration loaded from `sessiondb.toml`.
///
/// # Example
///
/// ```toml
/// # "temporary" (default), "persistent" or "authenticated"
/// default_method = "persistent"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of writes that pass neither `persist` nor `auth`
    #[serde(default)]
    pub default_method: Lifetime,
}

impl SessionConfig {
    /// Config with the given default lifetime
    pub fn with_default_method(default_method: Lifetime) -> Self {
        SessionConfig { default_method }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# sessiondb configuration
#
# Lifetime of values written without an explicit persist/auth flag:
#   "temporary"     = memory only, lost on reload (default)
#   "persistent"    = survives reloads
#   "authenticated" = survives reloads, cleared on logout
default_method = "temporary"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Read the default method from an application settings document.
    ///
    /// A document without the setting yields the default config.
    ///
    /// # Errors
    ///
    /// `Config` when the setting is present but not a known lifetime name.
    pub fn from_settings_json(settings: &JsonValue) -> Result<Self> {
        match settings.pointer(SETTINGS_POINTER) {
            None | Some(JsonValue::Null) => Ok(Self::default()),
            Some(JsonValue::String(name)) => name
                .parse()
                .map(Self::with_default_method)
                .map_err(|e| Error::config(format!("Invalid default_method in settings: {}", e))),
            Some(other) => Err(Error::config(format!(
                "default_method in settings must be a string, found {}",
                other
            ))),
        }
    }

    /// Parse a settings document from text, then as [`from_settings_json`](Self::from_settings_json)
    pub fn from_settings_str(settings: &str) -> Result<Self> {
        let json: JsonValue = serde_json::from_str(settings)
            .map_err(|e| Error::config(format!("Failed to parse settings: {}", e)))?;
        Self::from_settings_json(&json)
    }
}
