//! File-backed storage medium
//!
//! The whole medium lives in one JSON object file (`{"key": "raw item", ...}`).
//! Every mutation rewrites the file through a sibling temp file and an atomic
//! rename, so a crash leaves either the old or the new contents on disk.

use crate::traits::StorageMedium;
use parking_lot::RwLock;
use sessiondb_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Medium persisted to a single JSON file
#[derive(Debug)]
pub struct FileMedium {
    path: PathBuf,
    items: RwLock<BTreeMap<String, String>>,
}

impl FileMedium {
    /// Open (or lazily create) the medium at `path`.
    ///
    /// A missing file is an empty medium; the file is created on first write.
    /// A file that does not parse is logged and treated as empty rather than
    /// failing the open.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(
                            target: "sessiondb::storage",
                            path = %path.display(),
                            error = %e,
                            "Storage file is corrupt, starting with an empty medium"
                        );
                        BTreeMap::new()
                    }
                }
            }
        } else {
            BTreeMap::new()
        };

        debug!(
            target: "sessiondb::storage",
            path = %path.display(),
            items = items.len(),
            "Opened file medium"
        );

        Ok(FileMedium {
            path,
            items: RwLock::new(items),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string(items)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, content).map_err(|e| {
            Error::storage(format!(
                "Failed to write storage file '{}': {}",
                tmp_path.display(),
                e
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            Error::storage(format!(
                "Failed to replace storage file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl StorageMedium for FileMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.write();
        items.insert(key.to_string(), value.to_string());
        self.persist(&items)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.write();
        if items.remove(key).is_some() {
            self.persist(&items)?;
        }
        Ok(())
    }

    fn item_keys(&self) -> Result<Vec<String>> {
        Ok(self.items.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_and_created_on_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let medium = FileMedium::open(&path).unwrap();
        assert!(medium.item_keys().unwrap().is_empty());
        assert!(!path.exists());

        medium.set_item("k", "v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn items_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        {
            let medium = FileMedium::open(&path).unwrap();
            medium.set_item("a", "1").unwrap();
            medium.set_item("b", "2").unwrap();
            medium.remove_item("a").unwrap();
        }

        let reopened = FileMedium::open(&path).unwrap();
        assert_eq!(reopened.get_item("a").unwrap(), None);
        assert_eq!(reopened.get_item("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let medium = FileMedium::open(&path).unwrap();
        assert!(medium.item_keys().unwrap().is_empty());

        // the next write replaces the corrupt file
        medium.set_item("k", "v").unwrap();
        let reopened = FileMedium::open(&path).unwrap();
        assert_eq!(reopened.get_item("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn nested_directories_are_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("session.json");
        let medium = FileMedium::open(&path).unwrap();
        medium.set_item("k", "v").unwrap();
        assert!(path.exists());
    }
}
