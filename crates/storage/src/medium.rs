//! In-process storage medium.

use crate::traits::StorageMedium;
use parking_lot::RwLock;
use sessiondb_core::Result;
use std::collections::BTreeMap;

/// In-memory medium backed by a `BTreeMap`.
///
/// Wrap in `Arc` to share one medium between stores. Useful for tests and
/// for simulating a reload: keep the medium, drop and rebuild everything
/// above it.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryMedium {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of raw items
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// True when the medium holds no items
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Drop every item
    pub fn clear(&self) {
        self.items.write().clear();
    }
}

impl StorageMedium for MemoryMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().remove(key);
        Ok(())
    }

    fn item_keys(&self) -> Result<Vec<String>> {
        Ok(self.items.read().keys().cloned().collect())
    }
}
