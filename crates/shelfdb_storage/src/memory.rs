//! In-memory persistence host for testing.

use crate::error::HostResult;
use crate::host::PersistenceHost;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory persistence host.
///
/// This host keeps every entry in a hash map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// `keys()` deliberately returns keys in hash order, so callers cannot
/// accidentally rely on the host for ordering.
///
/// # Example
///
/// ```rust
/// use shelfdb_storage::{InMemoryHost, PersistenceHost};
///
/// let host = InMemoryHost::new();
/// host.update("greeting", Some(b"hello")).unwrap();
/// assert_eq!(host.get("greeting").unwrap(), Some(b"hello".to_vec()));
/// host.update("greeting", None).unwrap();
/// assert!(host.get("greeting").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryHost {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryHost {
    /// Creates a new empty in-memory host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory host with pre-existing entries.
    ///
    /// Useful for testing reload scenarios.
    #[must_use]
    pub fn with_entries(entries: HashMap<String, Vec<u8>>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Vec<u8>> {
        self.entries.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the host holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PersistenceHost for InMemoryHost {
    fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn update(&self, key: &str, value: Option<&[u8]>) -> HostResult<()> {
        let mut entries = self.entries.write();
        match value {
            Some(bytes) => {
                entries.insert(key.to_string(), bytes.to_vec());
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(())
    }

    fn keys(&self) -> HostResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
