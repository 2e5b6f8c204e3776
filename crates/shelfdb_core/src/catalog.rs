//! Persisted schema and registry.
//!
//! Metadata lives in the same host as the records, under keys built from
//! quoted names so that no database, store or index name can collide with
//! another's namespace:
//!
//! ```text
//! databases                                   registry: name -> version
//! db['books'].stores                          object store descriptors
//! db['books'].store['s'].indexes              index descriptors
//! db['books'].store['s'].keygen               key generator counter
//! db['books'].store['s'].records/<hex>        records
//! db['books'].store['s'].index['i'].records/<hex>
//! ```
//!
//! Every document is CBOR.

use crate::error::CoreResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shelfdb_codec::{from_cbor, to_cbor, KeyPath};
use shelfdb_storage::PersistenceHost;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Host key of the database registry.
pub const REGISTRY_KEY: &str = "databases";

/// Persisted shape of an object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    /// Store name.
    pub name: String,
    /// Where keys live inside values, if anywhere.
    pub key_path: Option<KeyPath>,
    /// Whether the store generates keys.
    pub auto_increment: bool,
}

/// Persisted shape of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,
    /// Where index keys live inside values.
    pub key_path: KeyPath,
    /// Whether array values produce one entry per element.
    pub multi_entry: bool,
    /// Whether index keys must be unique.
    pub unique: bool,
}

fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Returns the metadata prefix of a database.
#[must_use]
pub fn database_prefix(database: &str) -> String {
    format!("db[{}]", quote(database))
}

/// Returns the metadata prefix of an object store.
#[must_use]
pub fn store_prefix(database: &str, store: &str) -> String {
    format!("{}.store[{}]", database_prefix(database), quote(store))
}

/// Returns the record namespace of an object store.
#[must_use]
pub fn records_namespace(database: &str, store: &str) -> String {
    format!("{}.records", store_prefix(database, store))
}

/// Returns the record namespace of an index.
#[must_use]
pub fn index_namespace(database: &str, store: &str, index: &str) -> String {
    format!("{}.index[{}].records", store_prefix(database, store), quote(index))
}

/// Reads and writes engine metadata in a host.
#[derive(Clone)]
pub struct Catalog {
    host: Arc<dyn PersistenceHost>,
}

impl Catalog {
    /// Creates a catalog over `host`.
    pub fn new(host: Arc<dyn PersistenceHost>) -> Self {
        Self { host }
    }

    /// Returns the underlying host.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn PersistenceHost> {
        &self.host
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        match self.host.get(key)? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, document: &T) -> CoreResult<()> {
        let bytes = to_cbor(document)?;
        self.host.update(key, Some(&bytes))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.host.update(key, None)?;
        Ok(())
    }

    /// Loads every registered database and its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or decoded.
    pub fn load_registry(&self) -> CoreResult<BTreeMap<String, u64>> {
        Ok(self.load(REGISTRY_KEY)?.unwrap_or_default())
    }

    /// Records `version` for `database`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be rewritten.
    pub fn put_version(&self, database: &str, version: u64) -> CoreResult<()> {
        let mut registry = self.load_registry()?;
        registry.insert(database.to_string(), version);
        self.save(REGISTRY_KEY, &registry)
    }

    /// Removes `database` from the registry along with its store list.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be rewritten.
    pub fn remove_database(&self, database: &str) -> CoreResult<()> {
        let mut registry = self.load_registry()?;
        registry.remove(database);
        self.save(REGISTRY_KEY, &registry)?;
        self.remove(&format!("{}.stores", database_prefix(database)))
    }

    /// Loads the object store descriptors of `database`.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptors cannot be read or decoded.
    pub fn load_stores(&self, database: &str) -> CoreResult<Vec<StoreDescriptor>> {
        Ok(self
            .load(&format!("{}.stores", database_prefix(database)))?
            .unwrap_or_default())
    }

    /// Replaces the object store descriptors of `database`.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptors cannot be written.
    pub fn save_stores(&self, database: &str, stores: &[StoreDescriptor]) -> CoreResult<()> {
        self.save(&format!("{}.stores", database_prefix(database)), stores)
    }

    /// Loads the index descriptors of a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptors cannot be read or decoded.
    pub fn load_indexes(&self, database: &str, store: &str) -> CoreResult<Vec<IndexDescriptor>> {
        Ok(self
            .load(&format!("{}.indexes", store_prefix(database, store)))?
            .unwrap_or_default())
    }

    /// Replaces the index descriptors of a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptors cannot be written.
    pub fn save_indexes(
        &self,
        database: &str,
        store: &str,
        indexes: &[IndexDescriptor],
    ) -> CoreResult<()> {
        self.save(&format!("{}.indexes", store_prefix(database, store)), indexes)
    }

    /// Loads a store's key generator counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be read or decoded.
    pub fn load_generator(&self, database: &str, store: &str) -> CoreResult<Option<u64>> {
        self.load(&format!("{}.keygen", store_prefix(database, store)))
    }

    /// Persists a store's key generator counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be written.
    pub fn save_generator(&self, database: &str, store: &str, current: u64) -> CoreResult<()> {
        self.save(&format!("{}.keygen", store_prefix(database, store)), &current)
    }

    /// Removes a store's index list and generator counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries cannot be removed.
    pub fn remove_store_meta(&self, database: &str, store: &str) -> CoreResult<()> {
        let prefix = store_prefix(database, store);
        self.remove(&format!("{prefix}.indexes"))?;
        self.remove(&format!("{prefix}.keygen"))
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}
