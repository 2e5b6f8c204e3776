//! Object stores: records plus their secondary indexes.
//!
//! An [`ObjectStore`] owns the primary [`RecordStore`] of one named
//! collection. It works out each record's key, either from the value
//! through the store's key path, from the caller, or from the key
//! generator. It enforces `no_overwrite` and fans every write and
//! delete out to the store's indexes.
//!
//! Mutations accept an optional [`RollbackLog`]. When one is given, every
//! change pushes an undo action. A failing write always rolls back its own
//! partial changes before returning the error, so a rejected write leaves
//! nothing behind.

use crate::catalog::{self, Catalog, IndexDescriptor, StoreDescriptor};
use crate::error::{CoreError, CoreResult};
use crate::index::Index;
use crate::key_generator::KeyGenerator;
use crate::record_store::{RecordStore, StoreKind};
use crate::rollback::RollbackLog;
use crate::search;
use crate::types::{Direction, Record};
use parking_lot::{Mutex, RwLock};
use shelfdb_codec::{Key, KeyPath, KeyQuery, KeyRange, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A named collection of records.
pub struct ObjectStore {
    database: String,
    name: RwLock<String>,
    key_path: Option<KeyPath>,
    auto_increment: bool,
    generator: Option<Mutex<KeyGenerator>>,
    records: Arc<RecordStore>,
    indexes: RwLock<BTreeMap<String, Arc<Index>>>,
    catalog: Catalog,
    verify_ordering: bool,
    deleted: AtomicBool,
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &*self.name.read())
            .field("key_path", &self.key_path)
            .field("auto_increment", &self.auto_increment)
            .field("records", &self.records.len())
            .field("indexes", &self.index_names())
            .finish_non_exhaustive()
    }
}

impl ObjectStore {
    /// Opens the store described by `descriptor`, loading its records,
    /// key generator and indexes from the catalog's host.
    ///
    /// Loaded indexes are initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read.
    pub(crate) fn open(
        database: &str,
        descriptor: StoreDescriptor,
        catalog: &Catalog,
        verify_ordering: bool,
    ) -> CoreResult<Arc<Self>> {
        let records = RecordStore::open(
            Arc::clone(catalog.host()),
            catalog::records_namespace(database, &descriptor.name),
            StoreKind::Primary,
            verify_ordering,
        )?;
        let generator = if descriptor.auto_increment {
            let current = catalog
                .load_generator(database, &descriptor.name)?
                .unwrap_or(0);
            Some(Mutex::new(KeyGenerator::with_current(current)))
        } else {
            None
        };

        let store = Arc::new(Self {
            database: database.to_string(),
            name: RwLock::new(descriptor.name.clone()),
            key_path: descriptor.key_path,
            auto_increment: descriptor.auto_increment,
            generator,
            records: Arc::new(records),
            indexes: RwLock::new(BTreeMap::new()),
            catalog: catalog.clone(),
            verify_ordering,
            deleted: AtomicBool::new(false),
        });

        for index in catalog.load_indexes(database, &descriptor.name)? {
            let opened = Index::open(&store, index, true)?;
            store.indexes.write().insert(opened.name(), opened);
        }
        Ok(store)
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Returns the owning database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the key path, if keys live inside values.
    #[must_use]
    pub fn key_path(&self) -> Option<&KeyPath> {
        self.key_path.as_ref()
    }

    /// Returns true if the store generates keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Returns the last generated key, if the store generates keys.
    #[must_use]
    pub fn generator_current(&self) -> Option<u64> {
        self.generator.as_ref().map(|g| g.lock().current())
    }

    /// Returns true once the store has been deleted from its database.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn set_deleted(&self, deleted: bool) {
        self.deleted.store(deleted, Ordering::Release);
    }

    /// Returns the index names in ascending order.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    /// Returns the named index.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<Arc<Index>> {
        self.indexes.read().get(name).cloned()
    }

    /// Returns the primary record store.
    #[must_use]
    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    pub(crate) fn verify_ordering(&self) -> bool {
        self.verify_ordering
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns this store's persisted descriptor.
    #[must_use]
    pub fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor {
            name: self.name(),
            key_path: self.key_path.clone(),
            auto_increment: self.auto_increment,
        }
    }

    /// Stores `value`, returning the key it was stored under.
    ///
    /// `key` is the caller's explicit key and must be `None` when the
    /// store has a key path. With `no_overwrite` an existing record at the
    /// key fails the write with [`CoreError::Constraint`].
    ///
    /// # Errors
    ///
    /// - [`CoreError::Data`] if no key can be determined or the key path
    ///   resolves to something that is not a key.
    /// - [`CoreError::InvalidAccess`] if a key must be generated for an
    ///   array key path.
    /// - [`CoreError::Constraint`] on `no_overwrite` collisions, unique
    ///   index collisions, or an exhausted key generator.
    pub fn store_record(
        self: &Arc<Self>,
        value: Value,
        key: Option<Key>,
        no_overwrite: bool,
        log: Option<&mut RollbackLog>,
    ) -> CoreResult<Key> {
        let mut local = RollbackLog::new();
        match self.store_record_logged(value, key, no_overwrite, &mut local) {
            Ok(key) => {
                if let Some(log) = log {
                    log.extend(local);
                }
                Ok(key)
            }
            Err(err) => {
                local.rollback();
                Err(err)
            }
        }
    }

    fn store_record_logged(
        self: &Arc<Self>,
        mut value: Value,
        key: Option<Key>,
        no_overwrite: bool,
        log: &mut RollbackLog,
    ) -> CoreResult<Key> {
        let extracted = match (&self.key_path, key) {
            (Some(_), Some(_)) => {
                return Err(CoreError::data(
                    "an explicit key cannot be given to a store with a key path",
                ))
            }
            (Some(path), None) => path.extract_key(&value)?,
            (None, key) => key,
        };

        let key = match extracted {
            Some(key) => {
                key.validate()?;
                if let Key::Number(n) = &key {
                    self.raise_generator(*n, log)?;
                }
                key
            }
            None => {
                let generated = self.generate_key(log)?;
                if let Some(path) = &self.key_path {
                    path.inject(&mut value, &generated)?;
                }
                generated
            }
        };

        let query = KeyQuery::Key(key.clone());
        if self.records.get(&query).is_some() {
            if no_overwrite {
                return Err(CoreError::constraint(format!(
                    "a record with key {key} already exists in '{}'",
                    self.name()
                )));
            }
            self.delete_logged(&query, log)?;
        }

        let record = Record::new(key.clone(), value);
        self.records.add(record.clone())?;
        {
            let records = Arc::clone(&self.records);
            let added = record.clone();
            log.push(move || records.remove(&added).map(|_| ()));
        }

        let indexes: Vec<Arc<Index>> = self
            .indexes
            .read()
            .values()
            .filter(|index| index.is_initialized())
            .cloned()
            .collect();
        for index in indexes {
            index.store_record(&record, Some(&mut *log))?;
        }
        Ok(key)
    }

    fn generate_key(self: &Arc<Self>, log: &mut RollbackLog) -> CoreResult<Key> {
        let Some(generator) = &self.generator else {
            return Err(CoreError::data(format!(
                "'{}' has no key path value and no key generator",
                self.name()
            )));
        };
        if matches!(self.key_path, Some(KeyPath::Sequence(_))) {
            return Err(CoreError::invalid_access(
                "keys cannot be generated for an array key path",
            ));
        }

        let (previous, next) = {
            let mut generator = generator.lock();
            let previous = generator.current();
            (previous, generator.next()?)
        };
        self.persist_generator(next)?;
        self.push_generator_undo(previous, log);
        Ok(Key::Number(next as f64))
    }

    fn raise_generator(self: &Arc<Self>, n: f64, log: &mut RollbackLog) -> CoreResult<()> {
        let Some(generator) = &self.generator else {
            return Ok(());
        };
        let (previous, current) = {
            let mut generator = generator.lock();
            let previous = generator.current();
            if !generator.set_if_larger(n) {
                return Ok(());
            }
            (previous, generator.current())
        };
        self.persist_generator(current)?;
        self.push_generator_undo(previous, log);
        Ok(())
    }

    fn push_generator_undo(self: &Arc<Self>, previous: u64, log: &mut RollbackLog) {
        let store = Arc::clone(self);
        log.push(move || {
            if let Some(generator) = &store.generator {
                generator.lock().restore(previous);
            }
            store.persist_generator(previous)
        });
    }

    fn persist_generator(&self, current: u64) -> CoreResult<()> {
        self.catalog
            .save_generator(&self.database, &self.name(), current)
    }

    /// Deletes every record matching `query` along with its index
    /// entries. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns a host error if a removal cannot be written.
    pub fn delete_record(
        self: &Arc<Self>,
        query: &KeyQuery,
        log: Option<&mut RollbackLog>,
    ) -> CoreResult<usize> {
        let mut local = RollbackLog::new();
        match self.delete_logged(query, &mut local) {
            Ok(removed) => {
                if let Some(log) = log {
                    log.extend(local);
                }
                Ok(removed)
            }
            Err(err) => {
                local.rollback();
                Err(err)
            }
        }
    }

    fn delete_logged(self: &Arc<Self>, query: &KeyQuery, log: &mut RollbackLog) -> CoreResult<usize> {
        let removed = self.records.delete(query)?;
        if removed.is_empty() {
            return Ok(0);
        }
        let count = removed.len();
        push_restore(log, &self.records, removed);

        let indexes: Vec<Arc<Index>> = self.indexes.read().values().cloned().collect();
        for index in indexes {
            let entries = index.records().delete_by_value(query)?;
            push_restore(log, index.records(), entries);
        }
        Ok(count)
    }

    /// Removes every record and every index entry.
    ///
    /// # Errors
    ///
    /// Returns a host error if a removal cannot be written.
    pub fn clear(self: &Arc<Self>, log: Option<&mut RollbackLog>) -> CoreResult<()> {
        let mut local = RollbackLog::new();
        match self.clear_logged(&mut local) {
            Ok(()) => {
                if let Some(log) = log {
                    log.extend(local);
                }
                Ok(())
            }
            Err(err) => {
                local.rollback();
                Err(err)
            }
        }
    }

    fn clear_logged(&self, log: &mut RollbackLog) -> CoreResult<()> {
        let removed = self.records.clear()?;
        push_restore(log, &self.records, removed);
        let indexes: Vec<Arc<Index>> = self.indexes.read().values().cloned().collect();
        for index in indexes {
            let entries = index.records().clear()?;
            push_restore(log, index.records(), entries);
        }
        Ok(())
    }

    /// Returns the key of the first record matching `query`.
    #[must_use]
    pub fn get_key(&self, query: &KeyQuery) -> Option<Key> {
        self.records.get(query).map(|record| record.key)
    }

    /// Returns the value of the first record matching `query`.
    #[must_use]
    pub fn get_value(&self, query: &KeyQuery) -> Option<Value> {
        self.records.get(query).map(|record| record.value)
    }

    /// Returns the keys in `range`, ascending, stopping after `count`
    /// results. A count of `None` or `0` is unbounded.
    #[must_use]
    pub fn get_all_keys(&self, range: Option<KeyRange>, count: Option<u32>) -> Vec<Key> {
        let values = self.records.values(range, Direction::Next);
        values
            .iter()
            .take(search::limit(count))
            .map(|record| record.key)
            .collect()
    }

    /// Returns the values in `range`, in ascending key order, stopping
    /// after `count` results. A count of `None` or `0` is unbounded.
    #[must_use]
    pub fn get_all_values(&self, range: Option<KeyRange>, count: Option<u32>) -> Vec<Value> {
        let values = self.records.values(range, Direction::Next);
        values
            .iter()
            .take(search::limit(count))
            .map(|record| record.value)
            .collect()
    }

    /// Counts the records in `range`.
    #[must_use]
    pub fn count(&self, range: Option<&KeyRange>) -> usize {
        self.records.count(range)
    }

    /// Creates an index. The index takes no part in writes until it is
    /// initialized.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Constraint`] if the name is taken.
    /// - [`CoreError::InvalidAccess`] for a multi-entry array key path.
    pub fn create_index(
        self: &Arc<Self>,
        descriptor: IndexDescriptor,
        log: &mut RollbackLog,
    ) -> CoreResult<Arc<Index>> {
        if self.indexes.read().contains_key(&descriptor.name) {
            return Err(CoreError::constraint(format!(
                "index '{}' already exists on '{}'",
                descriptor.name,
                self.name()
            )));
        }
        if descriptor.multi_entry && descriptor.key_path.is_sequence() {
            return Err(CoreError::invalid_access(
                "a multi-entry index cannot use an array key path",
            ));
        }

        let index = Index::open(self, descriptor, false)?;
        self.indexes.write().insert(index.name(), Arc::clone(&index));
        self.persist_indexes()?;

        let store = Arc::clone(self);
        let created = Arc::clone(&index);
        log.push(move || {
            store.indexes.write().remove(&created.name());
            created.records().clear()?;
            store.persist_indexes()
        });

        tracing::debug!(store = %self.name(), index = %index.name(), "created index");
        Ok(index)
    }

    /// Deletes an index and its entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if there is no such index.
    pub fn delete_index(self: &Arc<Self>, name: &str, log: &mut RollbackLog) -> CoreResult<()> {
        let index = self
            .indexes
            .write()
            .remove(name)
            .ok_or_else(|| CoreError::not_found(name))?;
        let entries = index.records().clear()?;
        self.persist_indexes()?;

        let store = Arc::clone(self);
        log.push(move || {
            for entry in entries {
                index.records().add(entry)?;
            }
            store.indexes.write().insert(index.name(), index);
            store.persist_indexes()
        });
        Ok(())
    }

    /// Renames an index, moving its entries to the new namespace.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if there is no index named `from`.
    /// - [`CoreError::Constraint`] if `to` is taken.
    pub fn rename_index(
        self: &Arc<Self>,
        from: &str,
        to: &str,
        log: &mut RollbackLog,
    ) -> CoreResult<()> {
        if from == to {
            return Ok(());
        }
        self.move_index(from, to)?;
        let store = Arc::clone(self);
        let (from, to) = (from.to_string(), to.to_string());
        log.push(move || store.move_index(&to, &from));
        Ok(())
    }

    fn move_index(&self, from: &str, to: &str) -> CoreResult<()> {
        let index = {
            let mut indexes = self.indexes.write();
            if indexes.contains_key(to) {
                return Err(CoreError::constraint(format!("index '{to}' already exists")));
            }
            indexes
                .remove(from)
                .ok_or_else(|| CoreError::not_found(from))?
        };
        index.set_name(to);
        index
            .records()
            .relocate(catalog::index_namespace(&self.database, &self.name(), to))?;
        self.indexes.write().insert(to.to_string(), index);
        self.persist_indexes()
    }

    /// Moves the store, its generator and its indexes to the metadata of
    /// a new name.
    pub(crate) fn relocate(&self, name: &str) -> CoreResult<()> {
        let old = self.name();
        self.catalog.remove_store_meta(&self.database, &old)?;
        *self.name.write() = name.to_string();

        self.records
            .relocate(catalog::records_namespace(&self.database, name))?;
        for (index_name, index) in self.indexes.read().iter() {
            index
                .records()
                .relocate(catalog::index_namespace(&self.database, name, index_name))?;
        }
        if let Some(current) = self.generator_current() {
            self.persist_generator(current)?;
        }
        self.persist_indexes()
    }

    pub(crate) fn persist_indexes(&self) -> CoreResult<()> {
        let descriptors: Vec<IndexDescriptor> = self
            .indexes
            .read()
            .values()
            .map(|index| index.descriptor())
            .collect();
        self.catalog
            .save_indexes(&self.database, &self.name(), &descriptors)
    }
}

fn push_restore(log: &mut RollbackLog, records: &Arc<RecordStore>, removed: Vec<Record>) {
    if removed.is_empty() {
        return;
    }
    let records = Arc::clone(records);
    log.push(move || {
        for record in removed {
            records.add(record)?;
        }
        Ok(())
    });
}
