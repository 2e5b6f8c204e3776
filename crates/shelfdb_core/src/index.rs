//! Secondary indexes over object stores.
//!
//! An index keeps a [`RecordStore`] of `(index_key, primary_key)` entries.
//! Index keys come from evaluating the index key path against each stored
//! value; values whose path does not resolve to a key are simply absent
//! from the index. A multi-entry index over an array value stores one
//! entry per distinct valid element.

use crate::catalog::{self, IndexDescriptor};
use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStore;
use crate::record_store::{RecordStore, StoreKind};
use crate::rollback::RollbackLog;
use crate::search;
use crate::types::{Direction, Record};
use parking_lot::RwLock;
use shelfdb_codec::{Key, KeyPath, KeyQuery, KeyRange, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A derived-key view over an object store.
pub struct Index {
    name: RwLock<String>,
    key_path: KeyPath,
    multi_entry: bool,
    unique: bool,
    initialized: AtomicBool,
    records: Arc<RecordStore>,
    store: Weak<ObjectStore>,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &*self.name.read())
            .field("key_path", &self.key_path)
            .field("multi_entry", &self.multi_entry)
            .field("unique", &self.unique)
            .field("initialized", &self.is_initialized())
            .field("entries", &self.records.len())
            .finish()
    }
}

impl Index {
    pub(crate) fn open(
        store: &Arc<ObjectStore>,
        descriptor: IndexDescriptor,
        initialized: bool,
    ) -> CoreResult<Arc<Self>> {
        let records = RecordStore::open(
            Arc::clone(store.catalog().host()),
            catalog::index_namespace(store.database(), &store.name(), &descriptor.name),
            StoreKind::Index,
            store.verify_ordering(),
        )?;
        Ok(Arc::new(Self {
            name: RwLock::new(descriptor.name),
            key_path: descriptor.key_path,
            multi_entry: descriptor.multi_entry,
            unique: descriptor.unique,
            initialized: AtomicBool::new(initialized),
            records: Arc::new(records),
            store: Arc::downgrade(store),
        }))
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
    }

    /// Returns the key path index keys are read from.
    #[must_use]
    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    /// Returns true if array values produce one entry per element.
    #[must_use]
    pub fn multi_entry(&self) -> bool {
        self.multi_entry
    }

    /// Returns true if index keys must be unique.
    #[must_use]
    pub fn unique(&self) -> bool {
        self.unique
    }

    /// Returns true once the index has been populated.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Returns the entry store.
    #[must_use]
    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    /// Returns this index's persisted descriptor.
    #[must_use]
    pub fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor {
            name: self.name(),
            key_path: self.key_path.clone(),
            multi_entry: self.multi_entry,
            unique: self.unique,
        }
    }

    fn object_store(&self) -> CoreResult<Arc<ObjectStore>> {
        self.store
            .upgrade()
            .ok_or_else(|| CoreError::invalid_state("the index's object store is gone"))
    }

    /// Works out the index keys for a stored value.
    fn index_keys(&self, value: &Value) -> Vec<Key> {
        let Some(extracted) = self.key_path.evaluate(value) else {
            return Vec::new();
        };
        match (&extracted, self.multi_entry) {
            (Value::Array(items), true) => {
                let mut keys: Vec<Key> = Vec::with_capacity(items.len());
                for key in items.iter().filter_map(|item| Key::from_value(item).ok()) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            }
            _ => Key::from_value(&extracted).into_iter().collect(),
        }
    }

    /// Adds the entries for one object store record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Constraint`] if a unique index already holds
    /// one of the record's index keys; nothing is written in that case.
    pub fn store_record(&self, record: &Record, mut log: Option<&mut RollbackLog>) -> CoreResult<()> {
        let keys = self.index_keys(&record.value);
        if keys.is_empty() {
            return Ok(());
        }

        if self.unique {
            if let Some(taken) = keys
                .iter()
                .find(|key| self.records.count(Some(&KeyRange::only((*key).clone()))) > 0)
            {
                return Err(CoreError::constraint(format!(
                    "index '{}' already holds key {taken}",
                    self.name()
                )));
            }
        }

        let primary = record.key.to_value();
        for key in keys {
            let entry = Record::new(key, primary.clone());
            self.records.add(entry.clone())?;
            if let Some(log) = log.as_deref_mut() {
                let records = Arc::clone(&self.records);
                log.push(move || records.remove(&entry).map(|_| ()));
            }
        }
        Ok(())
    }

    /// Populates the index from every record of its object store and
    /// marks it initialized.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the index is already initialized.
    /// - [`CoreError::Constraint`] if existing records violate
    ///   uniqueness.
    pub fn initialize(&self, mut log: Option<&mut RollbackLog>) -> CoreResult<()> {
        if self.is_initialized() {
            return Err(CoreError::invalid_state(format!(
                "index '{}' is already initialized",
                self.name()
            )));
        }
        let store = self.object_store()?;
        let values = store.records().values(None, Direction::Next);
        for record in &values {
            self.store_record(&record, log.as_deref_mut())?;
        }
        self.initialized.store(true, Ordering::Release);
        tracing::debug!(
            index = %self.name(),
            entries = self.records.len(),
            "initialized index"
        );
        Ok(())
    }

    /// Returns the primary key of the first entry matching `query`.
    #[must_use]
    pub fn get_key(&self, query: &KeyQuery) -> Option<Key> {
        self.records
            .get(query)
            .and_then(|entry| Key::from_value(&entry.value).ok())
    }

    /// Returns the object store value of the first entry matching
    /// `query`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the object store is gone.
    pub fn get_value(&self, query: &KeyQuery) -> CoreResult<Option<Value>> {
        let Some(primary) = self.get_key(query) else {
            return Ok(None);
        };
        Ok(self.object_store()?.get_value(&KeyQuery::Key(primary)))
    }

    /// Returns the primary keys of the entries in `range`, ordered by
    /// index key then primary key. A count of `None` or `0` is unbounded.
    #[must_use]
    pub fn get_all_keys(&self, range: Option<KeyRange>, count: Option<u32>) -> Vec<Key> {
        let values = self.records.values(range, Direction::Next);
        values
            .iter()
            .filter_map(|entry| Key::from_value(&entry.value).ok())
            .take(search::limit(count))
            .collect()
    }

    /// Returns the object store values of the entries in `range`, in
    /// index order. A count of `None` or `0` is unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the object store is gone.
    pub fn get_all_values(&self, range: Option<KeyRange>, count: Option<u32>) -> CoreResult<Vec<Value>> {
        let store = self.object_store()?;
        let values = self.records.values(range, Direction::Next);
        Ok(values
            .iter()
            .filter_map(|entry| Key::from_value(&entry.value).ok())
            .filter_map(|primary| store.get_value(&KeyQuery::Key(primary)))
            .take(search::limit(count))
            .collect())
    }

    /// Counts the entries in `range`.
    #[must_use]
    pub fn count(&self, range: Option<&KeyRange>) -> usize {
        self.records.count(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, StoreDescriptor};
    use shelfdb_storage::InMemoryHost;

    fn store() -> Arc<ObjectStore> {
        let catalog = Catalog::new(Arc::new(InMemoryHost::new()));
        let descriptor = StoreDescriptor {
            name: "books".into(),
            key_path: None,
            auto_increment: true,
        };
        ObjectStore::open("d", descriptor, &catalog, true).unwrap()
    }

    fn index(store: &Arc<ObjectStore>, path: &str, multi_entry: bool, unique: bool) -> Arc<Index> {
        let mut log = RollbackLog::new();
        store
            .create_index(
                IndexDescriptor {
                    name: "i".into(),
                    key_path: KeyPath::single(path).unwrap(),
                    multi_entry,
                    unique,
                },
                &mut log,
            )
            .unwrap()
    }

    fn put(store: &Arc<ObjectStore>, value: Value) -> Key {
        store.store_record(value, None, false, None).unwrap()
    }

    #[test]
    fn uninitialized_index_ignores_writes() {
        let store = store();
        let idx = index(&store, "author", false, false);
        put(&store, Value::map([("author", "Orwell")]));
        assert_eq!(idx.count(None), 0);

        idx.initialize(None).unwrap();
        assert_eq!(idx.count(None), 1);
        put(&store, Value::map([("author", "Austen")]));
        assert_eq!(idx.count(None), 2);
    }

    #[test]
    fn initialize_twice_is_invalid_state() {
        let store = store();
        let idx = index(&store, "author", false, false);
        idx.initialize(None).unwrap();
        assert_eq!(idx.initialize(None).unwrap_err().name(), "InvalidStateError");
    }

    #[test]
    fn records_without_a_key_are_skipped() {
        let store = store();
        let idx = index(&store, "author", false, false);
        idx.initialize(None).unwrap();
        put(&store, Value::map([("title", "anon")]));
        put(&store, Value::map([("author", true)]));
        assert_eq!(idx.count(None), 0);
        assert_eq!(store.count(None), 2);
    }

    #[test]
    fn multi_entry_filters_and_dedupes() {
        let store = store();
        let idx = index(&store, "tags", true, false);
        idx.initialize(None).unwrap();
        let tags = Value::array([Value::from("a"), Value::from("b"), Value::from("a"), Value::Null]);
        let key = put(&store, Value::map([("tags", tags)]));

        assert_eq!(idx.get_all_keys(None, None), vec![key.clone(), key]);
        assert_eq!(idx.count(Some(&KeyRange::only(Key::from("a")))), 1);
    }

    #[test]
    fn array_without_multi_entry_is_one_key() {
        let store = store();
        let idx = index(&store, "tags", false, false);
        idx.initialize(None).unwrap();
        put(&store, Value::map([("tags", Value::array(["a", "b"]))]));
        let array_key = Key::Array(vec![Key::from("a"), Key::from("b")]);
        assert_eq!(idx.count(Some(&KeyRange::only(array_key))), 1);
    }

    #[test]
    fn unique_multi_entry_collision_writes_nothing() {
        let store = store();
        let idx = index(&store, "tags", true, true);
        idx.initialize(None).unwrap();
        put(&store, Value::map([("tags", Value::array(["a"]))]));

        let err = store
            .store_record(Value::map([("tags", Value::array(["z", "a"]))]), None, false, None)
            .unwrap_err();
        assert_eq!(err.name(), "ConstraintError");
        assert!(idx.get_key(&Key::from("z").into()).is_none());
        assert_eq!(idx.count(None), 1);
    }

    #[test]
    fn initialize_fails_on_existing_duplicates() {
        let store = store();
        put(&store, Value::map([("author", "Orwell")]));
        put(&store, Value::map([("author", "Orwell")]));
        let idx = index(&store, "author", false, true);

        let mut log = RollbackLog::new();
        let err = idx.initialize(Some(&mut log)).unwrap_err();
        assert_eq!(err.name(), "ConstraintError");
        assert!(!idx.is_initialized());
        log.rollback();
        assert_eq!(idx.count(None), 0);
    }

    #[test]
    fn value_lookups_go_through_the_store() {
        let store = store();
        let idx = index(&store, "author", false, false);
        idx.initialize(None).unwrap();
        put(&store, Value::map([("author", "Orwell"), ("title", "1984")]));
        put(&store, Value::map([("author", "Orwell"), ("title", "Animal Farm")]));
        put(&store, Value::map([("author", "Austen"), ("title", "Emma")]));

        let orwell = KeyRange::only(Key::from("Orwell"));
        let titles: Vec<Value> = idx
            .get_all_values(Some(orwell.clone()), None)
            .unwrap()
            .into_iter()
            .filter_map(|v| v.get("title").cloned())
            .collect();
        assert_eq!(titles, vec![Value::from("1984"), Value::from("Animal Farm")]);

        let first = idx.get_value(&orwell.into()).unwrap().unwrap();
        assert_eq!(first.get("title"), Some(&Value::from("1984")));
        assert_eq!(idx.get_all_keys(None, Some(1)), vec![Key::from(3)]);
    }
}
