//! Transaction-bound handles to object stores and indexes.
//!
//! Handles validate arguments synchronously and queue the operation on
//! their transaction. The returned [`Request`] completes once the
//! transaction reaches the operation.

use crate::catalog::IndexDescriptor;
use crate::error::{CoreError, CoreResult};
use crate::index::Index;
use crate::object_store::ObjectStore;
use crate::request::{Output, Request};
use crate::transaction::Transaction;
use shelfdb_codec::{Key, KeyPath, KeyQuery, KeyRange, Value};
use std::fmt;
use std::sync::Arc;

/// An object store as seen through one transaction.
#[derive(Clone)]
pub struct ObjectStoreHandle {
    transaction: Arc<Transaction>,
    store: Arc<ObjectStore>,
}

impl fmt::Debug for ObjectStoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreHandle")
            .field("transaction", &self.transaction.id())
            .field("store", &self.store.name())
            .finish()
    }
}

impl ObjectStoreHandle {
    pub(crate) fn new(transaction: Arc<Transaction>, store: Arc<ObjectStore>) -> Self {
        Self { transaction, store }
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> String {
        self.store.name()
    }

    /// Returns the key path, if keys live inside values.
    #[must_use]
    pub fn key_path(&self) -> Option<KeyPath> {
        self.store.key_path().cloned()
    }

    /// Returns true if the store generates keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.store.auto_increment()
    }

    /// Returns the index names in ascending order.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.store.index_names()
    }

    /// Returns the transaction this handle belongs to.
    #[must_use]
    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }

    fn check_readable(&self) -> CoreResult<()> {
        if self.store.is_deleted() {
            return Err(CoreError::invalid_state(format!(
                "object store '{}' has been deleted",
                self.store.name()
            )));
        }
        if self.transaction.is_finished() {
            return Err(CoreError::TransactionInactive);
        }
        Ok(())
    }

    fn check_writable(&self) -> CoreResult<()> {
        self.check_readable()?;
        if !self.transaction.mode().can_write() {
            return Err(CoreError::ReadOnly);
        }
        Ok(())
    }

    fn check_key_for(&self, value: &Value, key: Option<&Key>) -> CoreResult<()> {
        match (self.store.key_path(), key) {
            (Some(_), Some(_)) => Err(CoreError::data(
                "an explicit key cannot be given to a store with a key path",
            )),
            (None, None) if !self.store.auto_increment() => Err(CoreError::data(
                "a key is required for a store without a key path or key generator",
            )),
            (Some(path), None) => match path.extract_key(value)? {
                Some(_) => Ok(()),
                None if !self.store.auto_increment() => Err(CoreError::data(format!(
                    "the value has no key at '{path}'"
                ))),
                None if !path.can_inject(value) => Err(CoreError::data(format!(
                    "a generated key cannot be stored at '{path}'"
                ))),
                None => Ok(()),
            },
            (None, Some(key)) => Ok(key.validate()?),
            _ => Ok(()),
        }
    }

    fn write(&self, value: Value, key: Option<Key>, no_overwrite: bool) -> CoreResult<Request> {
        self.check_writable()?;
        self.check_key_for(&value, key.as_ref())?;
        let store = Arc::clone(&self.store);
        self.transaction.request(move |log| {
            store
                .store_record(value, key, no_overwrite, Some(log))
                .map(Output::Key)
        })
    }

    /// Stores a value, replacing any record with the same key.
    ///
    /// # Errors
    ///
    /// - [`CoreError::TransactionInactive`] if the transaction finished.
    /// - [`CoreError::ReadOnly`] in a read-only transaction.
    /// - [`CoreError::Data`] if no valid key can be determined.
    pub fn put(&self, value: impl Into<Value>, key: Option<Key>) -> CoreResult<Request> {
        self.write(value.into(), key, false)
    }

    /// Stores a value; the request fails with a constraint error if a
    /// record already has the key.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStoreHandle::put`].
    pub fn add(&self, value: impl Into<Value>, key: Option<Key>) -> CoreResult<Request> {
        self.write(value.into(), key, true)
    }

    /// Deletes every record matching `query`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive or read-only.
    pub fn delete(&self, query: impl Into<KeyQuery>) -> CoreResult<Request> {
        self.check_writable()?;
        let query = query.into();
        query.validate()?;
        let store = Arc::clone(&self.store);
        self.transaction.request(move |log| {
            store
                .delete_record(&query, Some(log))
                .map(|_| Output::Undefined)
        })
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive or read-only.
    pub fn clear(&self) -> CoreResult<Request> {
        self.check_writable()?;
        let store = Arc::clone(&self.store);
        self.transaction
            .request(move |log| store.clear(Some(log)).map(|()| Output::Undefined))
    }

    /// Reads the value of the first record matching `query`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get(&self, query: impl Into<KeyQuery>) -> CoreResult<Request> {
        self.check_readable()?;
        let query = query.into();
        query.validate()?;
        let store = Arc::clone(&self.store);
        self.transaction.request(move |_| {
            Ok(store
                .get_value(&query)
                .map_or(Output::Undefined, Output::Value))
        })
    }

    /// Reads the key of the first record matching `query`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get_key(&self, query: impl Into<KeyQuery>) -> CoreResult<Request> {
        self.check_readable()?;
        let query = query.into();
        query.validate()?;
        let store = Arc::clone(&self.store);
        self.transaction.request(move |_| {
            Ok(store
                .get_key(&query)
                .map_or(Output::Undefined, Output::Key))
        })
    }

    /// Reads up to `count` values in `range`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get_all(&self, range: Option<KeyRange>, count: Option<u32>) -> CoreResult<Request> {
        self.check_readable()?;
        range.as_ref().map_or(Ok(()), KeyRange::validate)?;
        let store = Arc::clone(&self.store);
        self.transaction
            .request(move |_| Ok(Output::Values(store.get_all_values(range, count))))
    }

    /// Reads up to `count` keys in `range`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get_all_keys(&self, range: Option<KeyRange>, count: Option<u32>) -> CoreResult<Request> {
        self.check_readable()?;
        range.as_ref().map_or(Ok(()), KeyRange::validate)?;
        let store = Arc::clone(&self.store);
        self.transaction
            .request(move |_| Ok(Output::Keys(store.get_all_keys(range, count))))
    }

    /// Counts the records matching `query`, or all records.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn count(&self, query: Option<KeyQuery>) -> CoreResult<Request> {
        self.check_readable()?;
        query.as_ref().map_or(Ok(()), KeyQuery::validate)?;
        let store = Arc::clone(&self.store);
        self.transaction.request(move |_| {
            let range = query.map(|q| q.to_range());
            Ok(Output::Count(store.count(range.as_ref()) as u64))
        })
    }

    /// Creates an index and queues its population.
    ///
    /// If population fails, the whole version change transaction aborts.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] outside a running version change
    ///   transaction.
    /// - [`CoreError::Constraint`] if the name is taken.
    /// - [`CoreError::InvalidAccess`] for a multi-entry array key path.
    pub fn create_index(
        &self,
        name: &str,
        key_path: KeyPath,
        unique: bool,
        multi_entry: bool,
    ) -> CoreResult<IndexHandle> {
        self.check_readable()?;
        self.transaction.ensure_upgrade_running()?;
        key_path.validate()?;

        let descriptor = IndexDescriptor {
            name: name.to_string(),
            key_path,
            multi_entry,
            unique,
        };
        let index = self
            .transaction
            .with_rollback(|log| self.store.create_index(descriptor, log))?;

        let populate = Arc::clone(&index);
        self.transaction.internal(move |log| {
            populate.initialize(Some(log)).map(|()| Output::Undefined)
        })?;
        Ok(IndexHandle::new(self.clone(), index))
    }

    /// Deletes an index.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] outside a running version change
    ///   transaction.
    /// - [`CoreError::NotFound`] if there is no such index.
    pub fn delete_index(&self, name: &str) -> CoreResult<()> {
        self.check_readable()?;
        self.transaction.ensure_upgrade_running()?;
        self.transaction
            .with_rollback(|log| self.store.delete_index(name, log))
    }

    /// Opens a handle to one of the store's indexes.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the transaction has finished.
    /// - [`CoreError::NotFound`] if there is no such index.
    pub fn index(&self, name: &str) -> CoreResult<IndexHandle> {
        if self.transaction.is_finished() {
            return Err(CoreError::invalid_state("the transaction has finished"));
        }
        let index = self
            .store
            .index(name)
            .ok_or_else(|| CoreError::not_found(name))?;
        Ok(IndexHandle::new(self.clone(), index))
    }

    /// Renames the store.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] outside a running version change
    ///   transaction.
    /// - [`CoreError::Constraint`] if the name is taken.
    pub fn rename(&self, name: &str) -> CoreResult<()> {
        self.check_readable()?;
        self.transaction.ensure_upgrade_running()?;
        let database = Arc::clone(self.transaction.database());
        let current = self.store.name();
        self.transaction
            .with_rollback(|log| database.rename_object_store(&current, name, log))
    }
}

/// An index as seen through one transaction.
#[derive(Clone)]
pub struct IndexHandle {
    store: ObjectStoreHandle,
    index: Arc<Index>,
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("store", &self.store.name())
            .field("index", &self.index.name())
            .finish()
    }
}

impl IndexHandle {
    fn new(store: ObjectStoreHandle, index: Arc<Index>) -> Self {
        Self { store, index }
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> String {
        self.index.name()
    }

    /// Returns the key path index keys are read from.
    #[must_use]
    pub fn key_path(&self) -> KeyPath {
        self.index.key_path().clone()
    }

    /// Returns true if index keys must be unique.
    #[must_use]
    pub fn unique(&self) -> bool {
        self.index.unique()
    }

    /// Returns true if array values produce one entry per element.
    #[must_use]
    pub fn multi_entry(&self) -> bool {
        self.index.multi_entry()
    }

    /// Returns the owning object store handle.
    #[must_use]
    pub fn object_store(&self) -> &ObjectStoreHandle {
        &self.store
    }

    fn check_readable(&self) -> CoreResult<()> {
        self.store.check_readable()?;
        if self.store.store.index(&self.index.name()).is_none() {
            return Err(CoreError::invalid_state(format!(
                "index '{}' has been deleted",
                self.index.name()
            )));
        }
        Ok(())
    }

    /// Reads the object store value of the first entry matching `query`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get(&self, query: impl Into<KeyQuery>) -> CoreResult<Request> {
        self.check_readable()?;
        let query = query.into();
        query.validate()?;
        let index = Arc::clone(&self.index);
        self.store.transaction.request(move |_| {
            Ok(index
                .get_value(&query)?
                .map_or(Output::Undefined, Output::Value))
        })
    }

    /// Reads the primary key of the first entry matching `query`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get_key(&self, query: impl Into<KeyQuery>) -> CoreResult<Request> {
        self.check_readable()?;
        let query = query.into();
        query.validate()?;
        let index = Arc::clone(&self.index);
        self.store.transaction.request(move |_| {
            Ok(index
                .get_key(&query)
                .map_or(Output::Undefined, Output::Key))
        })
    }

    /// Reads up to `count` object store values in `range`, in index order.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get_all(&self, range: Option<KeyRange>, count: Option<u32>) -> CoreResult<Request> {
        self.check_readable()?;
        range.as_ref().map_or(Ok(()), KeyRange::validate)?;
        let index = Arc::clone(&self.index);
        self.store
            .transaction
            .request(move |_| Ok(Output::Values(index.get_all_values(range, count)?)))
    }

    /// Reads up to `count` primary keys in `range`, in index order.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn get_all_keys(&self, range: Option<KeyRange>, count: Option<u32>) -> CoreResult<Request> {
        self.check_readable()?;
        range.as_ref().map_or(Ok(()), KeyRange::validate)?;
        let index = Arc::clone(&self.index);
        self.store
            .transaction
            .request(move |_| Ok(Output::Keys(index.get_all_keys(range, count))))
    }

    /// Counts the entries matching `query`, or all entries.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is inactive.
    pub fn count(&self, query: Option<KeyQuery>) -> CoreResult<Request> {
        self.check_readable()?;
        query.as_ref().map_or(Ok(()), KeyQuery::validate)?;
        let index = Arc::clone(&self.index);
        self.store.transaction.request(move |_| {
            let range = query.map(|q| q.to_range());
            Ok(Output::Count(index.count(range.as_ref()) as u64))
        })
    }

    /// Renames the index.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] outside a running version change
    ///   transaction.
    /// - [`CoreError::Constraint`] if the name is taken.
    pub fn rename(&self, name: &str) -> CoreResult<()> {
        self.check_readable()?;
        let transaction = &self.store.transaction;
        transaction.ensure_upgrade_running()?;
        let current = self.index.name();
        transaction.with_rollback(|log| self.store.store.rename_index(&current, name, log))
    }
}
