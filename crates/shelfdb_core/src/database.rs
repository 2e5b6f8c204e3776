//! Databases and transaction scheduling.

use crate::catalog::{Catalog, StoreDescriptor};
use crate::connection::Connection;
use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStore;
use crate::rollback::RollbackLog;
use crate::schedule::TaskQueue;
use crate::transaction::Transaction;
use crate::types::{ConnectionId, IdSequence};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A condition a parked open or delete waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitFor {
    /// Every connection except the given one is closed or closing.
    OthersClosing(ConnectionId),
    /// Every connection is closed or closing and no transaction remains.
    Drained,
    /// No delete is pending.
    DeleteSettled,
}

struct Waiter {
    id: u64,
    condition: WaitFor,
    resume: Box<dyn FnOnce() + Send>,
}

struct DatabaseState {
    version: u64,
    stores: BTreeMap<String, Arc<ObjectStore>>,
    connections: Vec<Arc<Connection>>,
    /// Unfinished transactions in admission order; only the front runs.
    transactions: VecDeque<Arc<Transaction>>,
    delete_pending: bool,
    waiters: Vec<Waiter>,
}

impl DatabaseState {
    fn holds(&self, condition: WaitFor) -> bool {
        match condition {
            WaitFor::OthersClosing(except) => self
                .connections
                .iter()
                .filter(|c| c.id() != except)
                .all(|c| c.is_close_pending()),
            WaitFor::Drained => {
                self.transactions.is_empty()
                    && self.connections.iter().all(|c| c.is_close_pending())
            }
            WaitFor::DeleteSettled => !self.delete_pending,
        }
    }
}

/// A named database: its object stores, version, live connections and
/// transaction queue.
///
/// A database admits at most one running transaction. Transactions start
/// in the order they were created, whatever their mode.
pub struct Database {
    /// Database name.
    name: String,
    /// Metadata persistence.
    catalog: Catalog,
    /// Shared scheduler queue.
    queue: TaskQueue,
    /// Connection and transaction ID source.
    ids: Arc<IdSequence>,
    /// Whether record stores check ordering on every mutation.
    verify_ordering: bool,
    /// Mutable state.
    state: Mutex<DatabaseState>,
    /// Next waiter ID.
    next_waiter: AtomicU64,
}

impl Database {
    pub(crate) fn create(
        name: &str,
        catalog: Catalog,
        queue: TaskQueue,
        ids: Arc<IdSequence>,
        verify_ordering: bool,
    ) -> Arc<Self> {
        Self::with_state(name, catalog, queue, ids, verify_ordering, 0, BTreeMap::new())
    }

    /// Loads a registered database and its object stores.
    pub(crate) fn load(
        name: &str,
        version: u64,
        catalog: Catalog,
        queue: TaskQueue,
        ids: Arc<IdSequence>,
        verify_ordering: bool,
    ) -> CoreResult<Arc<Self>> {
        let mut stores = BTreeMap::new();
        for descriptor in catalog.load_stores(name)? {
            let store = ObjectStore::open(name, descriptor, &catalog, verify_ordering)?;
            stores.insert(store.name(), store);
        }
        tracing::debug!(database = %name, version, stores = stores.len(), "loaded database");
        Ok(Self::with_state(
            name,
            catalog,
            queue,
            ids,
            verify_ordering,
            version,
            stores,
        ))
    }

    fn with_state(
        name: &str,
        catalog: Catalog,
        queue: TaskQueue,
        ids: Arc<IdSequence>,
        verify_ordering: bool,
        version: u64,
        stores: BTreeMap<String, Arc<ObjectStore>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            catalog,
            queue,
            ids,
            verify_ordering,
            state: Mutex::new(DatabaseState {
                version,
                stores,
                connections: Vec::new(),
                transactions: VecDeque::new(),
                delete_pending: false,
                waiters: Vec::new(),
            }),
            next_waiter: AtomicU64::new(1),
        })
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current version; `0` until the first upgrade.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Returns the object store names in ascending order.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.state.lock().stores.keys().cloned().collect()
    }

    /// Returns the named object store.
    #[must_use]
    pub fn object_store(&self, name: &str) -> Option<Arc<ObjectStore>> {
        self.state.lock().stores.get(name).cloned()
    }

    /// Returns the number of connections not yet closed.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Returns the number of unfinished transactions.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    /// Returns true while a delete waits for connections to close.
    #[must_use]
    pub fn is_delete_pending(&self) -> bool {
        self.state.lock().delete_pending
    }

    pub(crate) fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub(crate) fn ids(&self) -> &IdSequence {
        &self.ids
    }

    pub(crate) fn set_version(&self, version: u64) -> CoreResult<()> {
        self.state.lock().version = version;
        self.catalog.put_version(&self.name, version)
    }

    pub(crate) fn set_delete_pending(&self, pending: bool) {
        self.state.lock().delete_pending = pending;
    }

    pub(crate) fn add_connection(&self, connection: Arc<Connection>) {
        self.state.lock().connections.push(connection);
    }

    pub(crate) fn remove_connection(&self, id: ConnectionId) {
        self.state.lock().connections.retain(|c| c.id() != id);
    }

    /// Returns the connections that are not closing, except `except`.
    pub(crate) fn open_connections(&self, except: Option<ConnectionId>) -> Vec<Arc<Connection>> {
        self.state
            .lock()
            .connections
            .iter()
            .filter(|c| Some(c.id()) != except && !c.is_close_pending())
            .cloned()
            .collect()
    }

    pub(crate) fn has_transactions_for(&self, connection: ConnectionId) -> bool {
        self.state
            .lock()
            .transactions
            .iter()
            .any(|t| t.connection().id() == connection)
    }

    /// Admits a transaction behind every unfinished one.
    pub(crate) fn add_transaction(self: &Arc<Self>, transaction: &Arc<Transaction>) {
        self.state
            .lock()
            .transactions
            .push_back(Arc::clone(transaction));
        tracing::trace!(
            database = %self.name,
            transaction = %transaction.id(),
            "transaction admitted"
        );
        self.schedule_promote();
    }

    /// Drops a finished transaction and lets the next one start.
    pub(crate) fn finish_transaction(self: &Arc<Self>, transaction: &Arc<Transaction>) {
        self.state
            .lock()
            .transactions
            .retain(|t| !Arc::ptr_eq(t, transaction));
        self.schedule_promote();
        self.wake_waiters();
    }

    fn schedule_promote(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.queue.enqueue(move || {
            let front = this.state.lock().transactions.front().cloned();
            if let Some(transaction) = front {
                transaction.start();
            }
        });
    }

    /// Parks `resume` until `condition` holds. Returns the waiter ID.
    ///
    /// There is no timeout; see [`Database::cancel_waiter`].
    pub(crate) fn wait_until(
        &self,
        condition: WaitFor,
        resume: impl FnOnce() + Send + 'static,
    ) -> u64 {
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        self.state.lock().waiters.push(Waiter {
            id,
            condition,
            resume: Box::new(resume),
        });
        tracing::trace!(database = %self.name, waiter = id, ?condition, "parked waiter");
        self.wake_waiters();
        id
    }

    /// Removes a parked waiter. Returns false if it already resumed.
    pub(crate) fn cancel_waiter(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.waiters.len();
        state.waiters.retain(|w| w.id != id);
        state.waiters.len() != before
    }

    /// Schedules every waiter whose condition now holds.
    pub(crate) fn wake_waiters(&self) {
        let ready: Vec<Waiter> = {
            let mut state = self.state.lock();
            let waiters = std::mem::take(&mut state.waiters);
            let (ready, parked): (Vec<Waiter>, Vec<Waiter>) =
                waiters.into_iter().partition(|w| state.holds(w.condition));
            state.waiters = parked;
            ready
        };
        for waiter in ready {
            tracing::trace!(database = %self.name, waiter = waiter.id, "waking waiter");
            self.queue.enqueue(waiter.resume);
        }
    }

    pub(crate) fn create_object_store(
        self: &Arc<Self>,
        descriptor: StoreDescriptor,
        log: &mut RollbackLog,
    ) -> CoreResult<Arc<ObjectStore>> {
        let name = descriptor.name.clone();
        if self.state.lock().stores.contains_key(&name) {
            return Err(CoreError::constraint(format!(
                "object store '{name}' already exists"
            )));
        }
        let store = ObjectStore::open(&self.name, descriptor, &self.catalog, self.verify_ordering)?;
        self.state
            .lock()
            .stores
            .insert(name.clone(), Arc::clone(&store));
        self.persist_schema()?;

        let database = Arc::clone(self);
        let created = Arc::clone(&store);
        log.push(move || {
            database.state.lock().stores.remove(&created.name());
            created.set_deleted(true);
            created.clear(None)?;
            database.catalog.remove_store_meta(&database.name, &created.name())?;
            database.persist_schema()
        });

        tracing::debug!(database = %self.name, store = %name, "created object store");
        Ok(store)
    }

    pub(crate) fn delete_object_store(
        self: &Arc<Self>,
        name: &str,
        log: &mut RollbackLog,
    ) -> CoreResult<()> {
        let store = self
            .state
            .lock()
            .stores
            .remove(name)
            .ok_or_else(|| CoreError::not_found(name))?;
        store.clear(Some(&mut *log))?;
        store.set_deleted(true);
        self.catalog.remove_store_meta(&self.name, name)?;
        self.persist_schema()?;

        let database = Arc::clone(self);
        log.push(move || {
            store.set_deleted(false);
            store.persist_indexes()?;
            if let Some(current) = store.generator_current() {
                database
                    .catalog
                    .save_generator(&database.name, &store.name(), current)?;
            }
            database
                .state
                .lock()
                .stores
                .insert(store.name(), Arc::clone(&store));
            database.persist_schema()
        });

        tracing::debug!(database = %self.name, store = %name, "deleted object store");
        Ok(())
    }

    pub(crate) fn rename_object_store(
        self: &Arc<Self>,
        from: &str,
        to: &str,
        log: &mut RollbackLog,
    ) -> CoreResult<()> {
        if from == to {
            return Ok(());
        }
        self.move_store(from, to)?;
        let database = Arc::clone(self);
        let (from, to) = (from.to_string(), to.to_string());
        log.push(move || database.move_store(&to, &from));
        Ok(())
    }

    fn move_store(&self, from: &str, to: &str) -> CoreResult<()> {
        let store = {
            let mut state = self.state.lock();
            if state.stores.contains_key(to) {
                return Err(CoreError::constraint(format!(
                    "object store '{to}' already exists"
                )));
            }
            state
                .stores
                .remove(from)
                .ok_or_else(|| CoreError::not_found(from))?
        };
        store.relocate(to)?;
        self.state.lock().stores.insert(to.to_string(), store);
        self.persist_schema()
    }

    fn persist_schema(&self) -> CoreResult<()> {
        let descriptors: Vec<StoreDescriptor> = self
            .state
            .lock()
            .stores
            .values()
            .map(|store| store.descriptor())
            .collect();
        self.catalog.save_stores(&self.name, &descriptors)
    }

    /// Removes every record and all metadata of this database.
    pub(crate) fn purge(&self) -> CoreResult<()> {
        let stores: Vec<Arc<ObjectStore>> = {
            let mut state = self.state.lock();
            state.version = 0;
            std::mem::take(&mut state.stores).into_values().collect()
        };
        for store in &stores {
            store.clear(None)?;
            store.set_deleted(true);
            self.catalog.remove_store_meta(&self.name, &store.name())?;
        }
        self.catalog.remove_database(&self.name)?;
        tracing::debug!(database = %self.name, stores = stores.len(), "purged database");
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &state.version)
            .field("stores", &state.stores.keys().collect::<Vec<_>>())
            .field("connections", &state.connections.len())
            .field("transactions", &state.transactions.len())
            .field("delete_pending", &state.delete_pending)
            .finish()
    }
}
