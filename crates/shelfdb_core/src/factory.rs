//! Database factory and the open/delete lifecycle protocol.
//!
//! The factory owns the persistence host, the shared task queue and
//! every loaded [`Database`]. `open` and `delete_database` return a
//! [`Request`] immediately; the protocol runs as scheduled tasks, so the
//! caller drives it with [`Factory::tick`] or [`Factory::run_until_idle`].
//!
//! ```text
//! open(name, v)
//!   ├─ delete pending? ── park until settled, then retry
//!   ├─ v < current ────── VersionError
//!   ├─ v == current ───── success(connection)
//!   └─ v > current
//!        ├─ versionchange to other open connections
//!        ├─ blocked, if any stay open
//!        ├─ park until they are closed or closing
//!        └─ upgrade transaction: upgradeneeded, then success or AbortError
//! ```

use crate::catalog::Catalog;
use crate::config::Config;
use crate::connection::Connection;
use crate::database::{Database, WaitFor};
use crate::error::{CoreError, CoreResult};
use crate::request::{Output, Request};
use crate::schedule::TaskQueue;
use crate::signal::{Signal, VersionChange};
use crate::transaction::{Transaction, TransactionState};
use crate::types::{DatabaseInfo, IdSequence, TransactionMode};
use parking_lot::Mutex;
use shelfdb_codec::{Key, Value};
use shelfdb_storage::{CachedHost, FileHost, InMemoryHost, PersistenceHost};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Largest version `open` accepts.
pub const MAX_VERSION: u64 = (1 << 53) - 1;

struct FactoryInner {
    catalog: Catalog,
    config: Config,
    queue: TaskQueue,
    ids: Arc<IdSequence>,
    databases: Mutex<BTreeMap<String, Arc<Database>>>,
}

/// Entry point for opening, deleting and listing databases.
///
/// Cloning yields another handle to the same factory.
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl Factory {
    /// Creates a factory over `host`, loading every registered database.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted catalog cannot be read.
    pub fn new(host: Arc<dyn PersistenceHost>, config: Config) -> CoreResult<Self> {
        let host: Arc<dyn PersistenceHost> = if config.write_cache {
            Arc::new(CachedHost::new(host))
        } else {
            host
        };
        let catalog = Catalog::new(host);
        let queue = TaskQueue::new();
        let ids = Arc::new(IdSequence::default());

        let mut databases = BTreeMap::new();
        for (name, version) in catalog.load_registry()? {
            let database = Database::load(
                &name,
                version,
                catalog.clone(),
                queue.clone(),
                Arc::clone(&ids),
                config.verify_ordering,
            )?;
            databases.insert(name, database);
        }
        tracing::info!(databases = databases.len(), "factory ready");

        Ok(Self {
            inner: Arc::new(FactoryInner {
                catalog,
                config,
                queue,
                ids,
                databases: Mutex::new(databases),
            }),
        })
    }

    /// Creates a factory over a fresh in-memory host.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                catalog: Catalog::new(Arc::new(InMemoryHost::new())),
                config: Config::default(),
                queue: TaskQueue::new(),
                ids: Arc::new(IdSequence::default()),
                databases: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Creates a factory over a journal file, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be opened or locked, or its
    /// catalog cannot be read.
    pub fn open_path(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let host = FileHost::open_with_create_dirs(path.as_ref())?;
        Self::new(Arc::new(host), config)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the task queue that runs all engine work.
    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    /// Runs one scheduled task. Returns false if nothing was queued.
    pub fn tick(&self) -> bool {
        self.inner.queue.run_next()
    }

    /// Runs scheduled tasks until the queue drains or
    /// [`Config::max_ticks`] is reached. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        self.inner.queue.run_until_idle(self.inner.config.max_ticks)
    }

    /// Makes every write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot flush.
    pub fn flush(&self) -> CoreResult<()> {
        self.inner.catalog.host().flush()?;
        Ok(())
    }

    /// Returns a loaded database.
    #[must_use]
    pub fn database(&self, name: &str) -> Option<Arc<Database>> {
        self.inner.databases.lock().get(name).cloned()
    }

    /// Lists every database that has completed an upgrade.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseInfo> {
        self.inner
            .databases
            .lock()
            .values()
            .map(|database| DatabaseInfo {
                name: database.name().to_string(),
                version: database.version(),
            })
            .filter(|info| info.version > 0)
            .collect()
    }

    /// Compares two values as keys.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Data`] if either value is not a valid key.
    pub fn cmp(&self, a: &Value, b: &Value) -> CoreResult<Ordering> {
        let a = Key::from_value(a)?;
        let b = Key::from_value(b)?;
        Ok(a.cmp(&b))
    }

    /// Opens a connection to `name`, upgrading it to `version` if that is
    /// newer than the stored version.
    ///
    /// Without a version, opens at the current version, or 1 for a new
    /// database.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Type`] for version 0 or a version above
    /// [`MAX_VERSION`]. Every later failure is reported on the request.
    pub fn open(&self, name: &str, version: Option<u64>) -> CoreResult<Request> {
        if let Some(version) = version {
            if version == 0 || version > MAX_VERSION {
                return Err(CoreError::type_error(format!(
                    "version must be between 1 and {MAX_VERSION}, got {version}"
                )));
            }
        }
        let request = Request::new();
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let pending = request.clone();
        self.inner
            .queue
            .enqueue(move || inner.run_open(name, version, pending));
        Ok(request)
    }

    /// Deletes `name` once every connection to it has closed.
    ///
    /// Deleting a missing database succeeds.
    pub fn delete_database(&self, name: &str) -> Request {
        let request = Request::new();
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let pending = request.clone();
        self.inner
            .queue
            .enqueue(move || inner.run_delete(name, pending));
        request
    }
}

impl FactoryInner {
    fn database(&self, name: &str) -> Arc<Database> {
        let mut databases = self.databases.lock();
        let database = databases.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(database = %name, "creating database");
            Database::create(
                name,
                self.catalog.clone(),
                self.queue.clone(),
                Arc::clone(&self.ids),
                self.config.verify_ordering,
            )
        });
        Arc::clone(database)
    }

    fn forget(&self, database: &Arc<Database>) {
        if let Err(err) = database.purge() {
            tracing::warn!(database = %database.name(), error = %err, "failed to purge database");
        }
        let mut databases = self.databases.lock();
        if databases
            .get(database.name())
            .is_some_and(|current| Arc::ptr_eq(current, database))
        {
            databases.remove(database.name());
        }
    }

    /// Lets `request` abandon the parked waiter `waiter`.
    fn cancellable(
        request: &Request,
        database: &Arc<Database>,
        waiter: u64,
        on_cancel: impl FnOnce() + Send + 'static,
    ) {
        let database = Arc::clone(database);
        let cancelled = request.clone();
        request.set_cancel(move || {
            if !database.cancel_waiter(waiter) {
                return false;
            }
            tracing::debug!(database = %database.name(), waiter, "request cancelled");
            on_cancel();
            cancelled.reject(CoreError::abort("the request was cancelled"));
            true
        });
    }

    fn run_open(self: &Arc<Self>, name: String, version: Option<u64>, request: Request) {
        let database = self.database(&name);
        if database.is_delete_pending() {
            tracing::debug!(database = %name, "open waits for pending delete");
            let this = Arc::clone(self);
            let retry = request.clone();
            let waiter = database.wait_until(WaitFor::DeleteSettled, move || {
                this.run_open(name, version, retry);
            });
            Self::cancellable(&request, &database, waiter, || {});
            return;
        }

        let current = database.version();
        let requested = version.unwrap_or(current.max(1));
        if requested < current {
            request.reject(CoreError::Version { requested, current });
            return;
        }

        let connection = Connection::new(self.ids.next_connection(), Arc::clone(&database), current);
        database.add_connection(Arc::clone(&connection));
        if requested == current {
            tracing::debug!(database = %name, connection = %connection.id(), version = current, "opened");
            request.resolve(Output::Connection(connection));
            return;
        }

        let change = VersionChange {
            old_version: current,
            new_version: Some(requested),
        };
        for other in database.open_connections(Some(connection.id())) {
            other.emit(Signal::VersionChange(change));
        }
        if !database.open_connections(Some(connection.id())).is_empty() {
            tracing::debug!(database = %name, requested, "open blocked");
            request.emit(Signal::Blocked(change));
        }

        let this = Arc::clone(self);
        let target = Arc::clone(&database);
        let opening = Arc::clone(&connection);
        let pending = request.clone();
        let waiter = database.wait_until(WaitFor::OthersClosing(connection.id()), move || {
            this.run_upgrade(&target, opening, requested, pending);
        });
        Self::cancellable(&request, &database, waiter, move || connection.close());
    }

    fn run_upgrade(
        self: &Arc<Self>,
        database: &Arc<Database>,
        connection: Arc<Connection>,
        requested: u64,
        request: Request,
    ) {
        request.clear_cancel();
        let old = database.version();
        if requested < old {
            connection.close();
            request.reject(CoreError::Version {
                requested,
                current: old,
            });
            return;
        }
        if let Err(err) = database.set_version(requested) {
            connection.close();
            request.reject(err);
            return;
        }
        connection.set_version(requested);
        tracing::debug!(database = %database.name(), old, new = requested, "upgrading");

        let transaction = Transaction::new(
            self.ids.next_transaction(),
            TransactionMode::VersionChange,
            database.object_store_names(),
            Arc::clone(database),
            Arc::clone(&connection),
        );
        transaction.with_rollback(|log| {
            let database = Arc::clone(database);
            let connection = Arc::clone(&connection);
            log.push(move || {
                connection.set_version(old);
                database.set_version(old)
            });
        });
        connection.set_upgrade(Some(Arc::clone(&transaction)));

        let change = VersionChange {
            old_version: old,
            new_version: Some(requested),
        };
        {
            let request = request.clone();
            let connection = Arc::clone(&connection);
            transaction.on_start(move |transaction| {
                request.emit(Signal::UpgradeNeeded {
                    change,
                    connection,
                    transaction: Arc::clone(transaction),
                });
            });
        }
        {
            let this = Arc::clone(self);
            let database = Arc::clone(database);
            transaction.on_finish(move |_, outcome| {
                this.finish_upgrade(&database, connection, old, outcome, request);
            });
        }
        database.add_transaction(&transaction);
    }

    fn finish_upgrade(
        &self,
        database: &Arc<Database>,
        connection: Arc<Connection>,
        old: u64,
        outcome: TransactionState,
        request: Request,
    ) {
        connection.set_upgrade(None);
        match outcome {
            TransactionState::Committed if !connection.is_close_pending() => {
                tracing::debug!(database = %database.name(), version = connection.version(), "upgrade complete");
                request.resolve(Output::Connection(connection));
            }
            TransactionState::Committed => {
                request.reject(CoreError::abort(
                    "the connection was closed before the upgrade finished",
                ));
            }
            _ => {
                tracing::debug!(database = %database.name(), "upgrade aborted");
                connection.close();
                if old == 0 && database.connection_count() == 0 {
                    self.forget(database);
                }
                request.reject(CoreError::abort("the upgrade transaction was aborted"));
            }
        }
    }

    fn run_delete(self: &Arc<Self>, name: String, request: Request) {
        let Some(database) = self.databases.lock().get(&name).cloned() else {
            request.complete(
                Ok(Output::Undefined),
                Some(VersionChange {
                    old_version: 0,
                    new_version: None,
                }),
            );
            return;
        };

        if database.is_delete_pending() {
            let this = Arc::clone(self);
            let retry = request.clone();
            let waiter = database.wait_until(WaitFor::DeleteSettled, move || {
                this.run_delete(name, retry);
            });
            Self::cancellable(&request, &database, waiter, || {});
            return;
        }

        let change = VersionChange {
            old_version: database.version(),
            new_version: None,
        };
        database.set_delete_pending(true);
        for connection in database.open_connections(None) {
            connection.emit(Signal::VersionChange(change));
        }
        if !database.open_connections(None).is_empty() {
            tracing::debug!(database = %name, "delete blocked");
            request.emit(Signal::Blocked(change));
        }

        let this = Arc::clone(self);
        let target = Arc::clone(&database);
        let pending = request.clone();
        let waiter = database.wait_until(WaitFor::Drained, move || {
            this.finish_delete(&target, change, pending);
        });
        let settled = Arc::clone(&database);
        Self::cancellable(&request, &database, waiter, move || {
            settled.set_delete_pending(false);
            settled.wake_waiters();
        });
    }

    fn finish_delete(&self, database: &Arc<Database>, change: VersionChange, request: Request) {
        request.clear_cancel();
        let purged = database.purge();
        {
            let mut databases = self.databases.lock();
            if databases
                .get(database.name())
                .is_some_and(|current| Arc::ptr_eq(current, database))
            {
                databases.remove(database.name());
            }
        }
        database.set_delete_pending(false);
        database.wake_waiters();

        match purged {
            Ok(()) => {
                tracing::debug!(database = %database.name(), "deleted");
                request.complete(Ok(Output::Undefined), Some(change));
            }
            Err(err) => request.reject(err),
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("config", &self.inner.config)
            .field("databases", &self.inner.databases.lock().keys().collect::<Vec<_>>())
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}
