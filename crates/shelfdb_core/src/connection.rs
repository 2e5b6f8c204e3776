//! Database connections.

use crate::catalog::StoreDescriptor;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::handle::ObjectStoreHandle;
use crate::signal::{Notifier, Signal};
use crate::transaction::Transaction;
use crate::types::{ConnectionId, TransactionMode};
use parking_lot::Mutex;
use shelfdb_codec::KeyPath;
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

#[derive(Default)]
struct ConnectionState {
    version: u64,
    close_pending: bool,
    closed: bool,
    upgrade: Option<Arc<Transaction>>,
}

/// An open connection to a database.
///
/// Connections are created by [`crate::Factory::open`]. Closing one
/// marks it close-pending at once, which unblocks opens and deletes
/// waiting on it; it becomes closed when its last transaction finishes.
pub struct Connection {
    id: ConnectionId,
    database: Arc<Database>,
    state: Mutex<ConnectionState>,
    notifier: Notifier,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, database: Arc<Database>, version: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            database,
            state: Mutex::new(ConnectionState {
                version,
                ..ConnectionState::default()
            }),
            notifier: Notifier::new(),
        })
    }

    /// Returns the connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.database.name()
    }

    /// Returns the version this connection sees.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Returns the object store names in ascending order.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.database.object_store_names()
    }

    /// Returns true once [`Connection::close`] has been called.
    #[must_use]
    pub fn is_close_pending(&self) -> bool {
        self.state.lock().close_pending
    }

    /// Returns true once the connection is closed and has no unfinished
    /// transactions.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Registers a callback for `versionchange` signals.
    pub fn listen(&self, listener: impl Fn(&Signal) + Send + Sync + 'static) {
        self.notifier.listen(listener);
    }

    /// Returns a channel receiving `versionchange` signals.
    pub fn subscribe(&self) -> Receiver<Signal> {
        self.notifier.subscribe()
    }

    /// Returns the names of the signals fired so far.
    #[must_use]
    pub fn signals(&self) -> Vec<&'static str> {
        self.notifier.history()
    }

    pub(crate) fn emit(&self, signal: Signal) {
        self.notifier.emit(signal);
    }

    pub(crate) fn set_version(&self, version: u64) {
        self.state.lock().version = version;
    }

    pub(crate) fn set_upgrade(&self, transaction: Option<Arc<Transaction>>) {
        self.state.lock().upgrade = transaction;
    }

    fn upgrade(&self) -> CoreResult<Arc<Transaction>> {
        let transaction = self
            .state
            .lock()
            .upgrade
            .clone()
            .ok_or_else(|| CoreError::invalid_state("no version change transaction is running"))?;
        transaction.ensure_upgrade_running()?;
        Ok(transaction)
    }

    /// Starts a transaction over `scope`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the connection is closing or an
    ///   upgrade is in progress.
    /// - [`CoreError::InvalidAccess`] if `scope` is empty.
    /// - [`CoreError::NotFound`] if a store in `scope` does not exist.
    /// - [`CoreError::Type`] for [`TransactionMode::VersionChange`], which
    ///   only upgrades create.
    pub fn transaction<S: Into<String>>(
        self: &Arc<Self>,
        scope: impl IntoIterator<Item = S>,
        mode: TransactionMode,
    ) -> CoreResult<Arc<Transaction>> {
        {
            let state = self.state.lock();
            if state.close_pending {
                return Err(CoreError::invalid_state("the connection is closing"));
            }
            if state.upgrade.is_some() {
                return Err(CoreError::invalid_state("a version change is in progress"));
            }
        }
        if mode == TransactionMode::VersionChange {
            return Err(CoreError::type_error(
                "version change transactions cannot be started directly",
            ));
        }

        let mut scope: Vec<String> = scope.into_iter().map(Into::into).collect();
        if scope.is_empty() {
            return Err(CoreError::invalid_access("the transaction scope is empty"));
        }
        scope.sort();
        scope.dedup();
        if let Some(missing) = scope.iter().find(|name| self.database.object_store(name).is_none()) {
            return Err(CoreError::not_found(missing.as_str()));
        }

        let transaction = Transaction::new(
            self.database.ids().next_transaction(),
            mode,
            scope,
            Arc::clone(&self.database),
            Arc::clone(self),
        );
        self.database.add_transaction(&transaction);
        Ok(transaction)
    }

    /// Creates an object store during an upgrade.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] outside a running upgrade.
    /// - [`CoreError::Syntax`] for a malformed key path.
    /// - [`CoreError::InvalidAccess`] for auto-increment with an empty or
    ///   array key path.
    /// - [`CoreError::Constraint`] if the name is taken.
    pub fn create_object_store(
        &self,
        name: &str,
        key_path: Option<KeyPath>,
        auto_increment: bool,
    ) -> CoreResult<ObjectStoreHandle> {
        let transaction = self.upgrade()?;
        if let Some(path) = &key_path {
            path.validate()?;
        }
        let unusable = match &key_path {
            Some(KeyPath::Single(path)) => path.is_empty(),
            Some(KeyPath::Sequence(_)) => true,
            None => false,
        };
        if auto_increment && unusable {
            return Err(CoreError::invalid_access(
                "auto increment needs a non-empty, non-array key path",
            ));
        }

        let descriptor = StoreDescriptor {
            name: name.to_string(),
            key_path,
            auto_increment,
        };
        let store = transaction.with_rollback(|log| self.database.create_object_store(descriptor, log))?;
        Ok(ObjectStoreHandle::new(transaction, store))
    }

    /// Deletes an object store during an upgrade.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] outside a running upgrade.
    /// - [`CoreError::NotFound`] if there is no such store.
    pub fn delete_object_store(&self, name: &str) -> CoreResult<()> {
        let transaction = self.upgrade()?;
        transaction.with_rollback(|log| self.database.delete_object_store(name, log))
    }

    /// Closes the connection.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.close_pending {
                return;
            }
            state.close_pending = true;
        }
        tracing::debug!(connection = %self.id, database = %self.database.name(), "closing connection");
        self.database.wake_waiters();
        self.check_closed();
    }

    /// Marks a close-pending connection closed once it has no unfinished
    /// transactions.
    pub(crate) fn check_closed(&self) {
        {
            let state = self.state.lock();
            if !state.close_pending || state.closed {
                return;
            }
        }
        if self.database.has_transactions_for(self.id) {
            return;
        }
        self.state.lock().closed = true;
        self.database.remove_connection(self.id);
        tracing::debug!(connection = %self.id, "connection closed");
        self.database.wake_waiters();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("database", &self.database.name())
            .field("version", &state.version)
            .field("close_pending", &state.close_pending)
            .field("closed", &state.closed)
            .finish()
    }
}
