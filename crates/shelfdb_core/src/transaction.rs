//! Transactions and their request queues.
//!
//! A transaction moves through `Pending -> Running -> Committed | Aborted`.
//! Its database promotes it to running once every transaction admitted
//! before it has finished. While running, the transaction executes one
//! queued request per scheduler tick and commits when the queue is empty.
//!
//! Writes push undo actions onto the transaction's [`RollbackLog`].
//! Aborting runs the log immediately; pending requests then fail with
//! [`CoreError::Abort`] and `abort` fires on a later tick.

use crate::connection::Connection;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::handle::ObjectStoreHandle;
use crate::request::{Output, Request};
use crate::rollback::RollbackLog;
use crate::signal::{Notifier, Signal};
use crate::types::{TransactionId, TransactionMode};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Waiting for earlier transactions to finish.
    Pending,
    /// Executing requests.
    Running,
    /// Finished successfully.
    Committed,
    /// Finished by abort; all writes were rolled back.
    Aborted,
}

impl TransactionState {
    /// Returns true for the terminal states.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

pub(crate) type Operation = Box<dyn FnOnce(&mut RollbackLog) -> CoreResult<Output> + Send>;
type StartHook = Box<dyn FnOnce(&Arc<Transaction>) + Send>;
type FinishHook = Box<dyn FnOnce(&Arc<Transaction>, TransactionState) + Send>;

struct Queued {
    /// `None` for internal work whose failure aborts the transaction.
    request: Option<Request>,
    operation: Operation,
}

/// A unit of atomic work against one database.
pub struct Transaction {
    id: TransactionId,
    mode: TransactionMode,
    scope: Vec<String>,
    database: Arc<Database>,
    connection: Arc<Connection>,
    state: Mutex<TransactionState>,
    requests: Mutex<VecDeque<Queued>>,
    rollback: Mutex<RollbackLog>,
    error: Mutex<Option<CoreError>>,
    notifier: Notifier,
    on_start: Mutex<Vec<StartHook>>,
    on_finish: Mutex<Vec<FinishHook>>,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        mode: TransactionMode,
        scope: Vec<String>,
        database: Arc<Database>,
        connection: Arc<Connection>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            mode,
            scope,
            database,
            connection,
            state: Mutex::new(TransactionState::Pending),
            requests: Mutex::new(VecDeque::new()),
            rollback: Mutex::new(RollbackLog::new()),
            error: Mutex::new(None),
            notifier: Notifier::new(),
            on_start: Mutex::new(Vec::new()),
            on_finish: Mutex::new(Vec::new()),
        })
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the object store names this transaction may use.
    ///
    /// A version change transaction may use every store of its database,
    /// including stores it creates.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        match self.mode {
            TransactionMode::VersionChange => self.database.object_store_names(),
            _ => self.scope.clone(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Returns true once the transaction committed or aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Returns the reason an aborted transaction aborted.
    #[must_use]
    pub fn error(&self) -> Option<CoreError> {
        self.error.lock().clone()
    }

    /// Returns the connection that created this transaction.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub(crate) fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Registers a callback for `complete` and `abort`.
    pub fn listen(&self, listener: impl Fn(&Signal) + Send + Sync + 'static) {
        self.notifier.listen(listener);
    }

    /// Returns a channel receiving `complete` and `abort`.
    pub fn subscribe(&self) -> Receiver<Signal> {
        self.notifier.subscribe()
    }

    /// Returns the names of the signals fired so far.
    #[must_use]
    pub fn signals(&self) -> Vec<&'static str> {
        self.notifier.history()
    }

    /// Opens a handle to an object store in scope.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the transaction has finished.
    /// - [`CoreError::NotFound`] if the store is out of scope or missing.
    pub fn object_store(self: &Arc<Self>, name: &str) -> CoreResult<ObjectStoreHandle> {
        if self.is_finished() {
            return Err(CoreError::invalid_state("the transaction has finished"));
        }
        if self.mode != TransactionMode::VersionChange && !self.scope.iter().any(|s| s == name) {
            return Err(CoreError::not_found(name));
        }
        let store = self
            .database
            .object_store(name)
            .ok_or_else(|| CoreError::not_found(name))?;
        Ok(ObjectStoreHandle::new(Arc::clone(self), store))
    }

    /// Aborts the transaction, undoing every write it made.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the transaction has already
    /// finished.
    pub fn abort(self: &Arc<Self>) -> CoreResult<()> {
        self.abort_with(CoreError::abort("the transaction was aborted"))
    }

    pub(crate) fn abort_with(self: &Arc<Self>, error: CoreError) -> CoreResult<()> {
        {
            let mut state = self.state.lock();
            if state.is_finished() {
                return Err(CoreError::invalid_state("the transaction has finished"));
            }
            *state = TransactionState::Aborted;
        }
        tracing::debug!(transaction = %self.id, error = %error, "aborting transaction");
        *self.error.lock() = Some(error);

        let log = std::mem::take(&mut *self.rollback.lock());
        let failed = log.rollback();
        if failed > 0 {
            tracing::error!(transaction = %self.id, failed, "rollback left changes behind");
        }

        let pending: Vec<Queued> = self.requests.lock().drain(..).collect();
        let this = Arc::clone(self);
        self.database.queue().enqueue(move || {
            for queued in pending {
                if let Some(request) = queued.request {
                    request.reject(CoreError::abort("the transaction was aborted"));
                }
            }
            this.notifier.emit(Signal::Abort);
            this.finish(TransactionState::Aborted);
        });
        Ok(())
    }

    /// Queues an operation whose outcome is reported on a new request.
    pub(crate) fn request(
        &self,
        operation: impl FnOnce(&mut RollbackLog) -> CoreResult<Output> + Send + 'static,
    ) -> CoreResult<Request> {
        if self.is_finished() {
            return Err(CoreError::TransactionInactive);
        }
        let request = Request::new();
        self.requests.lock().push_back(Queued {
            request: Some(request.clone()),
            operation: Box::new(operation),
        });
        Ok(request)
    }

    /// Queues engine work whose failure aborts the transaction.
    pub(crate) fn internal(
        &self,
        operation: impl FnOnce(&mut RollbackLog) -> CoreResult<Output> + Send + 'static,
    ) -> CoreResult<()> {
        if self.is_finished() {
            return Err(CoreError::TransactionInactive);
        }
        self.requests.lock().push_back(Queued {
            request: None,
            operation: Box::new(operation),
        });
        Ok(())
    }

    /// Runs `f` with the transaction's rollback log.
    pub(crate) fn with_rollback<R>(&self, f: impl FnOnce(&mut RollbackLog) -> R) -> R {
        f(&mut self.rollback.lock())
    }

    /// Fails unless this is a running version change transaction.
    pub(crate) fn ensure_upgrade_running(&self) -> CoreResult<()> {
        if self.mode != TransactionMode::VersionChange {
            return Err(CoreError::invalid_state(
                "schema changes need a version change transaction",
            ));
        }
        if self.state() != TransactionState::Running {
            return Err(CoreError::invalid_state(
                "the version change transaction is not running",
            ));
        }
        Ok(())
    }

    pub(crate) fn on_start(&self, hook: impl FnOnce(&Arc<Transaction>) + Send + 'static) {
        self.on_start.lock().push(Box::new(hook));
    }

    pub(crate) fn on_finish(
        &self,
        hook: impl FnOnce(&Arc<Transaction>, TransactionState) + Send + 'static,
    ) {
        self.on_finish.lock().push(Box::new(hook));
    }

    /// Moves a pending transaction to running.
    pub(crate) fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state != TransactionState::Pending {
                return;
            }
            *state = TransactionState::Running;
        }
        tracing::debug!(transaction = %self.id, mode = %self.mode, "transaction started");

        let hooks = std::mem::take(&mut *self.on_start.lock());
        for hook in hooks {
            hook(self);
        }
        self.schedule_step();
    }

    fn schedule_step(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.database.queue().enqueue(move || this.step());
    }

    fn step(self: &Arc<Self>) {
        if self.state() != TransactionState::Running {
            return;
        }
        let next = self.requests.lock().pop_front();
        let Some(Queued { request, operation }) = next else {
            self.commit();
            return;
        };

        let result = {
            let mut log = self.rollback.lock();
            operation(&mut log)
        };
        match (request, result) {
            (Some(request), Ok(output)) => request.resolve(output),
            (Some(request), Err(err)) => {
                tracing::debug!(transaction = %self.id, error = %err, "request failed");
                request.reject(err);
            }
            (None, Ok(_)) => {}
            (None, Err(err)) => {
                tracing::warn!(transaction = %self.id, error = %err, "internal step failed");
                // The transaction may already be finished if a listener aborted it.
                let _ = self.abort_with(err);
            }
        }

        if self.state() == TransactionState::Running {
            self.schedule_step();
        }
    }

    fn commit(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state != TransactionState::Running {
                return;
            }
            *state = TransactionState::Committed;
        }
        drop(std::mem::take(&mut *self.rollback.lock()));
        tracing::debug!(transaction = %self.id, "transaction committed");
        self.notifier.emit(Signal::Complete);
        self.finish(TransactionState::Committed);
    }

    fn finish(self: &Arc<Self>, outcome: TransactionState) {
        self.database.finish_transaction(self);
        let hooks = std::mem::take(&mut *self.on_finish.lock());
        for hook in hooks {
            hook(self, outcome);
        }
        self.connection.check_closed();
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("scope", &self.scope)
            .field("state", &self.state())
            .field("queued", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}
