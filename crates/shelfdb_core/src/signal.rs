//! Named signals fired on connections, requests and transactions.
//!
//! Every handle that can be observed owns a [`Notifier`]. Signals are
//! delivered two ways:
//!
//! - **Listeners** registered with [`Notifier::listen`] run synchronously,
//!   inside the scheduler step that fired the signal. A listener may call
//!   back into the engine, for example to create object stores while an
//!   `upgradeneeded` signal is being handled.
//! - **Subscribers** obtained from [`Notifier::subscribe`] receive a clone
//!   of every later signal over a channel.
//!
//! Delivery order matches emission order, which follows the task queue.

use crate::connection::Connection;
use crate::error::CoreError;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Version numbers carried by `versionchange`, `blocked` and delete
/// completion signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    /// Version before the change.
    pub old_version: u64,
    /// Version after the change, or `None` when the database is deleted.
    pub new_version: Option<u64>,
}

/// A signal fired on an engine handle.
#[derive(Clone)]
pub enum Signal {
    /// Another connection wants to upgrade or delete the database.
    VersionChange(VersionChange),
    /// An open or delete is waiting for other connections to close.
    Blocked(VersionChange),
    /// An upgrade transaction has started.
    UpgradeNeeded {
        /// Versions involved in the upgrade.
        change: VersionChange,
        /// The connection being opened.
        connection: Arc<Connection>,
        /// The version change transaction.
        transaction: Arc<Transaction>,
    },
    /// A request completed; delete requests carry the old version.
    Success(Option<VersionChange>),
    /// A request failed.
    Error(CoreError),
    /// A transaction committed.
    Complete,
    /// A transaction aborted.
    Abort,
}

impl Signal {
    /// Returns the signal's event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Signal::VersionChange(_) => "versionchange",
            Signal::Blocked(_) => "blocked",
            Signal::UpgradeNeeded { .. } => "upgradeneeded",
            Signal::Success(_) => "success",
            Signal::Error(_) => "error",
            Signal::Complete => "complete",
            Signal::Abort => "abort",
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::VersionChange(change) => f.debug_tuple("VersionChange").field(change).finish(),
            Signal::Blocked(change) => f.debug_tuple("Blocked").field(change).finish(),
            Signal::UpgradeNeeded {
                change,
                connection,
                transaction,
            } => f
                .debug_struct("UpgradeNeeded")
                .field("change", change)
                .field("connection", &connection.id())
                .field("transaction", &transaction.id())
                .finish(),
            Signal::Success(change) => f.debug_tuple("Success").field(change).finish(),
            Signal::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Signal::Complete => f.write_str("Complete"),
            Signal::Abort => f.write_str("Abort"),
        }
    }
}

/// Callback invoked for every signal.
pub type Listener = Arc<dyn Fn(&Signal) + Send + Sync>;

const MAX_HISTORY: usize = 256;

/// Distributes signals to listeners and subscribers.
pub struct Notifier {
    listeners: RwLock<Vec<Listener>>,
    subscribers: RwLock<Vec<Sender<Signal>>>,
    history: RwLock<Vec<&'static str>>,
}

impl Notifier {
    /// Creates a notifier with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Registers a callback for every later signal.
    pub fn listen(&self, listener: impl Fn(&Signal) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Returns a channel receiving every later signal.
    pub fn subscribe(&self) -> Receiver<Signal> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Returns the names of recently fired signals, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<&'static str> {
        self.history.read().clone()
    }

    /// Fires `signal`.
    ///
    /// Listeners run with no notifier lock held, so they may register
    /// further listeners or fire further signals.
    pub fn emit(&self, signal: Signal) {
        {
            let mut history = self.history.write();
            history.push(signal.name());
            if history.len() > MAX_HISTORY {
                let excess = history.len() - MAX_HISTORY;
                history.drain(0..excess);
            }
        }

        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(&signal);
        }

        self.subscribers
            .write()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.read().len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
