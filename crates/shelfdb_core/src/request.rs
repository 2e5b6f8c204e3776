//! Pending results of engine operations.

use crate::connection::Connection;
use crate::error::{CoreError, CoreResult};
use crate::signal::{Notifier, Signal, VersionChange};
use parking_lot::Mutex;
use shelfdb_codec::{Key, Value};
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// The value a request resolves with.
#[derive(Clone)]
pub enum Output {
    /// No value, as returned by writes that produce nothing or lookups
    /// that find nothing.
    Undefined,
    /// A single key.
    Key(Key),
    /// A single record value.
    Value(Value),
    /// Keys in ascending order.
    Keys(Vec<Key>),
    /// Record values in ascending key order.
    Values(Vec<Value>),
    /// A record count.
    Count(u64),
    /// An open connection.
    Connection(Arc<Connection>),
}

impl Output {
    /// Returns true for [`Output::Undefined`].
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Output::Undefined)
    }

    /// Returns the key, if this is [`Output::Key`].
    #[must_use]
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Output::Key(key) => Some(key),
            _ => None,
        }
    }

    /// Returns the value, if this is [`Output::Value`].
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Output::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the keys, if this is [`Output::Keys`].
    #[must_use]
    pub fn as_keys(&self) -> Option<&[Key]> {
        match self {
            Output::Keys(keys) => Some(keys),
            _ => None,
        }
    }

    /// Returns the values, if this is [`Output::Values`].
    #[must_use]
    pub fn as_values(&self) -> Option<&[Value]> {
        match self {
            Output::Values(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the count, if this is [`Output::Count`].
    #[must_use]
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Output::Count(count) => Some(*count),
            _ => None,
        }
    }

    /// Returns the connection, if this is [`Output::Connection`].
    #[must_use]
    pub fn into_connection(self) -> Option<Arc<Connection>> {
        match self {
            Output::Connection(connection) => Some(connection),
            _ => None,
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Undefined => f.write_str("Undefined"),
            Output::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Output::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Output::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            Output::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Output::Count(count) => f.debug_tuple("Count").field(count).finish(),
            Output::Connection(connection) => {
                f.debug_tuple("Connection").field(&connection.id()).finish()
            }
        }
    }
}

type CancelHook = Box<dyn FnOnce() -> bool + Send>;

struct RequestInner {
    result: Mutex<Option<CoreResult<Output>>>,
    notifier: Notifier,
    cancel: Mutex<Option<CancelHook>>,
}

/// A handle to the eventual result of an operation.
///
/// A request starts pending and completes exactly once, firing
/// `success` or `error`. Cloning yields another handle to the same
/// request.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RequestInner {
                result: Mutex::new(None),
                notifier: Notifier::new(),
                cancel: Mutex::new(None),
            }),
        }
    }

    /// Returns true once the request has completed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.result.lock().is_some()
    }

    /// Returns the outcome, or `None` while the request is pending.
    #[must_use]
    pub fn result(&self) -> Option<CoreResult<Output>> {
        self.inner.result.lock().clone()
    }

    /// Returns the error of a failed request.
    #[must_use]
    pub fn error(&self) -> Option<CoreError> {
        match &*self.inner.result.lock() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Registers a callback for every later signal on this request.
    pub fn listen(&self, listener: impl Fn(&Signal) + Send + Sync + 'static) {
        self.inner.notifier.listen(listener);
    }

    /// Returns a channel receiving every later signal on this request.
    pub fn subscribe(&self) -> Receiver<Signal> {
        self.inner.notifier.subscribe()
    }

    /// Returns the names of the signals fired so far.
    #[must_use]
    pub fn signals(&self) -> Vec<&'static str> {
        self.inner.notifier.history()
    }

    /// Abandons a blocked open or delete.
    ///
    /// Only requests parked waiting for other connections to close can be
    /// cancelled; they fail with [`CoreError::Abort`]. Returns true if the
    /// request was cancelled.
    pub fn cancel(&self) -> bool {
        let hook = self.inner.cancel.lock().take();
        match hook {
            Some(hook) => hook(),
            None => false,
        }
    }

    pub(crate) fn set_cancel(&self, hook: impl FnOnce() -> bool + Send + 'static) {
        *self.inner.cancel.lock() = Some(Box::new(hook));
    }

    pub(crate) fn clear_cancel(&self) {
        self.inner.cancel.lock().take();
    }

    pub(crate) fn emit(&self, signal: Signal) {
        self.inner.notifier.emit(signal);
    }

    pub(crate) fn resolve(&self, output: Output) {
        self.complete(Ok(output), None);
    }

    pub(crate) fn reject(&self, error: CoreError) {
        self.complete(Err(error), None);
    }

    /// Stores the outcome and fires `success` or `error`.
    pub(crate) fn complete(&self, result: CoreResult<Output>, change: Option<VersionChange>) {
        {
            let mut slot = self.inner.result.lock();
            if slot.is_some() {
                tracing::trace!("request already completed");
                return;
            }
            *slot = Some(result.clone());
        }
        self.clear_cancel();
        match result {
            Ok(_) => self.emit(Signal::Success(change)),
            Err(err) => self.emit(Signal::Error(err)),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("result", &*self.inner.result.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_once() {
        let request = Request::new();
        assert!(!request.is_done());
        request.resolve(Output::Count(3));
        request.reject(CoreError::ReadOnly);
        assert_eq!(request.result().unwrap().unwrap().as_count(), Some(3));
        assert_eq!(request.signals(), vec!["success"]);
        assert!(request.error().is_none());
    }

    #[test]
    fn rejection_fires_error() {
        let request = Request::new();
        let rx = request.subscribe();
        request.reject(CoreError::constraint("dup"));
        assert_eq!(request.error().unwrap().name(), "ConstraintError");
        assert!(matches!(rx.try_recv().unwrap(), Signal::Error(_)));
    }

    #[test]
    fn cancel_runs_hook_once() {
        let request = Request::new();
        assert!(!request.cancel());
        let target = request.clone();
        request.set_cancel(move || {
            target.reject(CoreError::abort("cancelled"));
            true
        });
        assert!(request.cancel());
        assert!(!request.cancel());
        assert_eq!(request.error().unwrap().name(), "AbortError");
    }

    #[test]
    fn completion_drops_cancel_hook() {
        let request = Request::new();
        request.set_cancel(|| true);
        request.resolve(Output::Undefined);
        assert!(!request.cancel());
    }

    #[test]
    fn output_accessors() {
        assert!(Output::Undefined.is_undefined());
        assert_eq!(Output::Key(Key::from(1)).as_key(), Some(&Key::from(1)));
        assert_eq!(
            Output::Values(vec![Value::from("a")]).as_values(),
            Some(&[Value::from("a")][..])
        );
        assert!(Output::Count(1).into_connection().is_none());
    }
}
