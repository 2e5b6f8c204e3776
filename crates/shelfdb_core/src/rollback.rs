//! Undo log for aborting transactions.

use crate::error::CoreResult;
use std::fmt;

/// A deferred action that reverses one mutation.
pub type UndoAction = Box<dyn FnOnce() -> CoreResult<()> + Send>;

/// Ordered undo actions accumulated by one transaction's writes.
///
/// Every mutation performed while a log is active pushes an action that
/// fully reverses its visible effect, index entries included. Rolling back
/// runs the actions newest first.
#[derive(Default)]
pub struct RollbackLog {
    actions: Vec<UndoAction>,
}

impl RollbackLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an undo action.
    pub fn push(&mut self, action: impl FnOnce() -> CoreResult<()> + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Appends every action of `other`, keeping their order.
    pub fn extend(&mut self, other: RollbackLog) {
        self.actions.extend(other.actions);
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if there is nothing to undo.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every action in reverse insertion order.
    ///
    /// A failing action is logged and does not stop the remaining ones.
    /// Returns the number of actions that failed.
    pub fn rollback(self) -> usize {
        let total = self.actions.len();
        let mut failed = 0;
        for action in self.actions.into_iter().rev() {
            if let Err(err) = action() {
                failed += 1;
                tracing::error!(error = %err, "undo action failed");
            }
        }
        tracing::trace!(total, failed, "rolled back");
        failed
    }
}

impl fmt::Debug for RollbackLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackLog")
            .field("actions", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn runs_in_reverse_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut log = RollbackLog::new();
        for i in 0..3 {
            let trace = Arc::clone(&trace);
            log.push(move || {
                trace.lock().push(i);
                Ok(())
            });
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.rollback(), 0);
        assert_eq!(*trace.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn failures_do_not_stop_rollback() {
        let ran = Arc::new(Mutex::new(0));
        let mut log = RollbackLog::new();
        {
            let ran = Arc::clone(&ran);
            log.push(move || {
                *ran.lock() += 1;
                Ok(())
            });
        }
        log.push(|| Err(CoreError::invalid_state("boom")));
        assert_eq!(log.rollback(), 1);
        assert_eq!(*ran.lock(), 1);
    }

    #[test]
    fn extend_appends_after_existing() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut outer = RollbackLog::new();
        let mut inner = RollbackLog::new();
        {
            let trace = Arc::clone(&trace);
            outer.push(move || {
                trace.lock().push("outer");
                Ok(())
            });
        }
        {
            let trace = Arc::clone(&trace);
            inner.push(move || {
                trace.lock().push("inner");
                Ok(())
            });
        }
        outer.extend(inner);
        outer.rollback();
        assert_eq!(*trace.lock(), vec!["inner", "outer"]);
    }
}
