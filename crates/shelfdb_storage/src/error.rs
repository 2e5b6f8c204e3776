//! Error types for persistence host operations.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Errors that can occur while talking to a persistence host.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The host's backing file is corrupted.
    #[error("host journal corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the host's backing file.
    #[error("host locked: another process has exclusive access to {path}")]
    Locked {
        /// Path of the locked file.
        path: String,
    },

    /// The host has been closed.
    #[error("host is closed")]
    Closed,
}

impl From<io::Error> for HostError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
