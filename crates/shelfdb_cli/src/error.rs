//! CLI error type.

use shelfdb_core::CoreError;
use shelfdb_storage::HostError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No journal exists at the given path.
    #[error("no journal found at {0:?}")]
    MissingJournal(PathBuf),

    /// The named database is not in the journal.
    #[error("database '{0}' not found")]
    UnknownDatabase(String),

    /// The named store or index is not in the database.
    #[error("'{0}' not found")]
    UnknownStore(String),

    /// Engine error while loading the journal.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Journal I/O error.
    #[error(transparent)]
    Host(#[from] HostError),

    /// JSON output error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
