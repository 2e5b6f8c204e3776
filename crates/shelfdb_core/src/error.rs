//! Error types for shelfdb core.

use shelfdb_codec::CodecError;
use shelfdb_storage::HostError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in shelfdb core operations.
///
/// Variants mirror the DOM exception names surfaced by IndexedDB, which
/// [`CoreError::name`] returns verbatim.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A uniqueness constraint was violated.
    #[error("constraint violated: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// A key or key path was malformed.
    #[error("data error: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// An open requested a version below the current one.
    #[error("requested version {requested} is less than current version {current}")]
    Version {
        /// Version passed to open.
        requested: u64,
        /// Version already stored.
        current: u64,
    },

    /// An operation was aborted.
    #[error("aborted: {message}")]
    Abort {
        /// Why the operation was aborted.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Operation not permitted on this object.
    #[error("invalid access: {message}")]
    InvalidAccess {
        /// Description of the misuse.
        message: String,
    },

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// A request was placed against a finished transaction.
    #[error("transaction is not active")]
    TransactionInactive,

    /// A named object store or index does not exist.
    #[error("not found: {name}")]
    NotFound {
        /// The missing name.
        name: String,
    },

    /// An argument had the wrong type or range.
    #[error("type error: {message}")]
    Type {
        /// Description of the argument problem.
        message: String,
    },

    /// A key path was syntactically invalid.
    #[error("syntax error: {message}")]
    Syntax {
        /// Description of the syntax problem.
        message: String,
    },

    /// Persistence host error.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Value encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(CodecError),

    /// Persisted state violates an engine invariant.
    #[error("store corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

impl CoreError {
    /// Returns the DOM exception name for this error.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Constraint { .. } => "ConstraintError",
            Self::Data { .. } => "DataError",
            Self::Version { .. } => "VersionError",
            Self::Abort { .. } => "AbortError",
            Self::InvalidState { .. } => "InvalidStateError",
            Self::InvalidAccess { .. } => "InvalidAccessError",
            Self::ReadOnly => "ReadOnlyError",
            Self::TransactionInactive => "TransactionInactiveError",
            Self::NotFound { .. } => "NotFoundError",
            Self::Type { .. } => "TypeError",
            Self::Syntax { .. } => "SyntaxError",
            Self::Host(_) | Self::Codec(_) | Self::Corrupted { .. } => "UnknownError",
        }
    }

    /// Create a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Create a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Create an abort error.
    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an invalid access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::InvalidAccess {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    /// Create a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::InvalidKey { .. } | CodecError::KeyPathTarget { .. } => {
                Self::data(err.to_string())
            }
            CodecError::InvalidKeyPath { .. } => Self::Syntax {
                message: err.to_string(),
            },
            other => Self::Codec(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dom_names() {
        assert_eq!(CoreError::constraint("x").name(), "ConstraintError");
        assert_eq!(CoreError::data("x").name(), "DataError");
        assert_eq!(
            CoreError::Version {
                requested: 1,
                current: 2
            }
            .name(),
            "VersionError"
        );
        assert_eq!(CoreError::abort("x").name(), "AbortError");
        assert_eq!(CoreError::ReadOnly.name(), "ReadOnlyError");
        assert_eq!(CoreError::TransactionInactive.name(), "TransactionInactiveError");
        assert_eq!(CoreError::type_error("x").name(), "TypeError");
    }

    #[test]
    fn codec_errors_map_to_dom_taxonomy() {
        let err: CoreError = CodecError::invalid_key("NaN").into();
        assert_eq!(err.name(), "DataError");

        let err: CoreError = CodecError::invalid_key_path("a..b").into();
        assert_eq!(err.name(), "SyntaxError");

        let err: CoreError = CodecError::decoding_failed("junk").into();
        assert!(matches!(err, CoreError::Codec(_)));
    }

    #[test]
    fn host_errors_convert() {
        let err: CoreError = HostError::Closed.into();
        assert!(matches!(err, CoreError::Host(HostError::Closed)));
        assert_eq!(err.name(), "UnknownError");
    }
}
