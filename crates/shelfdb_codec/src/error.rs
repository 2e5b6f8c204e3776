//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting, encoding or decoding values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value cannot be used as a key.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Why the value was rejected.
        message: String,
    },

    /// A key path is syntactically invalid.
    #[error("invalid key path: {path}")]
    InvalidKeyPath {
        /// The offending path text.
        path: String,
    },

    /// A key path points through a value that cannot hold it.
    #[error("cannot evaluate key path '{path}': {message}")]
    KeyPathTarget {
        /// The key path being evaluated.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Create an invalid key path error.
    pub fn invalid_key_path(path: impl Into<String>) -> Self {
        Self::InvalidKeyPath { path: path.into() }
    }

    /// Create a key path target error.
    pub fn key_path_target(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KeyPathTarget {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
