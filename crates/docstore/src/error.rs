//! Document store error types.

use thiserror::Error;

/// Error code reported for unique index violations.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Error code reported for unknown commands.
pub const COMMAND_NOT_FOUND_CODE: i32 = 59;

/// Document store operation errors.
#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("duplicate key in {collection}: {key}")]
    DuplicateKey { collection: String, key: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("command failed: {message}")]
    Command { message: String, code: Option<i32> },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("core error: {0}")]
    Core(#[from] gridstore_core::Error),
}

impl DocStoreError {
    /// Numeric error code, when the backing store reports one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::DuplicateKey { .. } => Some(DUPLICATE_KEY_CODE),
            Self::Command { code, .. } => *code,
            _ => None,
        }
    }
}

/// Result type for document store operations.
pub type DocStoreResult<T> = std::result::Result<T, DocStoreError>;
