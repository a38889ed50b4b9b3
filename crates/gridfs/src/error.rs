//! Chunked file store error types.

use gridstore_docstore::DocStoreError;
use thiserror::Error;

/// Message prefix for a failed store that carries a cause.
pub const STORE_FAILED_PREFIX: &str = "Could not store file";

/// Message for a failed store with no known cause.
pub const STORE_FAILED_UNKNOWN: &str = "Could not store file for unknown reasons";

/// Chunked file store errors.
#[derive(Debug, Error)]
pub enum GridFsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("source unavailable: {message}")]
    SourceUnavailable {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("file too large: {length} bytes (limit is below {max})")]
    TooLarge { length: u64, max: u64 },

    #[error("read failed after {offset} bytes: {source}")]
    ReadFailed {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed: {message}")]
    WriteFailed {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backing store error: {0}")]
    BackingStore(#[from] DocStoreError),

    #[error("format error: {0}")]
    Format(String),

    #[error("{message}")]
    StoreFailed {
        message: String,
        code: Option<i32>,
        #[source]
        cause: Option<Box<GridFsError>>,
    },
}

impl GridFsError {
    /// Numeric error code, preserved from the backing store when it reported one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::BackingStore(e) => e.code(),
            Self::StoreFailed { code, .. } => *code,
            _ => None,
        }
    }

    /// Compose the error returned by a failed store.
    ///
    /// A pending cause keeps its code and is wrapped as
    /// `Could not store file: <cause>`.
    pub fn store_failed(pending: Option<GridFsError>) -> Self {
        match pending {
            Some(cause) => Self::StoreFailed {
                message: format!("{STORE_FAILED_PREFIX}: {cause}"),
                code: cause.code(),
                cause: Some(Box::new(cause)),
            },
            None => Self::StoreFailed {
                message: STORE_FAILED_UNKNOWN.to_string(),
                code: None,
                cause: None,
            },
        }
    }

    pub(crate) fn source_unavailable(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
            source: Some(source),
        }
    }
}

impl From<gridstore_core::Error> for GridFsError {
    fn from(e: gridstore_core::Error) -> Self {
        Self::Format(e.to_string())
    }
}

/// Result type for chunked file store operations.
pub type GridFsResult<T> = std::result::Result<T, GridFsError>;
