//! Error types for the core data model.

use thiserror::Error;

/// Core data model error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: expected {expected}, got {found}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
