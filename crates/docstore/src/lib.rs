//! Document collection store boundary for gridstore.
//!
//! This crate provides:
//! - The [`Database`] / [`Collection`] / [`Cursor`] traits the chunking engine
//!   talks to
//! - Local query evaluation (filters, sorting, projection, updates)
//! - An in-memory backend with unique indexes and the `filemd5` command

pub mod backends;
pub mod error;
pub mod query;
pub mod traits;

pub use backends::memory::{FILEMD5_COMMAND, MemoryCollection, MemoryDatabase};
pub use error::{DocStoreError, DocStoreResult};
pub use traits::{
    Collection, Cursor, CursorExt, Database, DocumentStream, FindOptions, IndexOptions, IndexSpec,
    Projection, RemoveOptions, SortOrder, SortSpec, UpdateOptions, WriteOptions,
};

use std::sync::Arc;

/// Open a fresh in-memory database behind the trait object the engine expects.
pub fn memory(name: impl Into<String>) -> Arc<dyn Database> {
    Arc::new(MemoryDatabase::new(name))
}
