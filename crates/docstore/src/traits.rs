//! Collection store trait definitions.
//!
//! These traits are the boundary between the chunking engine and whatever
//! document database holds the two collections. Every method is a single
//! request/response round trip; callers await each one before issuing the
//! next.

use crate::error::DocStoreResult;
use async_trait::async_trait;
use futures::Stream;
use gridstore_core::Document;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed stream of documents drained from a cursor.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocStoreResult<Document>> + Send>>;

/// Sort direction for index keys and query ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// An ordered list of `(field, direction)` pairs.
pub type SortSpec = Vec<(String, SortOrder)>;

/// Write concern for inserts, removes and updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOptions {
    /// Wait for the store to acknowledge the write and report its errors.
    ///
    /// Unacknowledged writes report success even when the store rejects them.
    pub acknowledged: bool,
}

impl WriteOptions {
    /// Acknowledged writes.
    pub fn acknowledged() -> Self {
        Self { acknowledged: true }
    }

    /// Fire-and-forget writes.
    pub fn unacknowledged() -> Self {
        Self {
            acknowledged: false,
        }
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::acknowledged()
    }
}

/// Options for remove operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove at most one matching document.
    pub just_one: bool,
    pub write: WriteOptions,
}

/// Options for update operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a document built from the filter and update when nothing matches.
    pub upsert: bool,
    /// Update every matching document instead of the first.
    pub multi: bool,
    pub write: WriteOptions,
}

/// Options for index creation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Reject documents whose key tuple already exists.
    pub unique: bool,
    /// When building a unique index over existing data, drop later
    /// duplicates instead of failing.
    pub drop_dups: bool,
    /// Explicit index name; derived from the keys when absent.
    pub name: Option<String>,
}

/// A registered index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: SortSpec,
    pub unique: bool,
}

impl IndexSpec {
    /// Conventional name derived from keys, e.g. `files_id_1_n_1`.
    pub fn default_name(keys: &[(String, SortOrder)]) -> String {
        keys.iter()
            .map(|(field, order)| match order {
                SortOrder::Ascending => format!("{field}_1"),
                SortOrder::Descending => format!("{field}_-1"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Field inclusion list for query results. `_id` is always returned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub include: Vec<String>,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Projection returning only `_id`.
    pub fn id_only() -> Self {
        Self::default()
    }
}

/// Options for find operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: SortSpec,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn with_projection(projection: Projection) -> Self {
        Self {
            projection: Some(projection),
            ..Self::default()
        }
    }

    pub fn sorted_by(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            sort: vec![(field.into(), order)],
            ..Self::default()
        }
    }
}

/// A server-driven handle yielding query results in order.
#[async_trait]
pub trait Cursor: Send {
    /// Fetch the next document, or `None` once the cursor is exhausted.
    async fn next(&mut self) -> DocStoreResult<Option<Document>>;
}

/// Extension methods for boxed cursors.
pub trait CursorExt {
    /// Drain the cursor as a stream.
    fn into_stream(self) -> DocumentStream;
}

impl CursorExt for Box<dyn Cursor> {
    fn into_stream(self) -> DocumentStream {
        let mut cursor = self;
        Box::pin(async_stream::try_stream! {
            while let Some(document) = cursor.next().await? {
                yield document;
            }
        })
    }
}

/// A named collection of documents.
#[async_trait]
pub trait Collection: Send + Sync + 'static {
    /// Fully qualified collection name, e.g. `fs.chunks`.
    fn name(&self) -> &str;

    /// Insert a document. An `_id` is assigned when the document lacks one.
    async fn insert(&self, document: Document, options: &WriteOptions) -> DocStoreResult<()>;

    /// Query documents matching `filter`.
    async fn find(&self, filter: Document, options: FindOptions)
    -> DocStoreResult<Box<dyn Cursor>>;

    /// Return the first document matching `filter`.
    async fn find_one(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> DocStoreResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..options
        };
        let mut cursor = self.find(filter, options).await?;
        cursor.next().await
    }

    /// Remove matching documents, returning how many were removed.
    async fn remove(&self, filter: Document, options: &RemoveOptions) -> DocStoreResult<u64>;

    /// Update matching documents, returning how many were modified or inserted.
    async fn update(
        &self,
        filter: Document,
        update: Document,
        options: &UpdateOptions,
    ) -> DocStoreResult<u64>;

    /// Create an index unless an index over the same keys already exists.
    ///
    /// Repeating the call with the same keys is a no-op.
    async fn ensure_index(&self, keys: SortSpec, options: &IndexOptions) -> DocStoreResult<()>;

    /// List registered indexes.
    async fn list_indexes(&self) -> DocStoreResult<Vec<IndexSpec>>;

    /// Count documents matching `filter`.
    async fn count(&self, filter: Document) -> DocStoreResult<u64>;

    /// Remove the collection with all its documents and indexes.
    async fn drop_collection(&self) -> DocStoreResult<()>;
}

/// A database holding named collections and accepting commands.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Database name.
    fn name(&self) -> &str;

    /// Get a handle to a collection, creating it lazily.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;

    /// Run a server-side command and return its reply document.
    async fn run_command(&self, command: Document) -> DocStoreResult<Document>;

    /// Get the name of this backend (e.g. "memory").
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> DocStoreResult<()> {
        Ok(())
    }
}
