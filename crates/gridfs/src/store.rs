//! The file store: orchestrates chunk writes, checksums, metadata and cleanup
//! over a `<prefix>.files` / `<prefix>.chunks` collection pair.

use crate::checksum::ChecksumComputer;
use crate::error::{GridFsError, GridFsResult};
use crate::file::{FileCursor, GridFile};
use crate::guard::ConsistencyGuard;
use crate::reader::{ChunkReader, chunk_index_keys, chunk_index_options};
use crate::source::{ByteSource, FileSource};
use crate::writer::{ChunkWriter, WriteSummary};
use bytes::Bytes;
use gridstore_core::chunk::FILES_ID_FIELD;
use gridstore_core::file::{CHUNK_SIZE_FIELD, FILENAME_FIELD, ID_FIELD, LENGTH_FIELD, MD5_FIELD, UPLOAD_DATE_FIELD};
use gridstore_core::{Document, FileStoreConfig, ObjectId, Value, doc};
use gridstore_docstore::{
    Collection, Database, DocStoreError, FindOptions, Projection, RemoveOptions, WriteOptions,
};
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tracing::{info, instrument, warn};

/// Per-call store options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Chunk size for this call; wins over the caller's `chunkSize` field and
    /// the configured default. Zero is rejected.
    pub chunk_size: Option<u32>,
}

impl StoreOptions {
    pub fn with_chunk_size(chunk_size: u32) -> Self {
        Self {
            chunk_size: Some(chunk_size),
        }
    }
}

/// Query for a single file.
#[derive(Clone, Debug, PartialEq)]
pub enum FileQuery {
    /// Match on the stored filename.
    Filename(String),
    /// An arbitrary filter over the files collection.
    Filter(Document),
}

impl FileQuery {
    fn into_filter(self) -> Document {
        match self {
            Self::Filename(name) => doc! { FILENAME_FIELD => name },
            Self::Filter(filter) => filter,
        }
    }
}

impl From<&str> for FileQuery {
    fn from(name: &str) -> Self {
        Self::Filename(name.to_string())
    }
}

impl From<String> for FileQuery {
    fn from(name: String) -> Self {
        Self::Filename(name)
    }
}

impl From<Document> for FileQuery {
    fn from(filter: Document) -> Self {
        Self::Filter(filter)
    }
}

/// A file whose chunks could not be removed.
#[derive(Debug)]
pub struct ChunkCleanupFailure {
    pub files_id: Value,
    pub error: DocStoreError,
}

/// Outcome of a remove.
#[derive(Debug, Default)]
pub struct RemoveAck {
    /// Metadata documents removed by the bulk removal.
    pub files_removed: u64,
    /// Chunk documents removed across all matched files.
    pub chunks_removed: u64,
    /// Matched files whose chunk removal failed. Their metadata removal was
    /// still attempted.
    pub chunk_cleanup_failures: Vec<ChunkCleanupFailure>,
}

impl RemoveAck {
    /// True when every matched file's chunks were removed.
    pub fn is_clean(&self) -> bool {
        self.chunk_cleanup_failures.is_empty()
    }
}

/// Chunked file storage over a pair of collections.
pub struct FileStore {
    db: Arc<dyn Database>,
    files: Arc<dyn Collection>,
    chunks: Arc<dyn Collection>,
    config: FileStoreConfig,
    writer: ChunkWriter,
    reader: ChunkReader,
    checksum: ChecksumComputer,
    guard: ConsistencyGuard,
}

impl FileStore {
    /// Create a store with the given configuration.
    pub fn new(db: Arc<dyn Database>, config: FileStoreConfig) -> GridFsResult<Self> {
        config.validate().map_err(GridFsError::InvalidArgument)?;

        let files = db.collection(&config.files_collection());
        let chunks = db.collection(&config.chunks_collection());
        Ok(Self {
            writer: ChunkWriter::new(chunks.clone(), config.max_file_length),
            reader: ChunkReader::new(chunks.clone()),
            checksum: ChecksumComputer::new(db.clone(), config.prefix.clone()),
            guard: ConsistencyGuard::new(files.clone(), chunks.clone()),
            db,
            files,
            chunks,
            config,
        })
    }

    /// Create a store over `<prefix>.files` / `<prefix>.chunks` with default
    /// settings otherwise.
    pub fn with_prefix(db: Arc<dyn Database>, prefix: impl Into<String>) -> GridFsResult<Self> {
        Self::new(db, FileStoreConfig::with_prefix(prefix))
    }

    pub fn config(&self) -> &FileStoreConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn files_collection(&self) -> &Arc<dyn Collection> {
        &self.files
    }

    pub fn chunks_collection(&self) -> &Arc<dyn Collection> {
        &self.chunks
    }

    /// Store a byte source as a new file and return its id.
    ///
    /// `extra` supplies caller metadata; `_id`, `filename`, `chunkSize`,
    /// `length`, `md5` and `uploadDate` given there are kept. Argument and
    /// source problems are reported before anything is written. Once writing
    /// starts, any failure removes what was written and returns
    /// [`GridFsError::StoreFailed`].
    #[instrument(skip(self, source, extra, options), fields(prefix = %self.config.prefix))]
    pub async fn store(
        &self,
        source: ByteSource,
        extra: Document,
        options: &StoreOptions,
    ) -> GridFsResult<Value> {
        let mut metadata = extra;
        let id = self.resolve_id(&mut metadata).await?;
        let chunk_size = self.resolve_chunk_size(&metadata, options)?;
        let (source, length) = self.resolve_length(source, &metadata)?;

        metadata.insert(CHUNK_SIZE_FIELD, Value::Int32(chunk_size as i32));

        match self
            .write_file(source, &id, chunk_size, metadata)
            .await
        {
            Ok(summary) => {
                info!(
                    id = %id,
                    length = summary.bytes_written,
                    chunks = summary.chunk_count,
                    declared_length = ?length,
                    "Stored file"
                );
                Ok(id)
            }
            Err(e) => Err(self.guard.rollback(&id, Some(e)).await),
        }
    }

    /// Chunks first, then the checksum, then the metadata document.
    async fn write_file(
        &self,
        source: ByteSource,
        id: &Value,
        chunk_size: u32,
        mut metadata: Document,
    ) -> GridFsResult<WriteSummary> {
        self.chunks
            .ensure_index(chunk_index_keys(), &chunk_index_options())
            .await?;

        let summary = self.writer.write_all(source, id, chunk_size).await?;

        if !metadata.contains_key(MD5_FIELD)
            && let Some(md5) = self.checksum.compute(id).await
        {
            metadata.insert(MD5_FIELD, md5);
        }

        metadata.insert(LENGTH_FIELD, Value::Int64(summary.bytes_written as i64));
        metadata.insert_if_absent(UPLOAD_DATE_FIELD, OffsetDateTime::now_utc());

        self.files
            .insert(metadata, &WriteOptions::acknowledged())
            .await?;
        Ok(summary)
    }

    /// Use the caller's `_id` if it is free, otherwise assign a new one.
    async fn resolve_id(&self, metadata: &mut Document) -> GridFsResult<Value> {
        let Some(id) = metadata.get(ID_FIELD).cloned() else {
            let id = Value::ObjectId(ObjectId::new());
            metadata.insert(ID_FIELD, id.clone());
            return Ok(id);
        };

        if id.is_null() {
            return Err(GridFsError::InvalidArgument(
                "file id cannot be null".to_string(),
            ));
        }
        let existing = self
            .files
            .find_one(
                doc! { ID_FIELD => id.clone() },
                FindOptions::with_projection(Projection::id_only()),
            )
            .await?;
        if existing.is_some() {
            return Err(GridFsError::InvalidArgument(format!(
                "a file with id {id} already exists"
            )));
        }
        Ok(id)
    }

    /// Per-call override, then a positive caller field, then the default.
    fn resolve_chunk_size(&self, metadata: &Document, options: &StoreOptions) -> GridFsResult<u32> {
        let chunk_size = match options.chunk_size {
            Some(0) => {
                return Err(GridFsError::InvalidArgument(
                    "chunk size must be positive".to_string(),
                ));
            }
            Some(size) => size,
            None => metadata
                .get_i64(CHUNK_SIZE_FIELD)
                .filter(|size| *size > 0)
                .and_then(|size| u32::try_from(size).ok())
                .unwrap_or(self.config.default_chunk_size),
        };

        if i32::try_from(chunk_size).is_err() {
            return Err(GridFsError::InvalidArgument(format!(
                "chunk size {chunk_size} exceeds {}",
                i32::MAX
            )));
        }
        Ok(chunk_size)
    }

    /// Reconcile the caller's `length` field with the source and enforce the
    /// length bound.
    fn resolve_length(
        &self,
        source: ByteSource,
        metadata: &Document,
    ) -> GridFsResult<(ByteSource, Option<u64>)> {
        let declared = match metadata.get(LENGTH_FIELD) {
            None => None,
            Some(value) => Some(
                value
                    .as_i64()
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| {
                        GridFsError::InvalidArgument(format!(
                            "length must be a non-negative integer, got {value}"
                        ))
                    })?,
            ),
        };

        let (source, length) = match (source.known_length(), declared) {
            (Some(known), Some(declared)) if known != declared => {
                return Err(GridFsError::InvalidArgument(format!(
                    "declared length {declared} does not match source length {known}"
                )));
            }
            (Some(known), _) => (source, Some(known)),
            (None, Some(declared)) => (source.with_declared_length(declared), Some(declared)),
            (None, None) => (source, None),
        };

        if let Some(length) = length
            && length >= self.config.max_file_length
        {
            return Err(GridFsError::TooLarge {
                length,
                max: self.config.max_file_length,
            });
        }
        Ok((source, length))
    }

    /// Store an in-memory buffer.
    pub async fn store_bytes(
        &self,
        data: impl Into<Bytes>,
        extra: Document,
        options: &StoreOptions,
    ) -> GridFsResult<Value> {
        self.store(ByteSource::Bytes(data.into()), extra, options)
            .await
    }

    /// Store everything `reader` yields. Without a declared length the reader
    /// is consumed until end of input.
    pub async fn store_reader<R>(
        &self,
        reader: R,
        declared_length: Option<u64>,
        extra: Document,
        options: &StoreOptions,
    ) -> GridFsResult<Value>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let source = ByteSource::Reader {
            reader: Box::new(reader),
            length: declared_length,
        };
        self.store(source, extra, options).await
    }

    /// Store a local file. A path source records its path as the filename
    /// unless `extra` names the file.
    pub async fn store_file(
        &self,
        source: impl Into<FileSource>,
        extra: Document,
        options: &StoreOptions,
    ) -> GridFsResult<Value> {
        let (file, size, name) = source.into().open().await?;
        if size >= self.config.max_file_length {
            return Err(GridFsError::TooLarge {
                length: size,
                max: self.config.max_file_length,
            });
        }

        let mut metadata = extra;
        if let Some(name) = name {
            metadata.insert_if_absent(FILENAME_FIELD, name);
        }
        self.store(ByteSource::sized_reader(file, size), metadata, options)
            .await
    }

    /// Store a local file under its path with default options.
    pub async fn put(&self, path: impl AsRef<Path>) -> GridFsResult<Value> {
        self.store_file(
            path.as_ref(),
            Document::new(),
            &StoreOptions::default(),
        )
        .await
    }

    /// Query the files collection.
    #[instrument(skip(self, filter, projection), fields(prefix = %self.config.prefix))]
    pub async fn find(
        &self,
        filter: Document,
        projection: Option<Projection>,
    ) -> GridFsResult<FileCursor> {
        let options = FindOptions {
            projection,
            ..FindOptions::default()
        };
        let cursor = self.files.find(filter, options).await?;
        Ok(FileCursor::new(cursor, self.reader.clone()))
    }

    /// First file matching `query`.
    pub async fn find_one(&self, query: impl Into<FileQuery>) -> GridFsResult<Option<GridFile>> {
        let document = self
            .files
            .find_one(query.into().into_filter(), FindOptions::default())
            .await?;
        Ok(document.map(|document| GridFile::new(document, self.reader.clone())))
    }

    /// File with the given id.
    pub async fn get(&self, id: impl Into<Value>) -> GridFsResult<Option<GridFile>> {
        self.find_one(FileQuery::Filter(doc! { ID_FIELD => id.into() }))
            .await
    }

    /// Remove matching files and their chunks.
    ///
    /// Ids are resolved first; each file's chunks are then removed, and
    /// finally the metadata documents are removed with the original filter and
    /// options. A chunk removal failure is recorded in the ack and does not
    /// stop the metadata removal.
    #[instrument(skip(self, filter, options), fields(prefix = %self.config.prefix))]
    pub async fn remove(&self, filter: Document, options: &RemoveOptions) -> GridFsResult<RemoveAck> {
        let find_options = FindOptions {
            projection: Some(Projection::id_only()),
            limit: options.just_one.then_some(1),
            ..FindOptions::default()
        };
        let mut cursor = self.files.find(filter.clone(), find_options).await?;
        let mut ids = Vec::new();
        while let Some(document) = cursor.next().await? {
            if let Some(id) = document.get(ID_FIELD) {
                ids.push(id.clone());
            }
        }

        let mut ack = RemoveAck::default();
        let chunk_options = RemoveOptions {
            just_one: false,
            write: options.write.clone(),
        };
        for id in ids {
            match self
                .chunks
                .remove(doc! { FILES_ID_FIELD => id.clone() }, &chunk_options)
                .await
            {
                Ok(removed) => ack.chunks_removed += removed,
                Err(error) => {
                    warn!(files_id = %id, error = %error, "Failed to remove chunks");
                    ack.chunk_cleanup_failures.push(ChunkCleanupFailure {
                        files_id: id,
                        error,
                    });
                }
            }
        }

        ack.files_removed = self.files.remove(filter, options).await?;
        info!(
            files = ack.files_removed,
            chunks = ack.chunks_removed,
            failures = ack.chunk_cleanup_failures.len(),
            "Removed files"
        );
        Ok(ack)
    }

    /// Remove the file with the given id.
    pub async fn delete(&self, id: impl Into<Value>) -> GridFsResult<RemoveAck> {
        self.remove(doc! { ID_FIELD => id.into() }, &RemoveOptions::default())
            .await
    }

    /// Drop both collections, chunks first.
    pub async fn drop_all(&self) -> GridFsResult<()> {
        self.chunks.drop_collection().await?;
        self.files.drop_collection().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstore_docstore::MemoryDatabase;

    fn store() -> FileStore {
        FileStore::new(
            Arc::new(MemoryDatabase::default()),
            FileStoreConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::default());
        assert!(matches!(
            FileStore::with_prefix(db, ""),
            Err(GridFsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_rejects_chunk_size_beyond_i32() {
        let config = FileStoreConfig {
            default_chunk_size: u32::MAX,
            ..FileStoreConfig::default()
        };
        assert!(matches!(
            FileStore::new(Arc::new(MemoryDatabase::default()), config),
            Err(GridFsError::InvalidArgument(msg)) if msg.contains("default_chunk_size")
        ));
    }

    #[test]
    fn test_chunk_size_resolution_order() {
        let store = store();
        let caller = doc! { CHUNK_SIZE_FIELD => 1024 };

        assert_eq!(
            store
                .resolve_chunk_size(&caller, &StoreOptions::with_chunk_size(16))
                .unwrap(),
            16
        );
        assert_eq!(
            store
                .resolve_chunk_size(&caller, &StoreOptions::default())
                .unwrap(),
            1024
        );
        assert_eq!(
            store
                .resolve_chunk_size(&doc! { CHUNK_SIZE_FIELD => -5 }, &StoreOptions::default())
                .unwrap(),
            gridstore_core::DEFAULT_CHUNK_SIZE
        );
        assert!(
            store
                .resolve_chunk_size(&caller, &StoreOptions::with_chunk_size(0))
                .is_err()
        );
    }

    #[test]
    fn test_length_must_match_known_source() {
        let store = store();
        let err = store
            .resolve_length(
                ByteSource::from(vec![0u8; 4]),
                &doc! { LENGTH_FIELD => 5 },
            )
            .unwrap_err();
        assert!(matches!(err, GridFsError::InvalidArgument(_)));

        let (source, length) = store
            .resolve_length(
                ByteSource::reader(std::io::Cursor::new(vec![0u8; 4])),
                &doc! { LENGTH_FIELD => 4 },
            )
            .unwrap();
        assert_eq!(length, Some(4));
        assert_eq!(source.known_length(), Some(4));
    }

    #[test]
    fn test_length_bound_is_exclusive() {
        let config = FileStoreConfig {
            max_file_length: 4,
            ..FileStoreConfig::default()
        };
        let store = FileStore::new(Arc::new(MemoryDatabase::default()), config).unwrap();

        assert!(store
            .resolve_length(ByteSource::from(vec![0u8; 3]), &Document::new())
            .is_ok());
        assert!(matches!(
            store.resolve_length(ByteSource::from(vec![0u8; 4]), &Document::new()),
            Err(GridFsError::TooLarge { length: 4, max: 4 })
        ));
    }
}
