//! Read-facing handles over stored files.

use crate::error::{GridFsError, GridFsResult};
use crate::reader::{ChunkReader, ChunkSink};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use gridstore_core::file::{
    CHUNK_SIZE_FIELD, FILENAME_FIELD, ID_FIELD, LENGTH_FIELD, MD5_FIELD, UPLOAD_DATE_FIELD,
};
use gridstore_core::{Document, FileMetadata, Value};
use gridstore_docstore::Cursor;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use time::OffsetDateTime;
use tokio::io::AsyncWrite;

/// A stored file.
///
/// Wraps the metadata document as returned by the query, which may be
/// projection-restricted; accessors return `None` for absent fields.
#[derive(Clone)]
pub struct GridFile {
    id: Value,
    document: Document,
    reader: ChunkReader,
}

impl GridFile {
    pub(crate) fn new(document: Document, reader: ChunkReader) -> Self {
        let id = document.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        Self {
            id,
            document,
            reader,
        }
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Stored filename.
    pub fn name(&self) -> Option<&str> {
        self.document.get_str(FILENAME_FIELD)
    }

    /// Length in bytes. Integer and floating representations are accepted.
    pub fn size(&self) -> Option<u64> {
        self.document
            .get(LENGTH_FIELD)
            .and_then(Value::as_i64)
            .and_then(|v| u64::try_from(v).ok())
    }

    pub fn chunk_size(&self) -> Option<u32> {
        self.document
            .get_i64(CHUNK_SIZE_FIELD)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn md5(&self) -> Option<&str> {
        self.document.get_str(MD5_FIELD)
    }

    pub fn upload_date(&self) -> Option<OffsetDateTime> {
        self.document
            .get(UPLOAD_DATE_FIELD)
            .and_then(Value::as_datetime)
    }

    /// The raw metadata document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Typed view of the metadata. Fails on projection-restricted documents.
    pub fn metadata(&self) -> GridFsResult<FileMetadata> {
        Ok(FileMetadata::from_document(&self.document)?)
    }

    /// Read the whole file into memory.
    pub async fn read_all_bytes(&self) -> GridFsResult<Bytes> {
        let length = self
            .size()
            .ok_or_else(|| GridFsError::Format("couldn't find file size".to_string()))?;
        let capacity = usize::try_from(length).map_err(|_| GridFsError::TooLarge {
            length,
            max: usize::MAX as u64,
        })?;

        let mut buf = BytesMut::with_capacity(capacity);
        self.reader
            .read_all(&self.id, &mut ChunkSink::Buffer(&mut buf))
            .await?;
        Ok(buf.freeze())
    }

    /// Stream the file into `writer`, returning the bytes written.
    pub async fn write_to<W>(&self, writer: &mut W) -> GridFsResult<u64>
    where
        W: AsyncWrite + Send + Unpin,
    {
        self.reader
            .read_all(&self.id, &mut ChunkSink::Writer(writer))
            .await
    }

    /// Write the file to `path`, creating or truncating it.
    pub async fn write_to_path(&self, path: impl AsRef<Path>) -> GridFsResult<u64> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|source| GridFsError::WriteFailed {
                message: format!("could not open destination file {}", path.display()),
                source,
            })?;
        self.write_to(&mut file).await
    }

    /// Write the file to its stored filename.
    pub async fn write_to_stored_name(&self) -> GridFsResult<u64> {
        let name = self.name().ok_or_else(|| {
            GridFsError::InvalidArgument(format!("file {} has no stored filename", self.id))
        })?;
        self.write_to_path(name).await
    }
}

impl fmt::Debug for GridFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridFile")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("size", &self.size())
            .finish()
    }
}

/// A boxed stream of files.
pub type FileStream = Pin<Box<dyn Stream<Item = GridFsResult<GridFile>> + Send>>;

/// Lazy sequence of files matching a query, one backend round trip per step.
pub struct FileCursor {
    cursor: Box<dyn Cursor>,
    reader: ChunkReader,
    current: Option<Value>,
}

impl FileCursor {
    pub(crate) fn new(cursor: Box<dyn Cursor>, reader: ChunkReader) -> Self {
        Self {
            cursor,
            reader,
            current: None,
        }
    }

    /// Advance to the next file.
    pub async fn next(&mut self) -> GridFsResult<Option<GridFile>> {
        match self.cursor.next().await? {
            Some(document) => {
                let file = GridFile::new(document, self.reader.clone());
                self.current = Some(file.id().clone());
                Ok(Some(file))
            }
            None => {
                self.current = None;
                Ok(None)
            }
        }
    }

    /// Id of the file last returned by [`FileCursor::next`], as a string.
    pub fn key(&self) -> Option<String> {
        self.current.as_ref().map(ToString::to_string)
    }

    /// Drain the remaining files as a stream.
    pub fn into_stream(mut self) -> FileStream {
        Box::pin(async_stream::try_stream! {
            while let Some(file) = self.next().await? {
                yield file;
            }
        })
    }
}
