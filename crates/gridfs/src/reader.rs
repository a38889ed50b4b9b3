//! Ordered chunk reassembly.

use crate::error::{GridFsError, GridFsResult};
use bytes::BytesMut;
use gridstore_core::chunk::{DATA_FIELD, ERROR_MARKER_FIELD, FILES_ID_FIELD, N_FIELD};
use gridstore_core::{ChunkPayload, Document, Value, doc};
use gridstore_docstore::{
    Collection, DocStoreError, FindOptions, IndexOptions, SortOrder, SortSpec,
};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Keys of the unique `(files_id, n)` chunk index.
pub fn chunk_index_keys() -> SortSpec {
    vec![
        (FILES_ID_FIELD.to_string(), SortOrder::Ascending),
        (N_FIELD.to_string(), SortOrder::Ascending),
    ]
}

/// Options for the chunk index: unique, dropping duplicates left by other
/// producers.
pub fn chunk_index_options() -> IndexOptions {
    IndexOptions {
        unique: true,
        drop_dups: true,
        name: None,
    }
}

/// Destination for reassembled bytes.
pub enum ChunkSink<'a> {
    /// A buffer the caller pre-sized to the file's length.
    Buffer(&'a mut BytesMut),
    /// An open output stream.
    Writer(&'a mut (dyn AsyncWrite + Send + Unpin)),
}

impl ChunkSink<'_> {
    async fn write(&mut self, bytes: &[u8]) -> GridFsResult<()> {
        match self {
            Self::Buffer(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Self::Writer(writer) => {
                writer
                    .write_all(bytes)
                    .await
                    .map_err(|source| GridFsError::WriteFailed {
                        message: "could not write chunk to destination".to_string(),
                        source,
                    })
            }
        }
    }

    async fn finish(&mut self) -> GridFsResult<()> {
        match self {
            Self::Buffer(_) => Ok(()),
            Self::Writer(writer) => {
                writer
                    .flush()
                    .await
                    .map_err(|source| GridFsError::WriteFailed {
                        message: "could not flush destination".to_string(),
                        source,
                    })
            }
        }
    }
}

/// Copies a file's chunk payloads to a sink in ascending `n`.
#[derive(Clone)]
pub struct ChunkReader {
    chunks: Arc<dyn Collection>,
}

impl ChunkReader {
    pub fn new(chunks: Arc<dyn Collection>) -> Self {
        Self { chunks }
    }

    /// Copy every chunk of `files_id` into `sink`, returning the bytes copied.
    ///
    /// Ordering comes from the `(files_id, n)` index, not from insertion
    /// order, so the index is ensured before the cursor is opened.
    #[instrument(skip(self, files_id, sink), fields(files_id = %files_id))]
    pub async fn read_all(&self, files_id: &Value, sink: &mut ChunkSink<'_>) -> GridFsResult<u64> {
        self.chunks
            .ensure_index(chunk_index_keys(), &chunk_index_options())
            .await?;

        let mut cursor = self
            .chunks
            .find(
                doc! { FILES_ID_FIELD => files_id.clone() },
                FindOptions::sorted_by(N_FIELD, SortOrder::Ascending),
            )
            .await?;

        let mut copied = 0u64;
        while let Some(document) = cursor.next().await? {
            let Some(payload) = payload_of(&document)? else {
                debug!(n = ?document.get(N_FIELD), "Skipping chunk without payload");
                continue;
            };
            sink.write(payload.bytes()).await?;
            copied += payload.len() as u64;
        }
        sink.finish().await?;

        debug!(bytes = copied, "Read chunks");
        Ok(copied)
    }
}

/// Resolve a chunk document's payload.
///
/// `Ok(None)` marks a document with neither payload nor error marker.
fn payload_of(document: &Document) -> GridFsResult<Option<ChunkPayload>> {
    match document.get(DATA_FIELD) {
        Some(value) => ChunkPayload::from_value(value).map(Some).ok_or_else(|| {
            GridFsError::Format(format!(
                "chunk {} has a {} payload, expected bytes",
                document.get(N_FIELD).unwrap_or(&Value::Null),
                value.type_name()
            ))
        }),
        None => match document.get(ERROR_MARKER_FIELD) {
            Some(marker) => Err(GridFsError::BackingStore(DocStoreError::Command {
                message: marker.to_string(),
                code: document
                    .get_i64("code")
                    .and_then(|code| i32::try_from(code).ok()),
            })),
            None => Ok(None),
        },
    }
}
