//! Chunk splitting and sequential insertion.

use crate::error::{GridFsError, GridFsResult};
use crate::source::ByteSource;
use bytes::{Bytes, BytesMut};
use gridstore_core::chunk::{self, Chunk};
use gridstore_core::Value;
use gridstore_docstore::{Collection, WriteOptions};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

/// Outcome of a completed chunk write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub chunk_count: u64,
    pub bytes_written: u64,
}

/// Splits a byte source into chunks and inserts them one at a time.
///
/// Every insert is acknowledged before the next one is issued; the first
/// failure aborts the write and is returned unchanged. Nothing is retried.
#[derive(Clone)]
pub struct ChunkWriter {
    chunks: Arc<dyn Collection>,
    max_length: u64,
}

impl ChunkWriter {
    /// Writer over a chunks collection. Streams longer than `max_length`
    /// bytes (exclusive) are rejected.
    pub fn new(chunks: Arc<dyn Collection>, max_length: u64) -> Self {
        Self { chunks, max_length }
    }

    /// Write all bytes of `source` as chunks of `files_id`.
    #[instrument(skip(self, source, files_id), fields(files_id = %files_id))]
    pub async fn write_all(
        &self,
        source: ByteSource,
        files_id: &Value,
        chunk_size: u32,
    ) -> GridFsResult<WriteSummary> {
        if chunk_size == 0 {
            return Err(GridFsError::InvalidArgument(
                "chunk size must be positive".to_string(),
            ));
        }

        match source {
            ByteSource::Bytes(data) => self.write_buffer(data, files_id, chunk_size).await,
            ByteSource::Reader {
                mut reader,
                length: Some(length),
            } => {
                self.write_sized(&mut reader, length, files_id, chunk_size)
                    .await
            }
            ByteSource::Reader {
                mut reader,
                length: None,
            } => self.write_stream(&mut reader, files_id, chunk_size).await,
        }
    }

    async fn write_buffer(
        &self,
        data: Bytes,
        files_id: &Value,
        chunk_size: u32,
    ) -> GridFsResult<WriteSummary> {
        let length = data.len() as u64;
        let count = chunk::chunk_count(length, chunk_size);
        let mut offset = 0usize;
        for n in 0..count {
            let len = chunk::chunk_len(length, chunk_size, n) as usize;
            self.insert(files_id, n, data.slice(offset..offset + len))
                .await?;
            offset += len;
        }
        Ok(WriteSummary {
            chunk_count: count,
            bytes_written: length,
        })
    }

    async fn write_sized<R: AsyncRead + Unpin + ?Sized>(
        &self,
        reader: &mut R,
        length: u64,
        files_id: &Value,
        chunk_size: u32,
    ) -> GridFsResult<WriteSummary> {
        let count = chunk::chunk_count(length, chunk_size);
        let mut written = 0u64;
        for n in 0..count {
            let len = chunk::chunk_len(length, chunk_size, n) as usize;
            let mut buf = BytesMut::zeroed(len);
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|source| GridFsError::ReadFailed {
                    offset: written,
                    source,
                })?;
            self.insert(files_id, n, buf.freeze()).await?;
            written += len as u64;
        }
        Ok(WriteSummary {
            chunk_count: count,
            bytes_written: written,
        })
    }

    /// Read `chunk_size` blocks until the source is exhausted. The final block
    /// may be shorter; an empty final block is not inserted.
    async fn write_stream<R: AsyncRead + Unpin + ?Sized>(
        &self,
        reader: &mut R,
        files_id: &Value,
        chunk_size: u32,
    ) -> GridFsResult<WriteSummary> {
        let block = chunk_size as usize;
        let mut summary = WriteSummary::default();
        loop {
            let mut buf = BytesMut::zeroed(block);
            let mut filled = 0;
            while filled < block {
                let read = reader.read(&mut buf[filled..]).await.map_err(|source| {
                    GridFsError::ReadFailed {
                        offset: summary.bytes_written + filled as u64,
                        source,
                    }
                })?;
                if read == 0 {
                    break;
                }
                filled += read;
            }

            if filled > 0 {
                let total = summary.bytes_written + filled as u64;
                if total >= self.max_length {
                    return Err(GridFsError::TooLarge {
                        length: total,
                        max: self.max_length,
                    });
                }
                buf.truncate(filled);
                self.insert(files_id, summary.chunk_count, buf.freeze())
                    .await?;
                summary.chunk_count += 1;
                summary.bytes_written = total;
            }
            if filled < block {
                return Ok(summary);
            }
        }
    }

    async fn insert(&self, files_id: &Value, n: u64, data: Bytes) -> GridFsResult<()> {
        // `n` is persisted as a 32-bit signed integer.
        let n = i32::try_from(n)
            .ok()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                GridFsError::InvalidArgument(format!("chunk index {n} out of range"))
            })?;
        let chunk = Chunk::new(files_id.clone(), n, data);
        debug!(n = chunk.n, size = chunk.size(), "Inserting chunk");
        self.chunks
            .insert(chunk.to_document(), &WriteOptions::acknowledged())
            .await?;
        Ok(())
    }
}
