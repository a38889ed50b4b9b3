//! Byte sources accepted by the store.

use crate::error::{GridFsError, GridFsResult};
use bytes::Bytes;
use std::fmt;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncSeekExt};

/// Bytes to be split into chunks.
pub enum ByteSource {
    /// An in-memory buffer; its length is always known.
    Bytes(Bytes),
    /// A sequential reader, with its total length when the caller knows it.
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: Option<u64>,
    },
}

impl ByteSource {
    /// Wrap a reader of unknown length.
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader {
            reader: Box::new(reader),
            length: None,
        }
    }

    /// Wrap a reader that will yield exactly `length` bytes.
    pub fn sized_reader(reader: impl AsyncRead + Send + Unpin + 'static, length: u64) -> Self {
        Self::Reader {
            reader: Box::new(reader),
            length: Some(length),
        }
    }

    /// Total length, when discoverable without reading.
    pub fn known_length(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Reader { length, .. } => *length,
        }
    }

    /// Fix the length of an undeclared reader.
    pub(crate) fn with_declared_length(self, declared: u64) -> Self {
        match self {
            Self::Reader {
                reader,
                length: None,
            } => Self::Reader {
                reader,
                length: Some(declared),
            },
            other => other,
        }
    }
}

impl From<Bytes> for ByteSource {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader { length, .. } => {
                f.debug_struct("Reader").field("length", length).finish()
            }
        }
    }
}

/// A file on the local filesystem to be stored.
#[derive(Debug)]
pub enum FileSource {
    /// Opened by the store; the path is recorded as the filename unless the
    /// caller supplies one.
    Path(PathBuf),
    /// An already opened handle. It is rewound and stored from the start.
    Handle(tokio::fs::File),
}

impl FileSource {
    /// Open the file and discover its size.
    pub(crate) async fn open(self) -> GridFsResult<(tokio::fs::File, u64, Option<String>)> {
        let (file, name) = match self {
            Self::Path(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    GridFsError::source_unavailable(
                        format!("could not open {}", path.display()),
                        e,
                    )
                })?;
                (file, Some(path.to_string_lossy().into_owned()))
            }
            Self::Handle(mut file) => {
                file.seek(SeekFrom::Start(0)).await.map_err(|e| {
                    GridFsError::source_unavailable("could not rewind file handle", e)
                })?;
                (file, None)
            }
        };

        let size = file
            .metadata()
            .await
            .map_err(|e| GridFsError::source_unavailable("could not determine file size", e))?
            .len();
        Ok((file, size, name))
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&std::path::Path> for FileSource {
    fn from(path: &std::path::Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<tokio::fs::File> for FileSource {
    fn from(file: tokio::fs::File) -> Self {
        Self::Handle(file)
    }
}
