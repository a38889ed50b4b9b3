//! Chunk documents and payload decoding.

use crate::document::{Binary, Document, Value};
use crate::id::ObjectId;
use bytes::Bytes;
use std::fmt;

/// Field referencing the owning file's `_id`.
pub const FILES_ID_FIELD: &str = "files_id";
/// Field holding the zero-based chunk index.
pub const N_FIELD: &str = "n";
/// Field holding the chunk payload.
pub const DATA_FIELD: &str = "data";
/// Marker a backing store places in a result document instead of a payload
/// when it reports an error through the cursor.
pub const ERROR_MARKER_FIELD: &str = "$err";

/// A chunk payload as found on disk.
///
/// Older writers stored raw byte strings; current writers store tagged
/// binary values. Readers accept both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkPayload {
    Raw(Bytes),
    Tagged { bytes: Bytes, subtype: u8 },
}

impl ChunkPayload {
    /// Resolve a stored `data` value, or `None` for any other representation.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(bytes) => Some(Self::Raw(bytes.clone())),
            Value::String(s) => Some(Self::Raw(Bytes::copy_from_slice(s.as_bytes()))),
            Value::Binary(binary) => Some(Self::Tagged {
                bytes: binary.bytes.clone(),
                subtype: binary.subtype,
            }),
            _ => None,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        match self {
            Self::Raw(bytes) => bytes,
            Self::Tagged { bytes, .. } => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

/// A chunk ready to be inserted.
#[derive(Clone)]
pub struct Chunk {
    /// The chunk document's own id.
    pub id: ObjectId,
    /// The owning file's id.
    pub files_id: Value,
    /// Position within the file (0-indexed). Persisted as a 32-bit signed
    /// integer, so callers keep it at or below `i32::MAX`.
    pub n: u32,
    /// The chunk data.
    pub data: Bytes,
}

impl Chunk {
    /// Create a new chunk with a fresh document id.
    pub fn new(files_id: Value, n: u32, data: Bytes) -> Self {
        Self {
            id: ObjectId::new(),
            files_id,
            n,
            data,
        }
    }

    /// Get the chunk size.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Render the persisted form `{ _id, files_id, n, data }`.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(crate::file::ID_FIELD, self.id);
        document.insert(FILES_ID_FIELD, self.files_id.clone());
        document.insert(N_FIELD, Value::Int32(self.n as i32));
        document.insert(DATA_FIELD, Binary::generic(self.data.clone()));
        document
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("files_id", &self.files_id)
            .field("n", &self.n)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Number of chunks a file of `length` bytes occupies.
///
/// A length that is an exact multiple of `chunk_size` produces no trailing
/// empty chunk.
pub fn chunk_count(length: u64, chunk_size: u32) -> u64 {
    length.div_ceil(u64::from(chunk_size))
}

/// Size of chunk `n` of a file of `length` bytes.
pub fn chunk_len(length: u64, chunk_size: u32, n: u64) -> u32 {
    let start = n.saturating_mul(u64::from(chunk_size));
    let remaining = length.saturating_sub(start);
    remaining.min(u64::from(chunk_size)) as u32
}
