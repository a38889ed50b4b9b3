//! Core data model for gridstore.
//!
//! This crate defines the types shared by the backing-store boundary and the
//! chunking engine:
//! - Schemaless documents and tagged values
//! - File metadata and chunk documents
//! - Content digests
//! - File store configuration

pub mod chunk;
pub mod config;
pub mod document;
pub mod error;
pub mod file;
pub mod hash;
pub mod id;

pub use chunk::{Chunk, ChunkPayload};
pub use config::FileStoreConfig;
pub use document::{Binary, Document, Value};
pub use error::{Error, Result};
pub use file::FileMetadata;
pub use hash::{Md5Digest, Md5Hasher};
pub use id::ObjectId;

/// Default chunk size: 256 KiB
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024;

/// Exclusive bound on a stored file's length (legacy 32-bit limit).
pub const MAX_FILE_LENGTH: u64 = 0xFFFF_FFFF;

/// Default collection prefix.
pub const DEFAULT_PREFIX: &str = "fs";
