//! Chunked large-object storage over a document collection store.
//!
//! A file is split into fixed-size chunks stored in `<prefix>.chunks`, with one
//! metadata document in `<prefix>.files` written only after every chunk has
//! been acknowledged. Reads reassemble chunks in ascending `n` through the
//! unique `(files_id, n)` index. A store that fails partway removes whatever
//! it wrote before reporting the failure.
//!
//! ```no_run
//! # async fn demo() -> gridstore_gridfs::GridFsResult<()> {
//! use gridstore_core::{FileStoreConfig, doc};
//! use gridstore_gridfs::{FileStore, StoreOptions};
//!
//! let store = FileStore::new(gridstore_docstore::memory("app"), FileStoreConfig::default())?;
//! let id = store
//!     .store_bytes(&b"hello"[..], doc! { "filename" => "hello.txt" }, &StoreOptions::default())
//!     .await?;
//! let file = store.get(id).await?.expect("just stored");
//! assert_eq!(file.read_all_bytes().await?.as_ref(), b"hello");
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod error;
pub mod file;
pub mod guard;
pub mod reader;
pub mod source;
pub mod store;
pub mod writer;

pub use checksum::ChecksumComputer;
pub use error::{GridFsError, GridFsResult};
pub use file::{FileCursor, FileStream, GridFile};
pub use guard::ConsistencyGuard;
pub use reader::{ChunkReader, ChunkSink};
pub use source::{ByteSource, FileSource};
pub use store::{ChunkCleanupFailure, FileQuery, FileStore, RemoveAck, StoreOptions};
pub use writer::{ChunkWriter, WriteSummary};
