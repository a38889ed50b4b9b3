use async_trait::async_trait;
use gridstore_core::Document;
use gridstore_docstore::error::{DocStoreError, DocStoreResult};
use gridstore_docstore::traits::{
    Collection, Cursor, Database, FindOptions, IndexOptions, IndexSpec, RemoveOptions, SortSpec,
    UpdateOptions, WriteOptions,
};
use gridstore_docstore::MemoryDatabase;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Code carried by every injected failure.
pub const INJECTED_CODE: i32 = 9001;

/// The error returned by an injected failure.
#[allow(dead_code)]
pub fn injected_error(what: &str) -> DocStoreError {
    DocStoreError::Command {
        message: format!("injected {what} failure"),
        code: Some(INJECTED_CODE),
    }
}

/// Switchable failure points, shared by every collection of a [`FaultyDatabase`].
#[allow(dead_code)]
pub struct Faults {
    /// Fail the chunk insert whose `n` equals this value (-1 disables).
    pub fail_chunk_n: AtomicI64,
    pub fail_files_insert: AtomicBool,
    pub fail_chunk_remove: AtomicBool,
    pub fail_files_remove: AtomicBool,
    pub fail_command: AtomicBool,
    pub chunk_inserts: AtomicUsize,
    pub chunk_removes: AtomicUsize,
    pub files_removes: AtomicUsize,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            fail_chunk_n: AtomicI64::new(-1),
            fail_files_insert: AtomicBool::new(false),
            fail_chunk_remove: AtomicBool::new(false),
            fail_files_remove: AtomicBool::new(false),
            fail_command: AtomicBool::new(false),
            chunk_inserts: AtomicUsize::new(0),
            chunk_removes: AtomicUsize::new(0),
            files_removes: AtomicUsize::new(0),
        }
    }
}

#[allow(dead_code)]
impl Faults {
    pub fn fail_chunk(&self, n: i64) {
        self.fail_chunk_n.store(n, Ordering::SeqCst);
    }
}

/// In-memory database whose collections fail on demand.
#[allow(dead_code)]
pub struct FaultyDatabase {
    inner: MemoryDatabase,
    pub faults: Arc<Faults>,
}

#[allow(dead_code)]
impl FaultyDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryDatabase::default(),
            faults: Arc::new(Faults::default()),
        })
    }

    /// The wrapped database, bypassing every fault.
    pub fn inner(&self) -> &MemoryDatabase {
        &self.inner
    }
}

#[async_trait]
impl Database for FaultyDatabase {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        let role = if name.ends_with(".chunks") {
            Role::Chunks
        } else if name.ends_with(".files") {
            Role::Files
        } else {
            Role::Other
        };
        Arc::new(FaultyCollection {
            inner: self.inner.collection(name),
            role,
            faults: self.faults.clone(),
        })
    }

    async fn run_command(&self, command: Document) -> DocStoreResult<Document> {
        if self.faults.fail_command.load(Ordering::SeqCst) {
            return Err(injected_error("command"));
        }
        self.inner.run_command(command).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Files,
    Chunks,
    Other,
}

struct FaultyCollection {
    inner: Arc<dyn Collection>,
    role: Role,
    faults: Arc<Faults>,
}

#[async_trait]
impl Collection for FaultyCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert(&self, document: Document, options: &WriteOptions) -> DocStoreResult<()> {
        match self.role {
            Role::Chunks => {
                self.faults.chunk_inserts.fetch_add(1, Ordering::SeqCst);
                let fail_at = self.faults.fail_chunk_n.load(Ordering::SeqCst);
                if fail_at >= 0 && document.get_i64("n") == Some(fail_at) {
                    return Err(injected_error("chunk insert"));
                }
            }
            Role::Files if self.faults.fail_files_insert.load(Ordering::SeqCst) => {
                return Err(injected_error("metadata insert"));
            }
            _ => {}
        }
        self.inner.insert(document, options).await
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> DocStoreResult<Box<dyn Cursor>> {
        self.inner.find(filter, options).await
    }

    async fn remove(&self, filter: Document, options: &RemoveOptions) -> DocStoreResult<u64> {
        match self.role {
            Role::Chunks => {
                self.faults.chunk_removes.fetch_add(1, Ordering::SeqCst);
                if self.faults.fail_chunk_remove.load(Ordering::SeqCst) {
                    return Err(injected_error("chunk remove"));
                }
            }
            Role::Files => {
                self.faults.files_removes.fetch_add(1, Ordering::SeqCst);
                if self.faults.fail_files_remove.load(Ordering::SeqCst) {
                    return Err(injected_error("metadata remove"));
                }
            }
            Role::Other => {}
        }
        self.inner.remove(filter, options).await
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        options: &UpdateOptions,
    ) -> DocStoreResult<u64> {
        self.inner.update(filter, update, options).await
    }

    async fn ensure_index(&self, keys: SortSpec, options: &IndexOptions) -> DocStoreResult<()> {
        self.inner.ensure_index(keys, options).await
    }

    async fn list_indexes(&self) -> DocStoreResult<Vec<IndexSpec>> {
        self.inner.list_indexes().await
    }

    async fn count(&self, filter: Document) -> DocStoreResult<u64> {
        self.inner.count(filter).await
    }

    async fn drop_collection(&self) -> DocStoreResult<()> {
        self.inner.drop_collection().await
    }
}

/// A stream source that yields `data` and then fails every read.
#[allow(dead_code)]
pub struct BrokenStream {
    data: Vec<u8>,
    pos: usize,
}

#[allow(dead_code)]
impl BrokenStream {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }
}

impl AsyncRead for BrokenStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.pos < self.data.len() {
            let n = buf.remaining().min(self.data.len() - self.pos);
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            return Poll::Ready(Ok(()));
        }
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "stream reset",
        )))
    }
}
