//! In-memory document database.
//!
//! Every collection keeps its documents in insertion order behind a lock.
//! Queries are evaluated locally with [`crate::query`]. Unique indexes are
//! enforced on insert and update, and the `_id` field is always unique.

use crate::error::{COMMAND_NOT_FOUND_CODE, DocStoreError, DocStoreResult};
use crate::query;
use crate::traits::{
    Collection, Cursor, Database, FindOptions, IndexOptions, IndexSpec, RemoveOptions, SortOrder,
    SortSpec, UpdateOptions, WriteOptions,
};
use async_trait::async_trait;
use gridstore_core::chunk::{DATA_FIELD, FILES_ID_FIELD, N_FIELD};
use gridstore_core::file::ID_FIELD;
use gridstore_core::{ChunkPayload, Document, Md5Digest, ObjectId, Value, doc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, instrument};

/// Command computing the digest of a stored file from its chunks.
pub const FILEMD5_COMMAND: &str = "filemd5";

/// Name of the implicit unique index on `_id`.
const ID_INDEX_NAME: &str = "_id_";

/// In-memory database.
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn collection_handle(&self, name: &str) -> Arc<MemoryCollection> {
        {
            let collections = self.collections.read().unwrap_or_else(|poisoned| {
                tracing::warn!("collections RwLock was poisoned, recovering with into_inner()");
                poisoned.into_inner()
            });
            if let Some(collection) = collections.get(name) {
                return collection.clone();
            }
        }

        let mut collections = self.collections.write().unwrap_or_else(|poisoned| {
            tracing::warn!("collections RwLock was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        });
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }

    /// Compute the digest of a file's chunks in `<root>.chunks`.
    ///
    /// Chunks are hashed in increasing `n`; a gap in the sequence or a chunk
    /// without a byte payload fails the command.
    fn file_md5(&self, command: &Document) -> DocStoreResult<Document> {
        let files_id = command
            .get(FILEMD5_COMMAND)
            .cloned()
            .ok_or_else(|| DocStoreError::Command {
                message: "filemd5 requires a file id".to_string(),
                code: None,
            })?;
        let root = command.get_str("root").unwrap_or(gridstore_core::DEFAULT_PREFIX);
        let chunks = self.collection_handle(&format!("{root}.chunks"));

        let mut documents = chunks.select(&doc! { FILES_ID_FIELD => files_id.clone() })?;
        query::sort_documents(&mut documents, &[(N_FIELD.to_string(), SortOrder::Ascending)]);

        let mut hasher = Md5Digest::hasher();
        for (expected, chunk) in documents.iter().enumerate() {
            let n = chunk.get_i64(N_FIELD);
            if n != Some(expected as i64) {
                return Err(DocStoreError::Command {
                    message: format!(
                        "chunks out of order for {files_id}: expected n={expected}, found {}",
                        n.map_or_else(|| "none".to_string(), |n| n.to_string())
                    ),
                    code: None,
                });
            }
            let payload = chunk
                .get(DATA_FIELD)
                .and_then(ChunkPayload::from_value)
                .ok_or_else(|| DocStoreError::Command {
                    message: format!("chunk {expected} of {files_id} has no byte payload"),
                    code: None,
                })?;
            hasher.update(payload.bytes());
        }

        Ok(doc! {
            "md5" => hasher.finalize().to_hex(),
            "numChunks" => documents.len() as i64,
            "ok" => 1.0,
        })
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new("test")
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        self.collection_handle(name)
    }

    #[instrument(skip(self, command), fields(backend = "memory"))]
    async fn run_command(&self, command: Document) -> DocStoreResult<Document> {
        if command.contains_key(FILEMD5_COMMAND) {
            return self.file_md5(&command);
        }
        if command.contains_key("ping") {
            return Ok(doc! { "ok" => 1.0 });
        }
        if let Some(target) = command.get_str("drop") {
            self.collection_handle(target).clear();
            return Ok(doc! { "ok" => 1.0 });
        }

        let names: Vec<_> = command.keys().cloned().collect();
        Err(DocStoreError::Command {
            message: format!("no such command: {}", names.join(", ")),
            code: Some(COMMAND_NOT_FOUND_CODE),
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// A collection held in memory.
pub struct MemoryCollection {
    name: String,
    state: RwLock<CollectionState>,
}

impl MemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CollectionState::default()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.state.read().unwrap_or_else(|poisoned| {
            tracing::warn!("collection RwLock was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.state.write().unwrap_or_else(|poisoned| {
            tracing::warn!("collection RwLock was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        })
    }

    fn select(&self, filter: &Document) -> DocStoreResult<Vec<Document>> {
        let state = self.read_state();
        let mut selected = Vec::new();
        for document in &state.documents {
            if query::matches(document, filter)? {
                selected.push(document.clone());
            }
        }
        Ok(selected)
    }

    fn clear(&self) {
        let mut state = self.write_state();
        state.documents.clear();
        state.indexes.clear();
    }

    /// Unique key tuples that `candidate` must not share with any other document.
    fn unique_keys(indexes: &[IndexSpec], candidate: &Document) -> Vec<(String, Vec<Value>)> {
        let mut keys = vec![(
            ID_INDEX_NAME.to_string(),
            vec![candidate.get(ID_FIELD).cloned().unwrap_or(Value::Null)],
        )];
        for index in indexes.iter().filter(|index| index.unique) {
            keys.push((index.name.clone(), key_tuple(candidate, &index.keys)));
        }
        keys
    }

    /// Check `candidate` against every document except the one at `skip`.
    fn check_unique(
        &self,
        state: &CollectionState,
        candidate: &Document,
        skip: Option<usize>,
    ) -> DocStoreResult<()> {
        for (index_name, tuple) in Self::unique_keys(&state.indexes, candidate) {
            let keys = index_keys(&state.indexes, &index_name);
            let clash = state
                .documents
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, existing)| tuples_equal(&key_tuple(existing, &keys), &tuple));
            if clash {
                return Err(DocStoreError::DuplicateKey {
                    collection: self.name.clone(),
                    key: describe_key(&keys, &tuple),
                });
            }
        }
        Ok(())
    }

    fn insert_locked(&self, state: &mut CollectionState, mut document: Document) -> DocStoreResult<()> {
        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD, ObjectId::new());
        }
        self.check_unique(state, &document, None)?;
        state.documents.push(document);
        Ok(())
    }

    fn remove_locked(
        state: &mut CollectionState,
        filter: &Document,
        just_one: bool,
    ) -> DocStoreResult<u64> {
        let mut doomed = Vec::new();
        for (i, document) in state.documents.iter().enumerate() {
            if query::matches(document, filter)? {
                doomed.push(i);
                if just_one {
                    break;
                }
            }
        }
        let mut position = 0;
        state.documents.retain(|_| {
            let keep = doomed.binary_search(&position).is_err();
            position += 1;
            keep
        });
        Ok(doomed.len() as u64)
    }

    fn update_locked(
        &self,
        state: &mut CollectionState,
        filter: &Document,
        update: &Document,
        options: &UpdateOptions,
    ) -> DocStoreResult<u64> {
        let mut positions = Vec::new();
        for (i, document) in state.documents.iter().enumerate() {
            if query::matches(document, filter)? {
                positions.push(i);
                if !options.multi {
                    break;
                }
            }
        }

        if positions.is_empty() {
            if !options.upsert {
                return Ok(0);
            }
            let mut seed = query::upsert_seed(filter);
            query::apply_update(&mut seed, update)?;
            self.insert_locked(state, seed)?;
            return Ok(1);
        }

        for &i in &positions {
            let mut updated = state.documents[i].clone();
            query::apply_update(&mut updated, update)?;
            self.check_unique(state, &updated, Some(i))?;
            state.documents[i] = updated;
        }
        Ok(positions.len() as u64)
    }
}

fn index_keys(indexes: &[IndexSpec], name: &str) -> SortSpec {
    if name == ID_INDEX_NAME {
        return vec![(ID_FIELD.to_string(), SortOrder::Ascending)];
    }
    indexes
        .iter()
        .find(|index| index.name == name)
        .map(|index| index.keys.clone())
        .unwrap_or_default()
}

fn key_tuple(document: &Document, keys: &[(String, SortOrder)]) -> Vec<Value> {
    keys.iter()
        .map(|(field, _)| query::lookup(document, field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn tuples_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
}

fn describe_key(keys: &[(String, SortOrder)], tuple: &[Value]) -> String {
    let fields: Vec<_> = keys
        .iter()
        .zip(tuple)
        .map(|((field, _), value)| format!("{field}: {value}"))
        .collect();
    format!("{{ {} }}", fields.join(", "))
}

/// Absorb a write error when the caller did not ask for acknowledgement.
fn acknowledge<T: Default>(
    collection: &str,
    options: &WriteOptions,
    result: DocStoreResult<T>,
) -> DocStoreResult<T> {
    match result {
        Err(e) if !options.acknowledged => {
            debug!(collection, error = %e, "Unacknowledged write failed");
            Ok(T::default())
        }
        other => other,
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, document, options), fields(collection = %self.name))]
    async fn insert(&self, document: Document, options: &WriteOptions) -> DocStoreResult<()> {
        let result = {
            let mut state = self.write_state();
            self.insert_locked(&mut state, document)
        };
        acknowledge(&self.name, options, result)
    }

    #[instrument(skip(self, filter, options), fields(collection = %self.name))]
    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> DocStoreResult<Box<dyn Cursor>> {
        let mut documents = self.select(&filter)?;
        query::sort_documents(&mut documents, &options.sort);

        let limit = options.limit.unwrap_or(usize::MAX);
        let documents: VecDeque<_> = documents
            .into_iter()
            .skip(options.skip)
            .take(limit)
            .map(|document| match &options.projection {
                Some(projection) => query::project(document, projection),
                None => document,
            })
            .collect();

        debug!(results = documents.len(), "Query evaluated");
        Ok(Box::new(MemoryCursor { documents }))
    }

    #[instrument(skip(self, filter, options), fields(collection = %self.name))]
    async fn remove(&self, filter: Document, options: &RemoveOptions) -> DocStoreResult<u64> {
        let result = {
            let mut state = self.write_state();
            Self::remove_locked(&mut state, &filter, options.just_one)
        };
        acknowledge(&self.name, &options.write, result)
    }

    #[instrument(skip(self, filter, update, options), fields(collection = %self.name))]
    async fn update(
        &self,
        filter: Document,
        update: Document,
        options: &UpdateOptions,
    ) -> DocStoreResult<u64> {
        let result = {
            let mut state = self.write_state();
            self.update_locked(&mut state, &filter, &update, options)
        };
        acknowledge(&self.name, &options.write, result)
    }

    #[instrument(skip(self, keys, options), fields(collection = %self.name))]
    async fn ensure_index(&self, keys: SortSpec, options: &IndexOptions) -> DocStoreResult<()> {
        if keys.is_empty() {
            return Err(DocStoreError::InvalidQuery(
                "index requires at least one key".to_string(),
            ));
        }

        let mut state = self.write_state();
        if state.indexes.iter().any(|index| index.keys == keys) {
            return Ok(());
        }

        let name = options
            .name
            .clone()
            .unwrap_or_else(|| IndexSpec::default_name(&keys));

        if options.unique {
            let mut seen: Vec<Vec<Value>> = Vec::new();
            let mut duplicates = Vec::new();
            for (i, document) in state.documents.iter().enumerate() {
                let tuple = key_tuple(document, &keys);
                if seen.iter().any(|existing| tuples_equal(existing, &tuple)) {
                    if !options.drop_dups {
                        return Err(DocStoreError::DuplicateKey {
                            collection: self.name.clone(),
                            key: describe_key(&keys, &tuple),
                        });
                    }
                    duplicates.push(i);
                } else {
                    seen.push(tuple);
                }
            }
            if !duplicates.is_empty() {
                debug!(index = %name, dropped = duplicates.len(), "Dropped duplicates while building unique index");
                let mut position = 0;
                state.documents.retain(|_| {
                    let keep = duplicates.binary_search(&position).is_err();
                    position += 1;
                    keep
                });
            }
        }

        debug!(index = %name, unique = options.unique, "Created index");
        state.indexes.push(IndexSpec {
            name,
            keys,
            unique: options.unique,
        });
        Ok(())
    }

    async fn list_indexes(&self) -> DocStoreResult<Vec<IndexSpec>> {
        let state = self.read_state();
        let mut indexes = vec![IndexSpec {
            name: ID_INDEX_NAME.to_string(),
            keys: vec![(ID_FIELD.to_string(), SortOrder::Ascending)],
            unique: true,
        }];
        indexes.extend(state.indexes.iter().cloned());
        Ok(indexes)
    }

    async fn count(&self, filter: Document) -> DocStoreResult<u64> {
        Ok(self.select(&filter)?.len() as u64)
    }

    #[instrument(skip(self), fields(collection = %self.name))]
    async fn drop_collection(&self) -> DocStoreResult<()> {
        self.clear();
        Ok(())
    }
}

/// Cursor over a snapshot of query results.
struct MemoryCursor {
    documents: VecDeque<Document>,
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn next(&mut self) -> DocStoreResult<Option<Document>> {
        Ok(self.documents.pop_front())
    }
}
