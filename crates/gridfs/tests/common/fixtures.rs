use bytes::Bytes;
use gridstore_core::{ChunkPayload, FileStoreConfig, Value, doc};
use gridstore_docstore::{Database, FindOptions, MemoryDatabase, SortOrder};
use gridstore_gridfs::FileStore;
use std::sync::Arc;

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A store over a fresh in-memory database, returned with the database so
/// tests can inspect the collections directly.
#[allow(dead_code)]
pub fn memory_store(config: FileStoreConfig) -> (Arc<MemoryDatabase>, FileStore) {
    let db = Arc::new(MemoryDatabase::default());
    let store = FileStore::new(db.clone(), config).expect("valid config");
    (db, store)
}

/// Payload lengths of a file's chunks in ascending `n`, checking that `n`
/// runs 0, 1, 2, ... without gaps.
#[allow(dead_code)]
pub async fn chunk_lengths(db: &dyn Database, prefix: &str, files_id: &Value) -> Vec<usize> {
    let mut cursor = db
        .collection(&format!("{prefix}.chunks"))
        .find(
            doc! { "files_id" => files_id.clone() },
            FindOptions::sorted_by("n", SortOrder::Ascending),
        )
        .await
        .expect("find chunks");

    let mut lengths = Vec::new();
    while let Some(document) = cursor.next().await.expect("next chunk") {
        assert_eq!(
            document.get_i64("n"),
            Some(lengths.len() as i64),
            "chunk sequence has a gap or duplicate"
        );
        let payload = document
            .get("data")
            .and_then(ChunkPayload::from_value)
            .expect("chunk payload");
        lengths.push(payload.len());
    }
    lengths
}

#[allow(dead_code)]
pub async fn count_chunks(db: &dyn Database, prefix: &str, files_id: &Value) -> u64 {
    db.collection(&format!("{prefix}.chunks"))
        .count(doc! { "files_id" => files_id.clone() })
        .await
        .expect("count chunks")
}

#[allow(dead_code)]
pub async fn count_files(db: &dyn Database, prefix: &str, id: &Value) -> u64 {
    db.collection(&format!("{prefix}.files"))
        .count(doc! { "_id" => id.clone() })
        .await
        .expect("count files")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }
}
