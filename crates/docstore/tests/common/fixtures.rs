use bytes::Bytes;
use gridstore_core::{Binary, Document, Value, doc};
use gridstore_docstore::SortOrder;

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

/// A chunk document in the persisted layout.
#[allow(dead_code)]
pub fn chunk_document(files_id: impl Into<Value>, n: i32, data: Bytes) -> Document {
    doc! {
        "files_id" => files_id.into(),
        "n" => n,
        "data" => Binary::generic(data),
    }
}

/// Keys of the compound chunk index.
#[allow(dead_code)]
pub fn chunk_index_keys() -> Vec<(String, SortOrder)> {
    vec![
        ("files_id".to_string(), SortOrder::Ascending),
        ("n".to_string(), SortOrder::Ascending),
    ]
}
