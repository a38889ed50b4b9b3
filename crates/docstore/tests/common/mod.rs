pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{chunk_document, chunk_index_keys, seeded_bytes};
