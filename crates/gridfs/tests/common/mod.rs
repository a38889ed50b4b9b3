pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{
    chunk_lengths, count_chunks, count_files, init_tracing, memory_store, seeded_bytes,
};
#[allow(unused_imports)]
pub use mocks::{BrokenStream, FaultyDatabase, Faults, INJECTED_CODE, injected_error};
