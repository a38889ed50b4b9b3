//! Document store backends.

pub mod memory;
