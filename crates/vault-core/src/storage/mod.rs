//! Storage backends for record persistence
//!
//! This module provides two storage backends:
//! 1. JSON file in the data directory
//! 2. In-memory map

mod traits;
mod file;
mod memory;

pub use traits::RecordStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
