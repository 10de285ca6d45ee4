//! Storage backend implementations.
//!
//! Three interchangeable backends:
//! - Memory
//! - File (JSON)
//! - Cached (memory in front of another backend)

pub mod cached;
pub mod file;
pub mod memory;

pub use cached::CachedStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
