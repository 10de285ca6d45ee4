//! Storage Layer
//!
//! Trait-based registration persistence supporting:
//! - In-memory map
//! - One JSON file per plugin
//! - Write-through memory cache over either

pub mod backend;
pub mod backends;
pub mod config;
pub mod factory;

pub use backend::{PluginStorage, StorageBackendType};
pub use backends::{CachedStorage, FileStorage, MemoryStorage};
pub use config::{CachedStorageConfig, FileStorageConfig, StorageConfig};
pub use factory::create_storage;
