//! Storage backend configuration.
//!
//! Configuration-driven backend selection.

use crate::storage::backend::StorageBackendType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type to use
    pub backend: StorageBackendType,
    /// File-specific config
    pub file: Option<FileStorageConfig>,
    /// Cache-specific config
    pub cached: Option<CachedStorageConfig>,
}

impl StorageConfig {
    /// In-memory storage.
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendType::Memory,
            file: None,
            cached: None,
        }
    }

    /// JSON files under `directory`.
    pub fn file(directory: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendType::File,
            file: Some(FileStorageConfig {
                directory: directory.into(),
            }),
            cached: None,
        }
    }

    /// Memory cache in front of JSON files under `directory`.
    pub fn cached_file(directory: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendType::Cached,
            file: Some(FileStorageConfig {
                directory: directory.into(),
            }),
            cached: Some(CachedStorageConfig {
                backend: StorageBackendType::File,
            }),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

/// File backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding one `<id>.json` per plugin
    pub directory: PathBuf,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/plugins"),
        }
    }
}

/// Cached backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedStorageConfig {
    /// Backend behind the cache
    pub backend: StorageBackendType,
}

impl Default for CachedStorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::File,
        }
    }
}
