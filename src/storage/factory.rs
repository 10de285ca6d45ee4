//! Backend factory.
//!
//! Creates storage backends based on configuration.

use crate::core::Result;
use crate::storage::backend::{PluginStorage, StorageBackendType};
use crate::storage::backends::{CachedStorage, FileStorage, MemoryStorage};
use crate::storage::config::StorageConfig;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Create a storage backend from configuration.
///
/// Returns BoxFuture to handle recursion with CachedStorage.
pub fn create_storage(config: &StorageConfig) -> BoxFuture<'_, Result<Arc<dyn PluginStorage>>> {
    let config = config.clone();
    Box::pin(async move {
        match config.backend {
            StorageBackendType::Memory => {
                Ok(Arc::new(MemoryStorage::new()) as Arc<dyn PluginStorage>)
            }
            StorageBackendType::File => {
                let file_config = config.file.clone().unwrap_or_default();
                let backend = FileStorage::new(file_config).await?;
                Ok(Arc::new(backend) as Arc<dyn PluginStorage>)
            }
            StorageBackendType::Cached => {
                let backend = CachedStorage::from_config(&config).await?;
                Ok(Arc::new(backend) as Arc<dyn PluginStorage>)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_memory() {
        let backend = create_storage(&StorageConfig::memory()).await.unwrap();
        assert_eq!(backend.backend_type(), StorageBackendType::Memory);
    }

    #[tokio::test]
    async fn test_factory_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = create_storage(&StorageConfig::file(dir.path())).await.unwrap();
        assert_eq!(backend.backend_type(), StorageBackendType::File);
    }

    #[tokio::test]
    async fn test_factory_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = create_storage(&StorageConfig::cached_file(dir.path()))
            .await
            .unwrap();
        assert_eq!(backend.backend_type(), StorageBackendType::Cached);
        assert!(backend.health_check().await.unwrap());
    }
}
