//! Cached backend implementation.
//!
//! Combines two tiers:
//! - Cache: in-memory, serves point reads
//! - Backend: system of durable record, serves listings and searches
//!
//! Mutations write through to the backend first, then to the cache.

use crate::core::{Error, Result};
use crate::model::{PluginFilter, PluginMetrics, PluginRegistration, PluginStatus};
use crate::storage::backend::{PluginStorage, StorageBackendType};
use crate::storage::backends::memory::MemoryStorage;
use crate::storage::config::StorageConfig;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Memory cache in front of another storage backend.
pub struct CachedStorage {
    /// Fast tier
    cache: MemoryStorage,
    /// Durable tier
    backend: Arc<dyn PluginStorage>,
}

impl CachedStorage {
    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn PluginStorage>) -> Self {
        Self {
            cache: MemoryStorage::new(),
            backend,
        }
    }

    /// Build the backend described by `full_config.cached` and wrap it.
    pub async fn from_config(full_config: &StorageConfig) -> Result<Self> {
        use crate::storage::factory::create_storage;

        let inner = full_config.cached.clone().unwrap_or_default();
        if inner.backend == StorageBackendType::Cached {
            return Err(Error::Internal("Cannot nest cached storage backends".to_string()));
        }

        let mut sub_config = full_config.clone();
        sub_config.backend = inner.backend;
        sub_config.cached = None;

        let backend = create_storage(&sub_config).await?;
        Ok(Self::new(backend))
    }

    /// Get the wrapped backend.
    pub fn backend(&self) -> &Arc<dyn PluginStorage> {
        &self.backend
    }

    /// Re-read an entry from the backend into the cache.
    async fn refresh(&self, id: &str) -> Result<()> {
        let fresh = self.backend.get(id).await?;
        self.cache.save(&fresh).await
    }
}

#[async_trait]
impl PluginStorage for CachedStorage {
    async fn save(&self, registration: &PluginRegistration) -> Result<()> {
        self.backend.save(registration).await?;
        self.cache.save(registration).await
    }

    async fn get(&self, id: &str) -> Result<PluginRegistration> {
        match self.cache.get(id).await {
            Ok(reg) => Ok(reg),
            Err(e) if e.is_not_found() => {
                debug!(plugin_id = %id, "cache miss");
                let reg = self.backend.get(id).await?;
                self.cache.save(&reg).await?;
                Ok(reg)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self.backend.delete(id).await;
        // Evict even when the backend delete failed.
        self.cache.evict(id).await;
        result
    }

    async fn list(&self, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
        self.backend.list(filter).await
    }

    async fn update(&self, registration: &PluginRegistration) -> Result<()> {
        self.backend.update(registration).await?;
        self.cache.save(registration).await
    }

    async fn update_status(&self, id: &str, status: PluginStatus) -> Result<()> {
        self.backend.update_status(id, status).await?;
        self.refresh(id).await
    }

    async fn update_metrics(&self, id: &str, metrics: &PluginMetrics) -> Result<()> {
        self.backend.update_metrics(id, metrics).await?;
        self.refresh(id).await
    }

    async fn get_by_endpoint(&self, endpoint: &str) -> Result<PluginRegistration> {
        self.backend.get_by_endpoint(endpoint).await
    }

    async fn search(&self, query: &str, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
        self.backend.search(query, filter).await
    }

    async fn close(&self) -> Result<()> {
        self.cache.close().await?;
        self.backend.close().await
    }

    fn backend_type(&self) -> StorageBackendType {
        StorageBackendType::Cached
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.cache.health_check().await? && self.backend.health_check().await?)
    }

    async fn count(&self) -> Result<usize> {
        self.backend.count().await
    }
}
