//! In-memory backend implementation.
//!
//! A map behind a read/write lock. Also the fast tier of the cached backend.

use crate::core::{now, Error, Result};
use crate::model::{matches_text, PluginFilter, PluginMetrics, PluginRegistration, PluginStatus};
use crate::storage::backend::{PluginStorage, StorageBackendType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory registration storage.
#[derive(Default)]
pub struct MemoryStorage {
    /// Registrations by id
    plugins: RwLock<HashMap<String, PluginRegistration>>,
    /// Closed flag
    closed: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Storage("memory storage is closed".to_string()));
        }
        Ok(())
    }

    /// Drop an entry if present. Used by the cache tier.
    pub(crate) async fn evict(&self, id: &str) {
        self.plugins.write().await.remove(id);
    }

    /// Apply `change` to an existing entry.
    async fn modify<F>(&self, id: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut PluginRegistration),
    {
        self.ensure_open()?;
        let mut plugins = self.plugins.write().await;
        let reg = plugins
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        change(reg);
        reg.updated_at = now();
        Ok(())
    }
}

#[async_trait]
impl PluginStorage for MemoryStorage {
    async fn save(&self, registration: &PluginRegistration) -> Result<()> {
        self.ensure_open()?;
        self.plugins
            .write()
            .await
            .insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<PluginRegistration> {
        self.ensure_open()?;
        self.plugins
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        match self.plugins.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    async fn list(&self, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
        self.ensure_open()?;
        let plugins = self.plugins.read().await;
        Ok(filter.select(plugins.values().cloned()))
    }

    async fn update(&self, registration: &PluginRegistration) -> Result<()> {
        self.ensure_open()?;
        let mut plugins = self.plugins.write().await;
        match plugins.get_mut(&registration.id) {
            Some(existing) => {
                *existing = registration.clone();
                Ok(())
            }
            None => Err(Error::NotFound(registration.id.clone())),
        }
    }

    async fn update_status(&self, id: &str, status: PluginStatus) -> Result<()> {
        self.modify(id, |reg| reg.status = status).await
    }

    async fn update_metrics(&self, id: &str, metrics: &PluginMetrics) -> Result<()> {
        let metrics = metrics.clone();
        self.modify(id, move |reg| reg.metrics = Some(metrics)).await
    }

    async fn get_by_endpoint(&self, endpoint: &str) -> Result<PluginRegistration> {
        self.ensure_open()?;
        let plugins = self.plugins.read().await;
        let mut matching: Vec<&PluginRegistration> =
            plugins.values().filter(|r| r.has_endpoint(endpoint)).collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        matching
            .first()
            .map(|r| (*r).clone())
            .ok_or_else(|| Error::NotFound(format!("no plugin serves endpoint {endpoint}")))
    }

    async fn search(&self, query: &str, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
        self.ensure_open()?;
        let plugins = self.plugins.read().await;
        Ok(filter.select(plugins.values().filter(|r| matches_text(r, query)).cloned()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.plugins.write().await.clear();
        Ok(())
    }

    fn backend_type(&self) -> StorageBackendType {
        StorageBackendType::Memory
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.closed.load(Ordering::Acquire))
    }

    async fn count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.plugins.read().await.len())
    }
}
