//! PluginStorage trait definition.
//!
//! Core trait that all storage backends must implement.

use crate::core::Result;
use crate::model::{PluginFilter, PluginMetrics, PluginRegistration, PluginStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Backend type identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendType {
    /// In-process map
    Memory,
    /// One JSON file per plugin
    File,
    /// Memory cache in front of another backend
    Cached,
}

impl std::fmt::Display for StorageBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendType::Memory => write!(f, "memory"),
            StorageBackendType::File => write!(f, "file"),
            StorageBackendType::Cached => write!(f, "cached"),
        }
    }
}

/// Core trait for registration storage.
///
/// Lookups of unknown ids fail with `Error::NotFound`. Filter semantics are
/// those of [`PluginFilter::matches`] for every implementation.
#[async_trait]
pub trait PluginStorage: Send + Sync {
    /// Insert or replace a registration.
    async fn save(&self, registration: &PluginRegistration) -> Result<()>;

    /// Read a registration by id.
    async fn get(&self, id: &str) -> Result<PluginRegistration>;

    /// Delete a registration.
    async fn delete(&self, id: &str) -> Result<()>;

    /// List registrations matching a filter, ordered by id.
    async fn list(&self, filter: &PluginFilter) -> Result<Vec<PluginRegistration>>;

    /// Replace an existing registration.
    async fn update(&self, registration: &PluginRegistration) -> Result<()>;

    /// Set the status of an existing registration.
    async fn update_status(&self, id: &str, status: PluginStatus) -> Result<()>;

    /// Set the metrics of an existing registration.
    async fn update_metrics(&self, id: &str, metrics: &PluginMetrics) -> Result<()>;

    /// Find the registration exposing an endpoint path.
    async fn get_by_endpoint(&self, endpoint: &str) -> Result<PluginRegistration>;

    /// Free-text search, narrowed by a filter.
    async fn search(&self, query: &str, filter: &PluginFilter) -> Result<Vec<PluginRegistration>>;

    /// Release resources. Further calls fail.
    async fn close(&self) -> Result<()>;

    /// Get the backend type.
    fn backend_type(&self) -> StorageBackendType;

    /// Health check for the backend.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Number of stored registrations.
    async fn count(&self) -> Result<usize> {
        Ok(self.list(&PluginFilter::default()).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_display() {
        assert_eq!(StorageBackendType::Memory.to_string(), "memory");
        assert_eq!(StorageBackendType::File.to_string(), "file");
        assert_eq!(StorageBackendType::Cached.to_string(), "cached");
    }

    #[test]
    fn test_backend_type_serde() {
        let json = serde_json::to_string(&StorageBackendType::Cached).unwrap();
        assert_eq!(json, "\"cached\"");
    }
}
