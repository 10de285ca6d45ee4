//! Plugin → service-discovery bridge.
//!
//! Rebuilds a [`ServiceInfo`] from a [`PluginRegistration`] each time a plugin
//! is bridged, and pushes it to a generic [`ServiceRegistry`].

use crate::bridge::service::{ServiceHealth, ServiceInfo, ServiceRegistry};
use crate::core::{now, Error, Result};
use crate::model::{HealthStatus, PluginRegistration, PluginStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata key marking services that originate from plugins.
pub const SOURCE_KEY: &str = "source";
/// Metadata value for [`SOURCE_KEY`].
pub const SOURCE_PLUGIN: &str = "plugin";

/// Bridge configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge registrations into service discovery
    pub enabled: bool,
    /// Address used when the plugin config has none
    pub default_address: String,
    /// Port used when the plugin config has none
    pub default_port: u16,
    /// Tag added to every bridged service
    pub service_tag: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_address: "localhost".to_string(),
            default_port: 8080,
            service_tag: "plugin".to_string(),
        }
    }
}

/// Result of a bulk sync.
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    /// Plugins pushed successfully
    pub synced: usize,
    /// Plugin id and error for each failure
    pub failed: Vec<(String, String)>,
}

/// Keeps service discovery in step with plugin registrations.
pub struct ServiceRegistryBridge {
    registry: Arc<dyn ServiceRegistry>,
    config: BridgeConfig,
}

impl ServiceRegistryBridge {
    /// Create a bridge over a service registry.
    pub fn new(registry: Arc<dyn ServiceRegistry>, config: BridgeConfig) -> Self {
        Self { registry, config }
    }

    /// Get the underlying service registry.
    pub fn service_registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    /// Map a plugin status to service health.
    pub fn health_for_status(status: PluginStatus) -> ServiceHealth {
        match status {
            PluginStatus::Active => ServiceHealth::Passing,
            PluginStatus::Registered | PluginStatus::Inactive | PluginStatus::Maintenance => {
                ServiceHealth::Warning
            }
            PluginStatus::Deprecated | PluginStatus::Unregistered => ServiceHealth::Critical,
        }
    }

    /// Health for a registration: an explicit snapshot wins over status.
    pub fn health_for(reg: &PluginRegistration) -> ServiceHealth {
        match reg.health.as_ref().map(|h| h.status) {
            Some(HealthStatus::Healthy) => ServiceHealth::Passing,
            Some(HealthStatus::Degraded) => ServiceHealth::Warning,
            Some(HealthStatus::Unhealthy) => ServiceHealth::Critical,
            Some(HealthStatus::Unknown) | None => Self::health_for_status(reg.status),
        }
    }

    /// Build the service record for a registration.
    pub fn to_service_info(&self, reg: &PluginRegistration) -> ServiceInfo {
        let address = reg
            .config
            .get("address")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_address.clone());

        let port = reg
            .config
            .get("port")
            .and_then(|v| match v {
                serde_json::Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
                serde_json::Value::String(s) => s.trim().parse::<u16>().ok(),
                _ => None,
            })
            .filter(|p| *p != 0)
            .unwrap_or(self.config.default_port);

        let mut tags = vec![self.config.service_tag.clone()];
        tags.extend(reg.tags.iter().cloned());
        if !reg.category.is_empty() {
            tags.push(format!("category:{}", reg.category));
        }
        tags.push(format!("version:{}", reg.version));

        let mut metadata = HashMap::new();
        metadata.insert(SOURCE_KEY.to_string(), SOURCE_PLUGIN.to_string());
        metadata.insert("plugin_id".to_string(), reg.id.clone());
        metadata.insert("version".to_string(), reg.version.clone());
        metadata.insert("status".to_string(), reg.status.to_string());
        if !reg.author.is_empty() {
            metadata.insert("author".to_string(), reg.author.clone());
        }
        if !reg.category.is_empty() {
            metadata.insert("category".to_string(), reg.category.clone());
        }

        ServiceInfo {
            id: reg.id.clone(),
            name: reg.name.clone(),
            address,
            port,
            tags,
            metadata,
            health: Self::health_for(reg),
            registered_at: reg.registered_at,
            updated_at: now(),
            last_heartbeat: None,
        }
    }

    /// Register the plugin's service, replacing an existing record.
    pub async fn register_plugin(&self, reg: &PluginRegistration) -> Result<ServiceInfo> {
        let info = self.to_service_info(reg);
        let existing = self.registry.get_service(&reg.id).await.is_ok();
        let pushed = if existing {
            self.registry.update(info.clone()).await
        } else {
            self.registry.register(info.clone()).await
        };
        pushed.map_err(|e| Error::Bridge(format!("register service {}: {e}", reg.id)))?;
        debug!(plugin_id = %reg.id, endpoint = %info.endpoint(), "plugin bridged to service discovery");
        Ok(info)
    }

    /// Remove the plugin's service.
    pub async fn deregister_plugin(&self, plugin_id: &str) -> Result<()> {
        self.registry
            .deregister(plugin_id)
            .await
            .map_err(|e| Error::Bridge(format!("deregister service {plugin_id}: {e}")))
    }

    /// Push the current state of a registration.
    pub async fn update_plugin(&self, reg: &PluginRegistration) -> Result<ServiceInfo> {
        let info = self.to_service_info(reg);
        match self.registry.update(info.clone()).await {
            Ok(()) => Ok(info),
            Err(e) if e.is_not_found() => self.register_plugin(reg).await,
            Err(e) => Err(Error::Bridge(format!("update service {}: {e}", reg.id))),
        }
    }

    /// Push only the health derived from a registration.
    pub async fn sync_health(&self, reg: &PluginRegistration) -> Result<()> {
        self.registry
            .update_health(&reg.id, Self::health_for(reg))
            .await
            .map_err(|e| Error::Bridge(format!("update health {}: {e}", reg.id)))
    }

    /// Forward a heartbeat.
    pub async fn heartbeat(&self, plugin_id: &str) -> Result<()> {
        self.registry
            .heartbeat(plugin_id)
            .await
            .map_err(|e| Error::Bridge(format!("heartbeat {plugin_id}: {e}")))
    }

    /// The bridged service of one plugin.
    pub async fn get_plugin_service(&self, plugin_id: &str) -> Result<ServiceInfo> {
        self.registry.get_service(plugin_id).await
    }

    /// All services that came from plugins.
    pub async fn list_plugin_services(&self) -> Result<Vec<ServiceInfo>> {
        Ok(self
            .registry
            .list_services()
            .await?
            .into_iter()
            .filter(|s| s.metadata.get(SOURCE_KEY).map(String::as_str) == Some(SOURCE_PLUGIN))
            .collect())
    }

    /// Re-bridge every registration, collecting failures.
    pub async fn sync_all(&self, registrations: &[PluginRegistration]) -> SyncReport {
        let mut report = SyncReport::default();
        for reg in registrations {
            match self.update_plugin(reg).await {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    warn!(plugin_id = %reg.id, error = %e, "service sync failed");
                    report.failed.push((reg.id.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::memory::InMemoryServiceRegistry;
    use crate::model::PluginHealth;

    fn bridge() -> ServiceRegistryBridge {
        ServiceRegistryBridge::new(
            Arc::new(InMemoryServiceRegistry::new()),
            BridgeConfig::default(),
        )
    }

    #[test]
    fn test_defaults_to_localhost_8080() {
        let reg = PluginRegistration::new("p1", "Formatter", "1.0.0");
        let info = bridge().to_service_info(&reg);
        assert_eq!(info.endpoint(), "localhost:8080");
        assert_eq!(info.health, ServiceHealth::Warning);
        assert!(info.tags.contains(&"plugin".to_string()));
        assert_eq!(info.metadata["source"], "plugin");
    }

    #[test]
    fn test_address_and_port_from_config() {
        let reg = PluginRegistration::new("p1", "Formatter", "1.0.0")
            .with_config("address", serde_json::json!("10.0.0.5"))
            .with_config("port", serde_json::json!("9090"));
        assert_eq!(bridge().to_service_info(&reg).endpoint(), "10.0.0.5:9090");

        let reg = reg.with_config("port", serde_json::json!(70000));
        assert_eq!(bridge().to_service_info(&reg).port, 8080);
    }

    #[test]
    fn test_health_snapshot_overrides_status() {
        let mut reg = PluginRegistration::new("p1", "F", "1").with_status(PluginStatus::Active);
        assert_eq!(ServiceRegistryBridge::health_for(&reg), ServiceHealth::Passing);

        reg.health = Some(PluginHealth::new(HealthStatus::Unhealthy));
        assert_eq!(ServiceRegistryBridge::health_for(&reg), ServiceHealth::Critical);
    }

    #[tokio::test]
    async fn test_register_update_deregister() {
        let bridge = bridge();
        let reg = PluginRegistration::new("p1", "Formatter", "1.0.0").with_category("tools");
        bridge.register_plugin(&reg).await.unwrap();

        let active = reg.clone().with_status(PluginStatus::Active);
        bridge.update_plugin(&active).await.unwrap();
        let service = bridge.get_plugin_service("p1").await.unwrap();
        assert_eq!(service.health, ServiceHealth::Passing);
        assert_eq!(service.metadata["status"], "active");

        bridge.deregister_plugin("p1").await.unwrap();
        assert!(bridge.list_plugin_services().await.unwrap().is_empty());
        assert!(matches!(
            bridge.deregister_plugin("p1").await,
            Err(Error::Bridge(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_all_and_foreign_services() {
        let bridge = bridge();
        let mut foreign = bridge.to_service_info(&PluginRegistration::new("db", "Postgres", "16"));
        foreign.metadata.clear();
        bridge.service_registry().register(foreign).await.unwrap();

        let regs = vec![
            PluginRegistration::new("p1", "A", "1.0.0"),
            PluginRegistration::new("p2", "B", "1.0.0"),
        ];
        let report = bridge.sync_all(&regs).await;
        assert_eq!(report.synced, 2);
        assert!(report.failed.is_empty());
        assert_eq!(bridge.list_plugin_services().await.unwrap().len(), 2);
    }
}
