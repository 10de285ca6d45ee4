//! Composition root.
//!
//! [`PluginHub`] builds every component from one [`HubConfig`] and wires them
//! together: storage under the registry, the registry under discovery and the
//! bridge, and the loader and sandbox under the manager.

use crate::bridge::{BridgeConfig, InMemoryServiceRegistry, ServiceRegistryBridge};
use crate::core::{init_logging, Error, LoggingConfig, Result};
use crate::discovery::DiscoveryService;
use crate::loader::{LoaderConfig, NativeModuleTable, PluginLoader};
use crate::model::{PluginFilter, PluginRegistration, PluginStatus};
use crate::registry::{PluginRegistry, RegistryConfig};
use crate::runtime::{InProcessSandbox, ManagerConfig, PluginManager, Sandbox, SandboxConfig};
use crate::storage::{create_storage, StorageConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Configuration for every component.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Logging
    pub logging: LoggingConfig,
    /// Registration storage
    pub storage: StorageConfig,
    /// Registry
    pub registry: RegistryConfig,
    /// Service-discovery bridge
    pub bridge: BridgeConfig,
    /// Sandbox limits
    pub sandbox: SandboxConfig,
    /// Manager
    pub manager: ManagerConfig,
    /// Loader
    pub loader: LoaderConfig,
}

impl HubConfig {
    /// Parse a JSON config. Missing sections take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Validation(format!("hub config: {e}")))
    }

    /// Read a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| e.context(&path.display().to_string()))
    }
}

/// Every component, wired together.
pub struct PluginHub {
    registry: Arc<PluginRegistry>,
    bridge: Option<Arc<ServiceRegistryBridge>>,
    discovery: DiscoveryService,
    loader: Arc<PluginLoader>,
    manager: PluginManager,
}

impl PluginHub {
    /// Build a hub with the native modules shipped in this crate.
    pub async fn from_config(config: HubConfig) -> Result<Self> {
        Self::with_modules(config, NativeModuleTable::builtin()).await
    }

    /// Build a hub with a custom native module table.
    pub async fn with_modules(config: HubConfig, modules: NativeModuleTable) -> Result<Self> {
        init_logging(&config.logging);

        let storage = create_storage(&config.storage).await?;
        let mut registry = PluginRegistry::new(storage, config.registry.clone());
        let bridge = if config.bridge.enabled {
            let bridge = Arc::new(ServiceRegistryBridge::new(
                Arc::new(InMemoryServiceRegistry::new()),
                config.bridge.clone(),
            ));
            registry = registry.with_bridge(bridge.clone());
            Some(bridge)
        } else {
            None
        };
        let registry = Arc::new(registry);

        let restored = registry.load().await?;
        if let (Some(bridge), true) = (&bridge, restored > 0) {
            let report = bridge
                .sync_all(&registry.list(&PluginFilter::new()).await)
                .await;
            if !report.failed.is_empty() {
                warn!(failed = report.failed.len(), "some restored plugins were not bridged");
            }
        }

        let loader = Arc::new(PluginLoader::new(config.loader.clone(), Arc::new(modules)));
        let sandbox: Arc<dyn Sandbox> = Arc::new(InProcessSandbox::new(config.sandbox.clone()));
        let manager = PluginManager::new(loader.clone(), sandbox, config.manager.clone())?;
        let discovery = DiscoveryService::new(registry.clone());

        info!(
            storage = %config.storage.backend,
            bridge = bridge.is_some(),
            restored,
            "plugin hub ready"
        );
        Ok(Self {
            registry,
            bridge,
            discovery,
            loader,
            manager,
        })
    }

    /// Get the registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Get the bridge, if enabled.
    pub fn bridge(&self) -> Option<&Arc<ServiceRegistryBridge>> {
        self.bridge.as_ref()
    }

    /// Get the discovery service.
    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    /// Get the loader.
    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    /// Get the manager.
    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    /// Load, register and start the plugin at `path`, then mark it active.
    ///
    /// A failed registration unloads the plugin again. A failed start leaves it
    /// loaded and registered as inactive so the start can be retried.
    pub async fn install_plugin(&self, path: &Path) -> Result<PluginRegistration> {
        let info = self.manager.load_plugin(path).await?;
        let id = info.metadata.id.clone();

        if let Err(e) = self.registry.register(info.metadata.to_registration()).await {
            if let Err(unload) = self.manager.unload_plugin(&id).await {
                warn!(plugin_id = %id, error = %unload, "unload after failed registration failed");
            }
            return Err(e);
        }

        if let Err(e) = self.manager.start_plugin(&id).await {
            self.registry.update_status(&id, PluginStatus::Inactive).await?;
            return Err(e);
        }

        let reg = self.registry.update_status(&id, PluginStatus::Active).await?;
        info!(plugin_id = %id, version = %reg.version, "plugin installed");
        Ok(reg)
    }

    /// Unload a plugin if it is loaded and remove its registration.
    pub async fn uninstall_plugin(&self, id: &str) -> Result<()> {
        match self.manager.unload_plugin(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.registry.unregister(id).await
    }

    /// Stop every plugin, join the monitor and close the registry.
    pub async fn shutdown(&self) -> Result<()> {
        self.manager.shutdown().await?;
        self.registry.close().await?;
        info!("plugin hub shut down");
        Ok(())
    }
}
