//! Plugin instance contract.
//!
//! Every loaded plugin, native or manifest-described, exposes the same eight
//! operations through [`PluginInstance`].

use crate::core::{JsonMap, Result};
use crate::loader::manifest::PluginMetadata;
use crate::loader::manifest_plugin::ManifestPlugin;
use crate::registry::PluginEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status reported by an instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    /// Instance is serving
    pub running: bool,
    /// CPU usage percentage
    pub cpu_percent: f64,
    /// Resident memory in bytes
    pub memory_bytes: u64,
    /// Active workers
    pub workers: usize,
    /// Free-form details
    #[serde(default)]
    pub details: JsonMap,
}

/// Operations every plugin instance supports.
#[async_trait]
pub trait PluginInstance: Send + Sync {
    /// Identity of the instance.
    fn get_metadata(&self) -> PluginMetadata;

    /// Prepare the instance with its configuration.
    async fn initialize(&mut self, config: &JsonMap) -> Result<()>;

    /// Start serving.
    async fn start(&mut self) -> Result<()>;

    /// Stop serving.
    async fn stop(&mut self) -> Result<()>;

    /// Release everything acquired since initialization.
    async fn cleanup(&mut self) -> Result<()>;

    /// Current status.
    async fn get_status(&self) -> InstanceStatus;

    /// React to a registry or caller event.
    async fn handle_event(&mut self, event: &PluginEvent) -> Result<()>;

    /// Transform a payload.
    async fn process_data(&mut self, data: serde_json::Value) -> Result<serde_json::Value>;
}

/// A loaded plugin of either kind.
pub enum LoadedPlugin {
    /// Built from a native module factory
    Native(Box<dyn PluginInstance>),
    /// Described by a manifest directory
    Manifest(ManifestPlugin),
}

impl LoadedPlugin {
    /// True for native modules.
    pub fn is_native(&self) -> bool {
        matches!(self, LoadedPlugin::Native(_))
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_native() { "Native" } else { "Manifest" };
        f.debug_tuple(kind).field(&self.get_metadata().id).finish()
    }
}

#[async_trait]
impl PluginInstance for LoadedPlugin {
    fn get_metadata(&self) -> PluginMetadata {
        match self {
            LoadedPlugin::Native(p) => p.get_metadata(),
            LoadedPlugin::Manifest(p) => p.get_metadata(),
        }
    }

    async fn initialize(&mut self, config: &JsonMap) -> Result<()> {
        match self {
            LoadedPlugin::Native(p) => p.initialize(config).await,
            LoadedPlugin::Manifest(p) => p.initialize(config).await,
        }
    }

    async fn start(&mut self) -> Result<()> {
        match self {
            LoadedPlugin::Native(p) => p.start().await,
            LoadedPlugin::Manifest(p) => p.start().await,
        }
    }

    async fn stop(&mut self) -> Result<()> {
        match self {
            LoadedPlugin::Native(p) => p.stop().await,
            LoadedPlugin::Manifest(p) => p.stop().await,
        }
    }

    async fn cleanup(&mut self) -> Result<()> {
        match self {
            LoadedPlugin::Native(p) => p.cleanup().await,
            LoadedPlugin::Manifest(p) => p.cleanup().await,
        }
    }

    async fn get_status(&self) -> InstanceStatus {
        match self {
            LoadedPlugin::Native(p) => p.get_status().await,
            LoadedPlugin::Manifest(p) => p.get_status().await,
        }
    }

    async fn handle_event(&mut self, event: &PluginEvent) -> Result<()> {
        match self {
            LoadedPlugin::Native(p) => p.handle_event(event).await,
            LoadedPlugin::Manifest(p) => p.handle_event(event).await,
        }
    }

    async fn process_data(&mut self, data: serde_json::Value) -> Result<serde_json::Value> {
        match self {
            LoadedPlugin::Native(p) => p.process_data(data).await,
            LoadedPlugin::Manifest(p) => p.process_data(data).await,
        }
    }
}
