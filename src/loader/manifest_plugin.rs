//! Configuration-driven plugin backed by a manifest directory.

use crate::core::{now, Error, JsonMap, Result, Timestamp};
use crate::loader::instance::{InstanceStatus, PluginInstance};
use crate::loader::manifest::PluginMetadata;
use crate::registry::PluginEvent;
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

/// Internal state of a manifest plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestState {
    /// Not initialized
    Unloaded,
    /// Configured, not started
    Initialized,
    /// Serving
    Running,
    /// Stopped after running
    Stopped,
}

impl std::fmt::Display for ManifestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestState::Unloaded => write!(f, "unloaded"),
            ManifestState::Initialized => write!(f, "initialized"),
            ManifestState::Running => write!(f, "running"),
            ManifestState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Plugin whose behavior comes entirely from its manifest and configuration.
pub struct ManifestPlugin {
    metadata: PluginMetadata,
    directory: PathBuf,
    state: ManifestState,
    /// Manifest config overlaid with the initialize config
    config: JsonMap,
    events_handled: u64,
    items_processed: u64,
    started_at: Option<Timestamp>,
}

impl ManifestPlugin {
    /// Create an unloaded instance.
    pub fn new(metadata: PluginMetadata, directory: PathBuf) -> Self {
        Self {
            metadata,
            directory,
            state: ManifestState::Unloaded,
            config: JsonMap::new(),
            events_handled: 0,
            items_processed: 0,
            started_at: None,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ManifestState {
        self.state
    }

    /// Get the effective configuration.
    pub fn config(&self) -> &JsonMap {
        &self.config
    }

    fn invalid(&self, action: &str) -> Error {
        Error::InvalidState {
            plugin_id: self.metadata.id.clone(),
            state: self.state.to_string(),
            action: action.to_string(),
        }
    }

    fn require_running(&self, action: &str) -> Result<()> {
        if self.state == ManifestState::Running {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }
}

#[async_trait]
impl PluginInstance for ManifestPlugin {
    fn get_metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&mut self, config: &JsonMap) -> Result<()> {
        if self.state != ManifestState::Unloaded {
            return Err(self.invalid("initialize"));
        }
        self.config = self.metadata.config.clone();
        self.config
            .extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.state = ManifestState::Initialized;
        debug!(plugin_id = %self.metadata.id, directory = %self.directory.display(), "manifest plugin initialized");
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        match self.state {
            ManifestState::Initialized | ManifestState::Stopped => {
                self.state = ManifestState::Running;
                self.started_at = Some(now());
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.require_running("stop")?;
        self.state = ManifestState::Stopped;
        self.started_at = None;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.state = ManifestState::Unloaded;
        self.config.clear();
        self.started_at = None;
        Ok(())
    }

    async fn get_status(&self) -> InstanceStatus {
        let running = self.state == ManifestState::Running;
        let mut details = JsonMap::new();
        details.insert("state".to_string(), json!(self.state.to_string()));
        details.insert("events_handled".to_string(), json!(self.events_handled));
        details.insert("items_processed".to_string(), json!(self.items_processed));
        if let Some(started_at) = self.started_at {
            details.insert("started_at".to_string(), json!(started_at.to_rfc3339()));
        }

        InstanceStatus {
            running,
            cpu_percent: 0.0,
            memory_bytes: serde_json::to_vec(&self.config).map_or(0, |v| v.len() as u64),
            workers: usize::from(running),
            details,
        }
    }

    async fn handle_event(&mut self, event: &PluginEvent) -> Result<()> {
        self.require_running("handle events")?;
        self.events_handled += 1;
        debug!(plugin_id = %self.metadata.id, event_type = %event.event_type, "event handled");
        Ok(())
    }

    async fn process_data(&mut self, data: serde_json::Value) -> Result<serde_json::Value> {
        self.require_running("process data")?;
        self.items_processed += 1;
        Ok(json!({
            "plugin_id": self.metadata.id,
            "version": self.metadata.version,
            "config": self.config,
            "data": data,
        }))
    }
}
