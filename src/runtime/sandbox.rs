//! Sandbox capability.
//!
//! The manager admits every plugin into a sandbox before it can run and
//! removes it on unload.

use crate::core::{now, Error, Result, Timestamp};
use crate::loader::PluginMetadata;
use crate::runtime::info::ResourceUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Sandbox configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum admitted plugins
    pub max_plugins: usize,
    /// Memory ceiling per plugin
    pub max_memory_bytes: u64,
    /// Permissions plugins may request; empty allows any
    pub allowed_permissions: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_plugins: 64,
            max_memory_bytes: 512 * 1024 * 1024,
            allowed_permissions: Vec::new(),
        }
    }
}

/// Isolation boundary for loaded plugins.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Admit a plugin.
    async fn initialize_plugin(&self, metadata: &PluginMetadata) -> Result<()>;

    /// Release a plugin.
    async fn remove_plugin(&self, plugin_id: &str) -> Result<()>;

    /// Admitted plugin ids.
    async fn plugins(&self) -> Vec<String>;

    /// Check a usage sample against limits.
    async fn check_usage(&self, _plugin_id: &str, _usage: &ResourceUsage) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Admission {
    permissions: Vec<String>,
    admitted_at: Timestamp,
}

/// Sandbox that runs plugins in-process and enforces config limits.
pub struct InProcessSandbox {
    config: SandboxConfig,
    admitted: RwLock<HashMap<String, Admission>>,
}

impl InProcessSandbox {
    /// Create a sandbox.
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            admitted: RwLock::new(HashMap::new()),
        }
    }

    /// Permissions granted to an admitted plugin.
    pub async fn permissions(&self, plugin_id: &str) -> Option<Vec<String>> {
        self.admitted
            .read()
            .await
            .get(plugin_id)
            .map(|a| a.permissions.clone())
    }
}

impl Default for InProcessSandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

#[async_trait]
impl Sandbox for InProcessSandbox {
    async fn initialize_plugin(&self, metadata: &PluginMetadata) -> Result<()> {
        if !self.config.allowed_permissions.is_empty() {
            let denied: Vec<&str> = metadata
                .permissions
                .iter()
                .filter(|p| !self.config.allowed_permissions.contains(p))
                .map(String::as_str)
                .collect();
            if !denied.is_empty() {
                return Err(Error::Sandbox(format!(
                    "plugin {} requests denied permission(s): {}",
                    metadata.id,
                    denied.join(", ")
                )));
            }
        }

        let mut admitted = self.admitted.write().await;
        if admitted.contains_key(&metadata.id) {
            return Err(Error::Sandbox(format!("plugin {} already admitted", metadata.id)));
        }
        if admitted.len() >= self.config.max_plugins {
            return Err(Error::Sandbox(format!(
                "sandbox full ({} plugins)",
                self.config.max_plugins
            )));
        }
        admitted.insert(
            metadata.id.clone(),
            Admission {
                permissions: metadata.permissions.clone(),
                admitted_at: now(),
            },
        );
        info!(plugin_id = %metadata.id, "plugin admitted to sandbox");
        Ok(())
    }

    async fn remove_plugin(&self, plugin_id: &str) -> Result<()> {
        let admission = self
            .admitted
            .write()
            .await
            .remove(plugin_id)
            .ok_or_else(|| Error::Sandbox(format!("plugin {plugin_id} not in sandbox")))?;
        debug!(
            plugin_id,
            admitted_for_ms = (now() - admission.admitted_at).num_milliseconds(),
            "plugin removed from sandbox"
        );
        Ok(())
    }

    async fn plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.admitted.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn check_usage(&self, plugin_id: &str, usage: &ResourceUsage) -> Result<()> {
        if usage.memory_bytes > self.config.max_memory_bytes {
            return Err(Error::Sandbox(format!(
                "plugin {plugin_id} uses {} bytes, limit is {}",
                usage.memory_bytes, self.config.max_memory_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admit_and_remove() {
        let sandbox = InProcessSandbox::default();
        let meta = PluginMetadata::new("fmt", "Formatter", "1.0.0").with_permission("fs.read");

        sandbox.initialize_plugin(&meta).await.unwrap();
        assert_eq!(sandbox.plugins().await, vec!["fmt"]);
        assert_eq!(sandbox.permissions("fmt").await.unwrap(), vec!["fs.read"]);
        assert!(sandbox.initialize_plugin(&meta).await.is_err());

        sandbox.remove_plugin("fmt").await.unwrap();
        assert!(sandbox.plugins().await.is_empty());
        assert!(matches!(
            sandbox.remove_plugin("fmt").await,
            Err(Error::Sandbox(_))
        ));
    }

    #[tokio::test]
    async fn test_plugin_cap() {
        let sandbox = InProcessSandbox::new(SandboxConfig {
            max_plugins: 1,
            ..Default::default()
        });
        sandbox
            .initialize_plugin(&PluginMetadata::new("a", "A", "1"))
            .await
            .unwrap();
        assert!(matches!(
            sandbox.initialize_plugin(&PluginMetadata::new("b", "B", "1")).await,
            Err(Error::Sandbox(_))
        ));
    }

    #[tokio::test]
    async fn test_permission_allowlist() {
        let sandbox = InProcessSandbox::new(SandboxConfig {
            allowed_permissions: vec!["fs.read".to_string()],
            ..Default::default()
        });
        let writer = PluginMetadata::new("w", "Writer", "1").with_permission("fs.write");
        let err = sandbox.initialize_plugin(&writer).await.unwrap_err();
        assert!(err.to_string().contains("fs.write"));
        assert!(sandbox.plugins().await.is_empty());
    }

    #[tokio::test]
    async fn test_memory_limit() {
        let sandbox = InProcessSandbox::new(SandboxConfig {
            max_memory_bytes: 100,
            ..Default::default()
        });
        let usage = ResourceUsage {
            memory_bytes: 101,
            ..Default::default()
        };
        assert!(sandbox.check_usage("p", &usage).await.is_err());
        assert!(sandbox.check_usage("p", &ResourceUsage::default()).await.is_ok());
    }
}
