//! Manager bookkeeping records.

use crate::core::{now, Timestamp};
use crate::loader::{InstanceStatus, PluginMetadata};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state tracked by the manager.
///
/// `Unloaded → Loaded → Running ⇄ Stopped → Unloaded`, with `Error` reachable
/// from a failed start or stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Not in the manager
    #[default]
    Unloaded,
    /// Loaded and initialized
    Loaded,
    /// Serving
    Running,
    /// Stopped after running
    Stopped,
    /// Last start or stop failed
    Error,
}

impl PluginState {
    /// True if `start` is legal from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, PluginState::Loaded | PluginState::Stopped | PluginState::Error)
    }

    /// True if `stop` is legal from this state.
    pub fn can_stop(&self) -> bool {
        matches!(self, PluginState::Running | PluginState::Error)
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Unloaded => write!(f, "unloaded"),
            PluginState::Loaded => write!(f, "loaded"),
            PluginState::Running => write!(f, "running"),
            PluginState::Stopped => write!(f, "stopped"),
            PluginState::Error => write!(f, "error"),
        }
    }
}

/// Resource usage snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU usage percentage
    pub cpu_percent: f64,
    /// Memory in bytes
    pub memory_bytes: u64,
    /// Active workers
    pub workers: usize,
    /// When the snapshot was taken
    pub updated_at: Option<Timestamp>,
}

impl From<&InstanceStatus> for ResourceUsage {
    fn from(status: &InstanceStatus) -> Self {
        Self {
            cpu_percent: status.cpu_percent,
            memory_bytes: status.memory_bytes,
            workers: status.workers,
            updated_at: Some(now()),
        }
    }
}

/// Bookkeeping for one loaded plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Manifest metadata
    pub metadata: PluginMetadata,
    /// Path the plugin was loaded from
    pub path: PathBuf,
    /// Native module or manifest directory
    pub native: bool,
    /// Lifecycle state
    pub state: PluginState,
    /// Load time
    pub loaded_at: Timestamp,
    /// Last successful start
    pub started_at: Option<Timestamp>,
    /// Last successful stop
    pub stopped_at: Option<Timestamp>,
    /// Last start or stop failure
    pub last_error: Option<String>,
    /// Last sampled resource usage
    pub resources: ResourceUsage,
}

impl PluginInfo {
    /// Bookkeeping for a freshly loaded plugin.
    pub fn loaded(metadata: PluginMetadata, path: PathBuf, native: bool) -> Self {
        Self {
            metadata,
            path,
            native,
            state: PluginState::Loaded,
            loaded_at: now(),
            started_at: None,
            stopped_at: None,
            last_error: None,
            resources: ResourceUsage::default(),
        }
    }

    /// Plugin ID.
    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(PluginState::Loaded.can_start());
        assert!(PluginState::Stopped.can_start());
        assert!(PluginState::Error.can_start());
        assert!(!PluginState::Running.can_start());

        assert!(PluginState::Running.can_stop());
        assert!(PluginState::Error.can_stop());
        assert!(!PluginState::Loaded.can_stop());
        assert!(!PluginState::Stopped.can_stop());
    }

    #[test]
    fn test_loaded_info() {
        let info = PluginInfo::loaded(
            PluginMetadata::new("fmt", "Formatter", "1.0.0"),
            PathBuf::from("/plugins/fmt"),
            false,
        );
        assert_eq!(info.id(), "fmt");
        assert_eq!(info.state, PluginState::Loaded);
        assert!(info.resources.updated_at.is_none());
        assert_eq!(PluginState::Error.to_string(), "error");
    }
}
