//! Plugin registration record.
//!
//! The canonical, persisted description of an installable plugin.

use crate::core::{now, Error, JsonMap, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Lifecycle status of a registration.
///
/// `registered → active ⇄ inactive ⇄ maintenance → deprecated → unregistered`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Freshly registered, not yet serving
    #[default]
    Registered,
    /// Serving traffic
    Active,
    /// Temporarily not serving
    Inactive,
    /// Under maintenance
    Maintenance,
    /// Still present, scheduled for removal
    Deprecated,
    /// Removed from the registry
    Unregistered,
}

impl PluginStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [PluginStatus; 6] = [
        PluginStatus::Registered,
        PluginStatus::Active,
        PluginStatus::Inactive,
        PluginStatus::Maintenance,
        PluginStatus::Deprecated,
        PluginStatus::Unregistered,
    ];

    /// Get the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Registered => "registered",
            PluginStatus::Active => "active",
            PluginStatus::Inactive => "inactive",
            PluginStatus::Maintenance => "maintenance",
            PluginStatus::Deprecated => "deprecated",
            PluginStatus::Unregistered => "unregistered",
        }
    }

    /// True if the plugin can serve requests.
    pub fn is_operational(&self) -> bool {
        matches!(self, PluginStatus::Active)
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PluginStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown plugin status '{s}'")))
    }
}

/// Health verdict shared by plugin health snapshots and registry health.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Everything fine
    Healthy,
    /// Partially working
    Degraded,
    /// Not working
    Unhealthy,
    /// Never checked
    #[default]
    Unknown,
}

/// Point-in-time health snapshot of a plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginHealth {
    /// Verdict
    pub status: HealthStatus,
    /// Optional detail
    #[serde(default)]
    pub message: Option<String>,
    /// Response time of the last health check
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    /// When the snapshot was taken
    pub checked_at: Timestamp,
}

impl PluginHealth {
    /// Create a snapshot taken now.
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            message: None,
            response_time_ms: None,
            checked_at: now(),
        }
    }

    /// Set message.
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

/// Usage metrics reported for a plugin.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginMetrics {
    /// Total requests served
    pub request_count: u64,
    /// Failed requests
    pub error_count: u64,
    /// Mean response time
    pub avg_response_time_ms: f64,
    /// Last request time
    pub last_request_at: Option<Timestamp>,
}

impl PluginMetrics {
    /// Metrics with a request count only.
    pub fn with_requests(request_count: u64) -> Self {
        Self {
            request_count,
            ..Default::default()
        }
    }
}

/// An endpoint exposed by a plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEndpoint {
    /// Path or URL
    pub path: String,
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,
    /// Description
    #[serde(default)]
    pub description: String,
}

fn default_method() -> String {
    "GET".to_string()
}

impl PluginEndpoint {
    /// Create a new endpoint.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            description: String::new(),
        }
    }
}

/// The canonical registration record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginRegistration {
    /// Unique, immutable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Semantic version
    pub version: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Author
    #[serde(default)]
    pub author: String,
    /// Category
    #[serde(default)]
    pub category: String,
    /// Tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Granted permissions (capabilities)
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Ids of plugins this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Exposed endpoints
    #[serde(default)]
    pub endpoints: Vec<PluginEndpoint>,
    /// Free-form configuration
    #[serde(default)]
    pub config: JsonMap,
    /// Current status
    #[serde(default)]
    pub status: PluginStatus,
    /// Last health snapshot
    #[serde(default)]
    pub health: Option<PluginHealth>,
    /// Last metrics snapshot
    #[serde(default)]
    pub metrics: Option<PluginMetrics>,
    /// First registration time
    pub registered_at: Timestamp,
    /// Last modification time
    pub updated_at: Timestamp,
    /// Last heartbeat or registration time
    pub last_seen: Timestamp,
}

impl PluginRegistration {
    /// Create a new registration.
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        let ts = now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            author: String::new(),
            category: String::new(),
            tags: BTreeSet::new(),
            permissions: BTreeSet::new(),
            dependencies: Vec::new(),
            endpoints: Vec::new(),
            config: JsonMap::new(),
            status: PluginStatus::Registered,
            health: None,
            metrics: None,
            registered_at: ts,
            updated_at: ts,
            last_seen: ts,
        }
    }

    /// Set description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    /// Set author.
    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    /// Set category.
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    /// Add a permission.
    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.insert(permission.to_string());
        self
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, dep: &str) -> Self {
        self.dependencies.push(dep.to_string());
        self
    }

    /// Add an endpoint.
    pub fn with_endpoint(mut self, endpoint: PluginEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Set a config value.
    pub fn with_config(mut self, key: &str, value: serde_json::Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }

    /// Set status.
    pub fn with_status(mut self, status: PluginStatus) -> Self {
        self.status = status;
        self
    }

    /// Set metrics.
    pub fn with_metrics(mut self, metrics: PluginMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.version.trim().is_empty() {
            missing.push("version");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Request count from metrics, zero when absent.
    pub fn request_count(&self) -> u64 {
        self.metrics.as_ref().map(|m| m.request_count).unwrap_or(0)
    }

    /// True if any endpoint path matches.
    pub fn has_endpoint(&self, path: &str) -> bool {
        self.endpoints.iter().any(|e| e.path == path)
    }
}
