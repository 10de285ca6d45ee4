//! Generic service-discovery records and registry trait.

use crate::core::{Error, Result, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Health of a service as seen by service discovery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    /// Serving
    Passing,
    /// Reachable but not fully serving
    Warning,
    /// Not serving
    Critical,
    /// Never checked
    #[default]
    Unknown,
}

impl std::fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceHealth::Passing => write!(f, "passing"),
            ServiceHealth::Warning => write!(f, "warning"),
            ServiceHealth::Critical => write!(f, "critical"),
            ServiceHealth::Unknown => write!(f, "unknown"),
        }
    }
}

/// A service-discovery record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service ID
    pub id: String,
    /// Service name
    pub name: String,
    /// Host or IP
    pub address: String,
    /// Port
    pub port: u16,
    /// Tags
    pub tags: Vec<String>,
    /// String metadata
    pub metadata: HashMap<String, String>,
    /// Current health
    pub health: ServiceHealth,
    /// Registration time
    pub registered_at: Timestamp,
    /// Last update time
    pub updated_at: Timestamp,
    /// Last heartbeat
    pub last_heartbeat: Option<Timestamp>,
}

impl ServiceInfo {
    /// `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Change notification from a service registry.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceEvent {
    /// Service added
    Registered(ServiceInfo),
    /// Service replaced
    Updated(ServiceInfo),
    /// Service removed
    Deregistered(String),
    /// Health changed
    HealthChanged {
        /// Service ID
        id: String,
        /// New health
        health: ServiceHealth,
    },
}

/// A generic service registry (Consul-like).
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Add a service. Fails if the id is taken.
    async fn register(&self, service: ServiceInfo) -> Result<()>;

    /// Remove a service.
    async fn deregister(&self, id: &str) -> Result<()>;

    /// Replace an existing service.
    async fn update(&self, service: ServiceInfo) -> Result<()>;

    /// All services.
    async fn list_services(&self) -> Result<Vec<ServiceInfo>>;

    /// Set the health of a service.
    async fn update_health(&self, id: &str, health: ServiceHealth) -> Result<()>;

    /// Stream of changes from now on.
    fn watch(&self) -> broadcast::Receiver<ServiceEvent>;

    /// Record a liveness heartbeat.
    async fn heartbeat(&self, id: &str) -> Result<()>;

    /// Get one service.
    async fn get_service(&self, id: &str) -> Result<ServiceInfo> {
        self.list_services()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("service {id}")))
    }
}
