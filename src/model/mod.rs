//! Plugin data model.
//!
//! Registration records, statuses, health and metrics snapshots, and the
//! filters shared by storage, registry and discovery.

pub mod filter;
pub mod registration;

pub use filter::{matches_text, DiscoveryCriteria, PluginFilter};
pub use registration::{
    HealthStatus, PluginEndpoint, PluginHealth, PluginMetrics, PluginRegistration, PluginStatus,
};
