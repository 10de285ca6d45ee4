//! Service Discovery Bridge
//!
//! Translates plugin registrations into generic service-discovery records:
//! - Service record and registry trait
//! - In-memory registry
//! - Plugin bridge

#[allow(clippy::module_inception)]
pub mod bridge;
pub mod memory;
pub mod service;

pub use bridge::{BridgeConfig, ServiceRegistryBridge, SyncReport};
pub use memory::InMemoryServiceRegistry;
pub use service::{ServiceEvent, ServiceHealth, ServiceInfo, ServiceRegistry};
