//! Plugin Registry
//!
//! System of record for plugin registrations:
//! - Registration, refresh and removal
//! - Status, health and metrics tracking
//! - Capability-based discovery
//! - Best-effort event subscriptions

pub mod events;
#[allow(clippy::module_inception)]
pub mod registry;

pub use events::{event_types, EventBus, PluginEvent, PublishReport, Subscription, SubscriptionId};
pub use registry::{PluginRegistry, RegistryConfig, RegistryHealth};
