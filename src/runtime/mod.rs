//! Plugin Runtime
//!
//! Runs loaded plugins in-process:
//! - Lifecycle state machine and bookkeeping
//! - Sandbox admission
//! - Event delivery
//! - Periodic resource sampling

pub mod info;
pub mod manager;
pub mod sandbox;

pub use info::{PluginInfo, PluginState, ResourceUsage};
pub use manager::{ManagerConfig, PluginManager};
pub use sandbox::{InProcessSandbox, Sandbox, SandboxConfig};
