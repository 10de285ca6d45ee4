//! # pluginhub - Plugin Orchestration Core
//!
//! Registry, discovery and in-process runtime for a plugin marketplace:
//! - **Registry**: system of record for plugin registrations, with events
//! - **Storage**: in-memory, JSON-file and write-through cached persistence
//! - **Bridge**: mirrors registrations into a service-discovery layer
//! - **Discovery**: ranking, similarity, recommendations and faceted search
//! - **Loader / Runtime**: loads plugins from disk and runs them under a
//!   managed lifecycle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pluginhub::{HubConfig, PluginHub};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> pluginhub::Result<()> {
//!     let hub = PluginHub::from_config(HubConfig::default()).await?;
//!     let reg = hub.install_plugin(Path::new("plugins/formatter")).await?;
//!     println!("installed {} {}", reg.id, reg.version);
//!     hub.shutdown().await
//! }
//! ```

pub mod bridge;
pub mod core;
pub mod discovery;
pub mod hub;
pub mod loader;
pub mod model;
pub mod registry;
pub mod runtime;
pub mod storage;

pub use core::error::{Error, Result};
pub use hub::{HubConfig, PluginHub};
