//! Plugin Loader
//!
//! Turns filesystem paths into plugin instances:
//! - Manifest parsing
//! - The eight-operation instance contract
//! - Manifest-directory plugins
//! - Statically linked native modules

#[allow(clippy::module_inception)]
pub mod loader;
pub mod instance;
pub mod manifest;
pub mod manifest_plugin;
pub mod native;

pub use instance::{InstanceStatus, LoadedPlugin, PluginInstance};
pub use loader::{LoaderConfig, PluginLoader, PluginSource};
pub use manifest::PluginMetadata;
pub use manifest_plugin::{ManifestPlugin, ManifestState};
pub use native::{EchoPlugin, Export, NativeModule, NativeModuleTable, PluginFactory, FACTORY_SYMBOL};
