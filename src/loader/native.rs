//! Statically linked native modules.
//!
//! Native plugins are compiled into the binary. A module file on disk selects
//! a module from the table by its file stem, and the module's exports are
//! looked up by symbol name.

use crate::core::{JsonMap, Result};
use crate::loader::instance::{InstanceStatus, PluginInstance};
use crate::loader::manifest::PluginMetadata;
use crate::registry::PluginEvent;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// Well-known factory symbol.
pub const FACTORY_SYMBOL: &str = "create_plugin";

/// Zero-argument constructor of a plugin instance.
pub type PluginFactory = fn() -> Box<dyn PluginInstance>;

/// A symbol exported by a native module.
#[derive(Clone)]
pub enum Export {
    /// Plugin factory
    Factory(PluginFactory),
    /// A symbol that cannot be called as a factory
    Opaque {
        /// Signature of the symbol, for error messages
        signature: String,
    },
}

/// Exports of one native module.
#[derive(Clone, Default)]
pub struct NativeModule {
    exports: HashMap<String, Export>,
}

impl NativeModule {
    /// Create a module without exports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Module exporting `factory` under [`FACTORY_SYMBOL`].
    pub fn with_factory(factory: PluginFactory) -> Self {
        Self::new().export(FACTORY_SYMBOL, Export::Factory(factory))
    }

    /// Add an export.
    pub fn export(mut self, symbol: &str, export: Export) -> Self {
        self.exports.insert(symbol.to_string(), export);
        self
    }

    /// Look up an export.
    pub fn lookup(&self, symbol: &str) -> Option<&Export> {
        self.exports.get(symbol)
    }
}

/// Native modules keyed by file stem.
#[derive(Clone, Default)]
pub struct NativeModuleTable {
    modules: HashMap<String, NativeModule>,
}

impl NativeModuleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the modules shipped in this crate.
    pub fn builtin() -> Self {
        Self::new().with_module("echo", NativeModule::with_factory(EchoPlugin::factory))
    }

    /// Add a module.
    pub fn with_module(mut self, stem: &str, module: NativeModule) -> Self {
        self.modules.insert(stem.to_string(), module);
        self
    }

    /// Get a module by file stem.
    pub fn get(&self, stem: &str) -> Option<&NativeModule> {
        self.modules.get(stem)
    }

    /// True if a module with this stem is linked.
    pub fn contains(&self, stem: &str) -> bool {
        self.modules.contains_key(stem)
    }

    /// Linked module stems, sorted.
    pub fn stems(&self) -> Vec<String> {
        let mut stems: Vec<String> = self.modules.keys().cloned().collect();
        stems.sort();
        stems
    }
}

/// Native plugin that echoes what it receives.
pub struct EchoPlugin {
    metadata: PluginMetadata,
    initialized: bool,
    running: bool,
    events_handled: u64,
}

impl EchoPlugin {
    /// Create a new echo plugin.
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new("echo", "Echo Plugin", "1.0.0")
                .with_description("Returns its input unchanged")
                .with_category("utility"),
            initialized: false,
            running: false,
            events_handled: 0,
        }
    }

    /// Factory exported by the `echo` module.
    pub fn factory() -> Box<dyn PluginInstance> {
        Box::new(Self::new())
    }
}

impl Default for EchoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginInstance for EchoPlugin {
    fn get_metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&mut self, _config: &JsonMap) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.initialized = false;
        self.running = false;
        self.events_handled = 0;
        Ok(())
    }

    async fn get_status(&self) -> InstanceStatus {
        let mut details = JsonMap::new();
        details.insert("events".to_string(), json!(self.events_handled));
        InstanceStatus {
            running: self.running,
            cpu_percent: 0.0,
            memory_bytes: 0,
            workers: usize::from(self.running),
            details,
        }
    }

    async fn handle_event(&mut self, event: &PluginEvent) -> Result<()> {
        self.events_handled += 1;
        debug!(plugin_id = %self.metadata.id, event_type = %event.event_type, "event echoed");
        Ok(())
    }

    async fn process_data(&mut self, data: serde_json::Value) -> Result<serde_json::Value> {
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = NativeModuleTable::builtin();
        assert!(table.contains("echo"));
        assert_eq!(table.stems(), vec!["echo"]);

        let module = table.get("echo").unwrap();
        match module.lookup(FACTORY_SYMBOL) {
            Some(Export::Factory(factory)) => assert_eq!(factory().get_metadata().id, "echo"),
            _ => panic!("echo module must export a factory"),
        }
        assert!(module.lookup("missing").is_none());
    }

    #[test]
    fn test_factory_instance_echoes() {
        let mut instance = EchoPlugin::factory();
        let echoed = tokio_test::block_on(instance.process_data(json!([1, 2]))).unwrap();
        assert_eq!(echoed, json!([1, 2]));
    }

    #[tokio::test]
    async fn test_echo_plugin() {
        let mut plugin = EchoPlugin::new();
        plugin.initialize(&JsonMap::new()).await.unwrap();
        plugin.start().await.unwrap();

        let data = json!({"key": "value"});
        assert_eq!(plugin.process_data(data.clone()).await.unwrap(), data);

        for _ in 0..3 {
            plugin.handle_event(&PluginEvent::new("ping", "echo")).await.unwrap();
        }
        assert_eq!(plugin.get_status().await.details["events"], 3);

        plugin.cleanup().await.unwrap();
        assert!(!plugin.get_status().await.running);
    }
}
