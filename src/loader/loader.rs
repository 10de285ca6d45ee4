//! Plugin loader.
//!
//! Validates a filesystem path and turns it into a [`LoadedPlugin`]:
//! - A directory holding a manifest becomes a [`ManifestPlugin`]
//! - A native module file is resolved in the [`NativeModuleTable`] and built
//!   through its factory export; its manifest sits beside it as `<stem>.json`

use crate::core::{Error, Result};
use crate::loader::instance::{LoadedPlugin, PluginInstance};
use crate::loader::manifest::PluginMetadata;
use crate::loader::manifest_plugin::ManifestPlugin;
use crate::loader::native::{Export, NativeModuleTable, FACTORY_SYMBOL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loader configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Manifest file name inside plugin directories
    pub manifest_file_name: String,
    /// Extensions accepted as native modules
    pub native_extensions: Vec<String>,
    /// Factory symbol looked up in native modules
    pub factory_symbol: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            manifest_file_name: "manifest.json".to_string(),
            native_extensions: vec!["so".to_string(), "dylib".to_string(), "dll".to_string()],
            factory_symbol: FACTORY_SYMBOL.to_string(),
        }
    }
}

/// Kind of plugin found at a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PluginSource {
    /// Directory with a manifest
    Directory {
        /// Manifest path
        manifest: PathBuf,
    },
    /// Native module file
    Native {
        /// Module file stem
        stem: String,
        /// Companion manifest path
        manifest: PathBuf,
    },
}

impl PluginSource {
    /// Manifest path for this source.
    pub fn manifest(&self) -> &Path {
        match self {
            PluginSource::Directory { manifest } | PluginSource::Native { manifest, .. } => manifest,
        }
    }
}

/// Loads plugins from the filesystem.
pub struct PluginLoader {
    config: LoaderConfig,
    modules: Arc<NativeModuleTable>,
}

impl PluginLoader {
    /// Create a loader over a native module table.
    pub fn new(config: LoaderConfig, modules: Arc<NativeModuleTable>) -> Self {
        Self { config, modules }
    }

    /// Get the native module table.
    pub fn modules(&self) -> &Arc<NativeModuleTable> {
        &self.modules
    }

    /// Check that `path` holds a loadable plugin and classify it.
    pub async fn validate_plugin(&self, path: &Path) -> Result<PluginSource> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::Load(format!("plugin path {}: {e}", path.display())))?;

        if meta.is_dir() {
            let manifest = path.join(&self.config.manifest_file_name);
            if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
                return Err(Error::Load(format!(
                    "plugin directory {} has no {}",
                    path.display(),
                    self.config.manifest_file_name
                )));
            }
            return Ok(PluginSource::Directory { manifest });
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if !self.config.native_extensions.iter().any(|e| e == extension) {
            return Err(Error::Load(format!(
                "unsupported plugin file {} (expected one of: {})",
                path.display(),
                self.config.native_extensions.join(", ")
            )));
        }

        tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::Load(format!("open module {}: {e}", path.display())))?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Load(format!("module {} has no file stem", path.display())))?
            .to_string();
        if !self.modules.contains(&stem) {
            return Err(Error::Load(format!(
                "module {} is not linked into this build",
                stem
            )));
        }

        Ok(PluginSource::Native {
            manifest: path.with_extension("json"),
            stem,
        })
    }

    /// Read the manifest of the plugin at `path`.
    pub async fn get_plugin_metadata(&self, path: &Path) -> Result<PluginMetadata> {
        let source = self.validate_plugin(path).await?;
        PluginMetadata::from_file(source.manifest()).await
    }

    /// Validate and instantiate the plugin at `path`.
    pub async fn load_plugin(&self, path: &Path) -> Result<LoadedPlugin> {
        let source = self.validate_plugin(path).await?;
        let metadata = PluginMetadata::from_file(source.manifest()).await?;

        let plugin = match source {
            PluginSource::Directory { .. } => {
                LoadedPlugin::Manifest(ManifestPlugin::new(metadata, path.to_path_buf()))
            }
            PluginSource::Native { stem, .. } => {
                let instance = self.instantiate(&stem)?;
                let produced = instance.get_metadata().id;
                if produced != metadata.id {
                    return Err(Error::Load(format!(
                        "module {stem} produced plugin {produced} but its manifest declares {}",
                        metadata.id
                    )));
                }
                LoadedPlugin::Native(instance)
            }
        };

        info!(
            plugin_id = %plugin.get_metadata().id,
            path = %path.display(),
            native = plugin.is_native(),
            "plugin loaded"
        );
        Ok(plugin)
    }

    fn instantiate(&self, stem: &str) -> Result<Box<dyn PluginInstance>> {
        let symbol = &self.config.factory_symbol;
        let module = self
            .modules
            .get(stem)
            .ok_or_else(|| Error::Load(format!("module {stem} is not linked into this build")))?;

        match module.lookup(symbol) {
            Some(Export::Factory(factory)) => {
                debug!(module = %stem, %symbol, "invoking plugin factory");
                Ok(factory())
            }
            Some(Export::Opaque { signature }) => Err(Error::Load(format!(
                "export {symbol} in module {stem} has signature {signature}, expected a plugin factory"
            ))),
            None => Err(Error::Load(format!(
                "module {stem} does not export {symbol}"
            ))),
        }
    }
}
