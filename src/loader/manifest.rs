//! Plugin manifest.
//!
//! A JSON document with required string fields `id`, `name` and `version`.
//! Everything else is optional or passed through untouched.

use crate::core::{Error, JsonMap, Result};
use crate::model::PluginRegistration;
use serde::{Deserialize, Serialize};
use std::path::Path;

const REQUIRED_FIELDS: [&str; 3] = ["id", "name", "version"];

/// Identity and load-time metadata of a plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin ID
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
    pub tags: Vec<String>,
    /// Requested permissions
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Initial configuration handed to the instance
    #[serde(default)]
    pub config: JsonMap,
    /// Unrecognized fields
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl PluginMetadata {
    /// Create metadata with the required fields.
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            author: String::new(),
            category: String::new(),
            tags: Vec::new(),
            permissions: Vec::new(),
            config: JsonMap::new(),
            extra: JsonMap::new(),
        }
    }

    /// Set description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    /// Set category.
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Add a permission.
    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.push(permission.to_string());
        self
    }

    /// Parse a manifest. `source` only labels errors.
    pub fn from_json(json: &str, source: &Path) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::Load(format!("manifest {}: {e}", source.display())))?;

        let object = value
            .as_object()
            .ok_or_else(|| Error::Load(format!("manifest {}: not a JSON object", source.display())))?;

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| {
                object
                    .get(*field)
                    .and_then(|v| v.as_str())
                    .map_or(true, |s| s.trim().is_empty())
            })
            .collect();
        if !missing.is_empty() {
            return Err(Error::Load(format!(
                "manifest {}: missing required field(s): {}",
                source.display(),
                missing.join(", ")
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::Load(format!("manifest {}: {e}", source.display())))
    }

    /// Read and parse a manifest file.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Load(format!("read manifest {}: {e}", path.display())))?;
        Self::from_json(&json, path)
    }

    /// Registration record describing this plugin.
    pub fn to_registration(&self) -> PluginRegistration {
        let mut reg = PluginRegistration::new(&self.id, &self.name, &self.version)
            .with_description(&self.description)
            .with_author(&self.author)
            .with_category(&self.category);
        reg.tags.extend(self.tags.iter().cloned());
        reg.permissions.extend(self.permissions.iter().cloned());
        reg.config = self.config.clone();
        reg
    }
}
