//! JSON file backend implementation.
//!
//! One `<id>.json` file per plugin under a directory. Writes go to a
//! temporary file and are renamed into place.

use crate::core::{now, Error, Result};
use crate::model::{matches_text, PluginFilter, PluginMetrics, PluginRegistration, PluginStatus};
use crate::storage::backend::{PluginStorage, StorageBackendType};
use crate::storage::config::FileStorageConfig;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::warn;

const EXTENSION: &str = "json";

/// File-backed registration storage.
pub struct FileStorage {
    /// Storage directory
    directory: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
    /// Closed flag
    closed: AtomicBool,
}

impl FileStorage {
    /// Open (and create if needed) the storage directory.
    pub async fn new(config: FileStorageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.directory)
            .await
            .map_err(|e| {
                Error::Storage(format!(
                    "cannot create {}: {e}",
                    config.directory.display()
                ))
            })?;

        Ok(Self {
            directory: config.directory,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Get the storage directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Storage("file storage is closed".to_string()));
        }
        Ok(())
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let invalid = id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0']);
        if invalid {
            return Err(Error::Validation(format!(
                "plugin id '{id}' cannot be used as a file name"
            )));
        }
        Ok(self.directory.join(format!("{id}.{EXTENSION}")))
    }

    async fn read_file(&self, id: &str) -> Result<PluginRegistration> {
        let path = self.path_for(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(id.to_string()))
            }
            Err(e) => return Err(Error::Storage(format!("read {}: {e}", path.display()))),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Storage(format!("decode {}: {e}", path.display())))
    }

    async fn write_file(&self, registration: &PluginRegistration) -> Result<()> {
        let path = self.path_for(&registration.id)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let bytes = serde_json::to_vec_pretty(registration)?;

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("rename {}: {e}", path.display())))
    }

    async fn read_all(&self) -> Result<Vec<PluginRegistration>> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| Error::Storage(format!("list {}: {e}", self.directory.display())))?;

        let mut registrations = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let parsed = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<PluginRegistration>(&bytes)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(reg) => registrations.push(reg),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable plugin file"),
            }
        }
        Ok(registrations)
    }

    async fn modify<F>(&self, id: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut PluginRegistration),
    {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        let mut reg = self.read_file(id).await?;
        change(&mut reg);
        reg.updated_at = now();
        self.write_file(&reg).await
    }
}

#[async_trait]
impl PluginStorage for FileStorage {
    async fn save(&self, registration: &PluginRegistration) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        self.write_file(registration).await
    }

    async fn get(&self, id: &str) -> Result<PluginRegistration> {
        self.ensure_open()?;
        self.read_file(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_open()?;
        let path = self.path_for(id)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(id.to_string())),
            Err(e) => Err(Error::Storage(format!("delete {}: {e}", path.display()))),
        }
    }

    async fn list(&self, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
        self.ensure_open()?;
        Ok(filter.select(self.read_all().await?))
    }

    async fn update(&self, registration: &PluginRegistration) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        self.read_file(&registration.id).await?;
        self.write_file(registration).await
    }

    async fn update_status(&self, id: &str, status: PluginStatus) -> Result<()> {
        self.modify(id, |reg| reg.status = status).await
    }

    async fn update_metrics(&self, id: &str, metrics: &PluginMetrics) -> Result<()> {
        let metrics = metrics.clone();
        self.modify(id, move |reg| reg.metrics = Some(metrics)).await
    }

    async fn get_by_endpoint(&self, endpoint: &str) -> Result<PluginRegistration> {
        self.ensure_open()?;
        PluginFilter::default()
            .select(self.read_all().await?)
            .into_iter()
            .find(|r| r.has_endpoint(endpoint))
            .ok_or_else(|| Error::NotFound(format!("no plugin serves endpoint {endpoint}")))
    }

    async fn search(&self, query: &str, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
        self.ensure_open()?;
        let all = self.read_all().await?;
        Ok(filter.select(all.into_iter().filter(|r| matches_text(r, query))))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn backend_type(&self) -> StorageBackendType {
        StorageBackendType::File
    }

    async fn health_check(&self) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        Ok(tokio::fs::metadata(&self.directory)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }
}
