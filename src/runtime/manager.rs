//! Plugin manager.
//!
//! Owns loaded plugin instances and their bookkeeping under one lock. Each
//! instance sits behind its own mutex, taken before the manager lock and
//! never while holding it, so lifecycle calls on one plugin are serialized
//! without blocking the rest of the manager.

use crate::core::{now, Error, Result};
use crate::loader::{LoadedPlugin, PluginInstance, PluginLoader, PluginMetadata};
use crate::registry::PluginEvent;
use crate::runtime::info::{PluginInfo, PluginState, ResourceUsage};
use crate::runtime::sandbox::Sandbox;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Manager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Resource sampling period
    pub monitor_interval_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 30_000,
        }
    }
}

impl ManagerConfig {
    /// Sampling period, at least one millisecond.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }
}

type SharedInstance = Arc<Mutex<LoadedPlugin>>;

struct Managed {
    instance: SharedInstance,
    info: PluginInfo,
}

#[derive(Default)]
struct ManagerState {
    plugins: HashMap<String, Managed>,
    /// Ids reserved by in-flight loads
    loading: HashSet<String>,
}

impl ManagerState {
    fn loaded(&self) -> Vec<(String, SharedInstance)> {
        self.plugins
            .iter()
            .map(|(id, m)| (id.clone(), m.instance.clone()))
            .collect()
    }

    fn running(&self) -> Vec<(String, SharedInstance)> {
        self.plugins
            .iter()
            .filter(|(_, m)| m.info.state == PluginState::Running)
            .map(|(id, m)| (id.clone(), m.instance.clone()))
            .collect()
    }
}

/// Loads, runs and monitors plugin instances.
pub struct PluginManager {
    loader: Arc<PluginLoader>,
    sandbox: Arc<dyn Sandbox>,
    state: Arc<RwLock<ManagerState>>,
    shutdown: watch::Sender<bool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl PluginManager {
    /// Create a manager and spawn its resource monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(loader: Arc<PluginLoader>, sandbox: Arc<dyn Sandbox>, config: ManagerConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Internal(format!("plugin manager needs a tokio runtime: {e}")))?;

        let state = Arc::new(RwLock::new(ManagerState::default()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let monitor = handle.spawn(monitor(
            state.clone(),
            sandbox.clone(),
            config.monitor_interval(),
            shutdown_rx,
        ));

        Ok(Self {
            loader,
            sandbox,
            state,
            shutdown,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    /// Get the sandbox.
    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Load, sandbox and initialize the plugin at `path`.
    pub async fn load_plugin(&self, path: &Path) -> Result<PluginInfo> {
        let mut plugin = self.loader.load_plugin(path).await?;
        let metadata = plugin.get_metadata();
        let id = metadata.id.clone();

        {
            let mut state = self.state.write().await;
            if state.plugins.contains_key(&id) || !state.loading.insert(id.clone()) {
                return Err(Error::AlreadyExists(format!("plugin {id} is already loaded")));
            }
        }

        if let Err(e) = self.admit(&mut plugin, &metadata).await {
            self.state.write().await.loading.remove(&id);
            return Err(e);
        }

        let info = PluginInfo::loaded(metadata, path.to_path_buf(), plugin.is_native());
        {
            let mut state = self.state.write().await;
            state.loading.remove(&id);
            state.plugins.insert(
                id.clone(),
                Managed {
                    instance: Arc::new(Mutex::new(plugin)),
                    info: info.clone(),
                },
            );
        }

        info!(plugin_id = %id, path = %path.display(), "plugin ready");
        Ok(info)
    }

    async fn admit(&self, plugin: &mut LoadedPlugin, metadata: &PluginMetadata) -> Result<()> {
        self.sandbox.initialize_plugin(metadata).await?;
        if let Err(e) = plugin.initialize(&metadata.config).await {
            if let Err(remove) = self.sandbox.remove_plugin(&metadata.id).await {
                warn!(plugin_id = %metadata.id, error = %remove, "sandbox removal failed");
            }
            return Err(e.context("initialize plugin"));
        }
        Ok(())
    }

    async fn instance(&self, id: &str) -> Result<SharedInstance> {
        self.state
            .read()
            .await
            .plugins
            .get(id)
            .map(|m| m.instance.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn current_state(&self, id: &str) -> Result<PluginState> {
        self.state
            .read()
            .await
            .plugins
            .get(id)
            .map(|m| m.info.state)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn check(&self, id: &str, action: &str, allowed: fn(&PluginState) -> bool) -> Result<()> {
        let state = self.current_state(id).await?;
        if allowed(&state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                plugin_id: id.to_string(),
                state: state.to_string(),
                action: action.to_string(),
            })
        }
    }

    /// Record the outcome of a start or stop.
    async fn record(&self, id: &str, action: &str, target: PluginState, result: Result<()>) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(managed) = state.plugins.get_mut(id) else {
            return result;
        };
        match &result {
            Ok(()) => {
                let ts = now();
                managed.info.state = target;
                managed.info.last_error = None;
                if target == PluginState::Running {
                    managed.info.started_at = Some(ts);
                } else {
                    managed.info.stopped_at = Some(ts);
                }
                info!(plugin_id = %id, state = %target, "plugin {action} succeeded");
            }
            Err(e) => {
                managed.info.state = PluginState::Error;
                managed.info.last_error = Some(e.to_string());
                error!(plugin_id = %id, error = %e, "plugin {action} failed");
            }
        }
        result
    }

    /// Start a loaded, stopped or failed plugin.
    pub async fn start_plugin(&self, id: &str) -> Result<()> {
        let instance = self.instance(id).await?;
        let mut plugin = instance.lock().await;
        self.check(id, "start", PluginState::can_start).await?;
        let result = plugin.start().await;
        self.record(id, "start", PluginState::Running, result).await
    }

    /// Stop a running or failed plugin.
    pub async fn stop_plugin(&self, id: &str) -> Result<()> {
        let instance = self.instance(id).await?;
        let mut plugin = instance.lock().await;
        self.check(id, "stop", PluginState::can_stop).await?;
        let result = plugin.stop().await;
        self.record(id, "stop", PluginState::Stopped, result).await
    }

    /// Stop if needed, clean up, leave the sandbox and forget the plugin.
    pub async fn unload_plugin(&self, id: &str) -> Result<()> {
        let instance = self.instance(id).await?;
        let mut plugin = instance.lock().await;

        if self.current_state(id).await?.can_stop() {
            if let Err(e) = plugin.stop().await {
                warn!(plugin_id = %id, error = %e, "stop before unload failed");
            }
        }
        if let Err(e) = plugin.cleanup().await {
            warn!(plugin_id = %id, error = %e, "plugin cleanup failed");
        }
        if let Err(e) = self.sandbox.remove_plugin(id).await {
            warn!(plugin_id = %id, error = %e, "sandbox removal failed");
        }

        self.state.write().await.plugins.remove(id);
        info!(plugin_id = %id, "plugin unloaded");
        Ok(())
    }

    /// Deliver an event to one plugin.
    pub async fn send_event(&self, id: &str, event: &PluginEvent) -> Result<()> {
        let instance = self.instance(id).await?;
        let mut plugin = instance.lock().await;
        plugin.handle_event(event).await
    }

    /// Deliver an event to every loaded plugin, whatever its state.
    ///
    /// Each instance decides whether it accepts the event in its current
    /// state; a rejection counts as a failed delivery. Returns the number of successful deliveries,
    /// or [`Error::EventDelivery`] naming each plugin that failed.
    pub async fn broadcast_event(&self, event: &PluginEvent) -> Result<usize> {
        let targets = self.state.read().await.loaded();

        let outcomes = join_all(targets.into_iter().map(|(id, instance)| async move {
            let result = instance.lock().await.handle_event(event).await;
            (id, result)
        }))
        .await;

        let mut delivered = 0;
        let mut failures = Vec::new();
        for (id, result) in outcomes {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(plugin_id = %id, event_type = %event.event_type, error = %e, "event delivery failed");
                    failures.push(format!("{id}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            debug!(event_type = %event.event_type, delivered, "event broadcast");
            Ok(delivered)
        } else {
            failures.sort();
            Err(Error::EventDelivery(failures))
        }
    }

    /// Pass a payload through a plugin.
    pub async fn process_data(&self, id: &str, data: serde_json::Value) -> Result<serde_json::Value> {
        let instance = self.instance(id).await?;
        let mut plugin = instance.lock().await;
        plugin.process_data(data).await
    }

    /// Bookkeeping of one plugin.
    pub async fn get_plugin_info(&self, id: &str) -> Result<PluginInfo> {
        self.state
            .read()
            .await
            .plugins
            .get(id)
            .map(|m| m.info.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Bookkeeping of every plugin, ordered by id.
    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .state
            .read()
            .await
            .plugins
            .values()
            .map(|m| m.info.clone())
            .collect();
        infos.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        infos
    }

    /// Ids of running plugins, ordered.
    pub async fn running_plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .read()
            .await
            .running()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Sample resource usage of running plugins now. Returns how many were sampled.
    pub async fn sample_resources(&self) -> usize {
        sample(&self.state, self.sandbox.as_ref()).await
    }

    /// Unload every plugin, then stop and join the resource monitor.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let ids: Vec<String> = self.state.read().await.plugins.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.unload_plugin(&id).await {
                warn!(plugin_id = %id, error = %e, "unload during shutdown failed");
            }
        }

        self.shutdown.send_replace(true);
        if let Some(handle) = self.monitor.lock().await.take() {
            handle
                .await
                .map_err(|e| Error::Internal(format!("resource monitor failed: {e}")))?;
            info!("plugin manager shut down");
        }
        Ok(())
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn monitor(
    state: Arc<RwLock<ManagerState>>,
    sandbox: Arc<dyn Sandbox>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sampled = sample(&state, sandbox.as_ref()).await;
                debug!(sampled, "resource usage sampled");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("resource monitor stopping");
                    break;
                }
            }
        }
    }
}

async fn sample(state: &RwLock<ManagerState>, sandbox: &dyn Sandbox) -> usize {
    let running = state.read().await.running();

    let mut sampled = 0;
    for (id, instance) in running {
        let status = instance.lock().await.get_status().await;
        let usage = ResourceUsage::from(&status);
        if let Err(e) = sandbox.check_usage(&id, &usage).await {
            warn!(plugin_id = %id, error = %e, "plugin over resource limit");
        }
        if let Some(managed) = state.write().await.plugins.get_mut(&id) {
            managed.info.resources = usage;
            sampled += 1;
        }
    }
    sampled
}
