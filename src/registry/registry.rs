//! Plugin registry.
//!
//! The system of record for plugin registrations. The map is guarded by one
//! read/write lock that is never held across storage, bridge or event-bus
//! calls.

use crate::bridge::ServiceRegistryBridge;
use crate::core::{now, Error, Result, Timestamp};
use crate::model::{
    DiscoveryCriteria, HealthStatus, PluginFilter, PluginHealth, PluginMetrics,
    PluginRegistration, PluginStatus,
};
use crate::registry::events::{event_types, EventBus, PluginEvent, Subscription, SubscriptionId};
use crate::storage::PluginStorage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Registry configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Events buffered per subscription before dropping
    pub event_queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 100,
        }
    }
}

/// Aggregate health of the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryHealth {
    /// Overall verdict
    pub status: HealthStatus,
    /// Number of registrations
    pub total: usize,
    /// Registrations per status
    pub counts: HashMap<PluginStatus, usize>,
    /// When the verdict was computed
    pub checked_at: Timestamp,
}

impl RegistryHealth {
    /// Compute the verdict from per-status counts.
    ///
    /// Unhealthy when more than half are inactive, degraded when any are.
    pub fn from_counts(counts: HashMap<PluginStatus, usize>) -> Self {
        let total: usize = counts.values().sum();
        let inactive = counts.get(&PluginStatus::Inactive).copied().unwrap_or(0);
        let status = if inactive * 2 > total {
            HealthStatus::Unhealthy
        } else if inactive > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self {
            status,
            total,
            counts,
            checked_at: now(),
        }
    }
}

/// Plugin registry.
pub struct PluginRegistry {
    /// Registrations by id
    plugins: RwLock<HashMap<String, PluginRegistration>>,
    /// Durable copy
    storage: Arc<dyn PluginStorage>,
    /// Optional service-discovery bridge
    bridge: Option<Arc<ServiceRegistryBridge>>,
    /// Best-effort notifications
    events: EventBus,
}

impl PluginRegistry {
    /// Create a registry over a storage backend.
    pub fn new(storage: Arc<dyn PluginStorage>, config: RegistryConfig) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            storage,
            bridge: None,
            events: EventBus::new(config.event_queue_capacity),
        }
    }

    /// Bridge registrations into service discovery.
    pub fn with_bridge(mut self, bridge: Arc<ServiceRegistryBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Get the storage backend.
    pub fn storage(&self) -> &Arc<dyn PluginStorage> {
        &self.storage
    }

    /// Get the bridge, if any.
    pub fn bridge(&self) -> Option<&Arc<ServiceRegistryBridge>> {
        self.bridge.as_ref()
    }

    /// Rehydrate the map from storage. Returns the number of records loaded.
    pub async fn load(&self) -> Result<usize> {
        let stored = self
            .storage
            .list(&PluginFilter::default())
            .await
            .map_err(|e| e.context("load registrations"))?;
        let count = stored.len();
        let mut plugins = self.plugins.write().await;
        for reg in stored {
            plugins.insert(reg.id.clone(), reg);
        }
        info!(count, "registrations loaded from storage");
        Ok(count)
    }

    /// Register or refresh a plugin.
    ///
    /// Re-registering the same id and version keeps the original registration
    /// time. A different version supersedes the existing entry.
    pub async fn register(&self, mut registration: PluginRegistration) -> Result<PluginRegistration> {
        registration.validate()?;

        let ts = now();
        let (previous, refreshed) = {
            let mut plugins = self.plugins.write().await;
            let refreshed = match plugins.get(&registration.id) {
                Some(existing) if existing.version == registration.version => {
                    registration.registered_at = existing.registered_at;
                    true
                }
                Some(existing) => {
                    info!(
                        plugin_id = %registration.id,
                        old_version = %existing.version,
                        new_version = %registration.version,
                        "superseding registration with new version"
                    );
                    registration.registered_at = ts;
                    false
                }
                None => {
                    registration.registered_at = ts;
                    false
                }
            };
            registration.status = PluginStatus::Registered;
            registration.last_seen = ts;
            registration.updated_at = ts;
            let previous = plugins.insert(registration.id.clone(), registration.clone());
            (previous, refreshed)
        };

        if let Err(e) = self.storage.save(&registration).await {
            self.revert(&registration.id, &registration, previous).await;
            return Err(e.context("persist registration"));
        }

        if let Some(bridge) = &self.bridge {
            if let Err(e) = bridge.register_plugin(&registration).await {
                warn!(plugin_id = %registration.id, error = %e, "bridge failed, rolling back registration");
                self.compensate(&registration, previous).await;
                return Err(e);
            }
        }

        self.emit(
            PluginEvent::new(event_types::REGISTERED, &registration.id)
                .with_payload("version", registration.version.clone())
                .with_payload("refreshed", refreshed),
        )
        .await;
        info!(plugin_id = %registration.id, version = %registration.version, refreshed, "plugin registered");
        Ok(registration)
    }

    /// Put back `previous` if the entry is still the one `applied` wrote.
    ///
    /// Returns false, leaving the map alone, when a concurrent write replaced
    /// the entry in the meantime.
    async fn revert(
        &self,
        id: &str,
        applied: &PluginRegistration,
        previous: Option<PluginRegistration>,
    ) -> bool {
        let mut plugins = self.plugins.write().await;
        if plugins.get(id) != Some(applied) {
            debug!(plugin_id = %id, "entry replaced concurrently, keeping it");
            return false;
        }
        match previous {
            Some(prev) => {
                plugins.insert(id.to_string(), prev);
            }
            None => {
                plugins.remove(id);
            }
        }
        true
    }

    /// Undo a registration whose bridge step failed.
    async fn compensate(&self, applied: &PluginRegistration, previous: Option<PluginRegistration>) {
        let id = applied.id.as_str();
        if !self.revert(id, applied, previous.clone()).await {
            return;
        }
        let undo = match &previous {
            Some(prev) => self.storage.save(prev).await,
            None => self.storage.delete(id).await,
        };
        if let Err(e) = undo {
            warn!(plugin_id = %id, error = %e, "compensating storage write failed");
        }
    }

    /// Remove a plugin.
    ///
    /// The durable copy is deleted first. A failed delete leaves the
    /// registration in place.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        if !self.plugins.read().await.contains_key(id) {
            return Err(Error::NotFound(id.to_string()));
        }

        match self.storage.delete(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(plugin_id = %id, "registration was not in storage");
            }
            Err(e) => return Err(e.context("delete registration")),
        }

        let old_status = self
            .plugins
            .write()
            .await
            .remove(id)
            .map(|reg| reg.status)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        self.emit(
            PluginEvent::new(event_types::UNREGISTERED, id)
                .with_payload("old_status", old_status.to_string())
                .with_payload("new_status", PluginStatus::Unregistered.to_string()),
        )
        .await;

        if let Some(bridge) = &self.bridge {
            if let Err(e) = bridge.deregister_plugin(id).await {
                warn!(plugin_id = %id, error = %e, "service deregistration failed");
            }
        }

        info!(plugin_id = %id, "plugin unregistered");
        Ok(())
    }

    /// Change a plugin's status. Emits an event only on an actual change.
    pub async fn update_status(&self, id: &str, status: PluginStatus) -> Result<PluginRegistration> {
        let (previous, updated) = {
            let mut plugins = self.plugins.write().await;
            let reg = plugins
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            if reg.status == status {
                return Ok(reg.clone());
            }
            let previous = reg.clone();
            reg.status = status;
            reg.updated_at = now();
            (previous, reg.clone())
        };
        let old_status = previous.status;

        if let Err(e) = self.storage.update_status(id, status).await {
            self.revert(id, &updated, Some(previous)).await;
            return Err(e.context("persist status"));
        }

        if let Some(bridge) = &self.bridge {
            if let Err(e) = bridge.update_plugin(&updated).await {
                warn!(plugin_id = %id, error = %e, "service update failed");
            }
        }

        self.emit(
            PluginEvent::new(event_types::STATUS_CHANGED, id)
                .with_payload("old_status", old_status.to_string())
                .with_payload("new_status", status.to_string()),
        )
        .await;
        info!(plugin_id = %id, from = %old_status, to = %status, "plugin status changed");
        Ok(updated)
    }

    /// Refresh last-seen.
    pub async fn heartbeat(&self, id: &str) -> Result<()> {
        let (previous, updated) = self.modify(id, |reg| reg.last_seen = now()).await?;
        if let Err(e) = self.storage.update(&updated).await {
            self.revert(id, &updated, Some(previous)).await;
            return Err(e.context("persist heartbeat"));
        }

        if let Some(bridge) = &self.bridge {
            if let Err(e) = bridge.heartbeat(id).await {
                debug!(plugin_id = %id, error = %e, "service heartbeat failed");
            }
        }
        Ok(())
    }

    /// Record a health snapshot.
    pub async fn update_health(&self, id: &str, health: PluginHealth) -> Result<()> {
        let status = health.status;
        let (previous, updated) = self
            .modify(id, move |reg| reg.health = Some(health))
            .await?;
        if let Err(e) = self.storage.update(&updated).await {
            self.revert(id, &updated, Some(previous)).await;
            return Err(e.context("persist health"));
        }

        if let Some(bridge) = &self.bridge {
            if let Err(e) = bridge.sync_health(&updated).await {
                warn!(plugin_id = %id, error = %e, "service health sync failed");
            }
        }

        let status = serde_json::to_value(status).unwrap_or_default();
        self.emit(PluginEvent::new(event_types::HEALTH_UPDATED, id).with_payload("status", status))
            .await;
        Ok(())
    }

    /// Record a metrics snapshot.
    pub async fn update_metrics(&self, id: &str, metrics: PluginMetrics) -> Result<()> {
        let request_count = metrics.request_count;
        let stored = metrics.clone();
        let (previous, updated) = self
            .modify(id, move |reg| reg.metrics = Some(metrics))
            .await?;
        if let Err(e) = self.storage.update_metrics(id, &stored).await {
            self.revert(id, &updated, Some(previous)).await;
            return Err(e.context("persist metrics"));
        }

        self.emit(
            PluginEvent::new(event_types::METRICS_UPDATED, id)
                .with_payload("request_count", request_count),
        )
        .await;
        Ok(())
    }

    /// Apply `change` in place. Returns the entry before and after.
    async fn modify<F>(&self, id: &str, change: F) -> Result<(PluginRegistration, PluginRegistration)>
    where
        F: FnOnce(&mut PluginRegistration),
    {
        let mut plugins = self.plugins.write().await;
        let reg = plugins
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let previous = reg.clone();
        change(reg);
        reg.updated_at = now();
        Ok((previous, reg.clone()))
    }

    /// Get a copy of one registration.
    pub async fn get(&self, id: &str) -> Result<PluginRegistration> {
        self.plugins
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Copies of the registrations matching a filter.
    pub async fn list(&self, filter: &PluginFilter) -> Vec<PluginRegistration> {
        let plugins = self.plugins.read().await;
        filter.select(plugins.values().cloned())
    }

    /// Copies of the registrations satisfying discovery criteria.
    pub async fn discover(&self, criteria: &DiscoveryCriteria) -> Vec<PluginRegistration> {
        let mut found: Vec<PluginRegistration> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .filter(|r| criteria.matches(r))
                .cloned()
                .collect()
        };
        found.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = criteria.limit {
            found.truncate(limit);
        }
        found
    }

    /// Subscribe to event types. An empty list subscribes to all.
    pub async fn subscribe(&self, event_types: &[&str]) -> Subscription {
        self.events.subscribe(event_types).await
    }

    /// Remove a subscription.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id).await
    }

    async fn emit(&self, event: PluginEvent) {
        let report = self.events.publish(&event).await;
        if report.dropped > 0 {
            warn!(
                event_type = %event.event_type,
                plugin_id = %event.plugin_id,
                dropped = report.dropped,
                "event not delivered to every subscriber"
            );
        }
    }

    /// Aggregate health by status.
    pub async fn get_health(&self) -> RegistryHealth {
        let mut counts = HashMap::new();
        for reg in self.plugins.read().await.values() {
            *counts.entry(reg.status).or_insert(0) += 1;
        }
        RegistryHealth::from_counts(counts)
    }

    /// Number of registrations.
    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Drop subscriptions and close storage.
    pub async fn close(&self) -> Result<()> {
        self.events.close().await;
        self.storage.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{
        BridgeConfig, InMemoryServiceRegistry, ServiceEvent, ServiceHealth, ServiceInfo,
        ServiceRegistry,
    };
    use crate::storage::{MemoryStorage, StorageBackendType};
    use async_trait::async_trait;
    use tokio::sync::{broadcast, Notify};

    fn registry() -> PluginRegistry {
        PluginRegistry::new(Arc::new(MemoryStorage::new()), RegistryConfig::default())
    }

    fn formatter() -> PluginRegistration {
        PluginRegistration::new("p1", "Formatter", "1.0.0")
            .with_category("tools")
            .with_permission("fs.read")
    }

    /// Service registry that refuses every registration.
    struct RefusingServiceRegistry {
        inner: InMemoryServiceRegistry,
    }

    #[async_trait]
    impl ServiceRegistry for RefusingServiceRegistry {
        async fn register(&self, _service: ServiceInfo) -> Result<()> {
            Err(Error::Internal("discovery unavailable".to_string()))
        }
        async fn deregister(&self, id: &str) -> Result<()> {
            self.inner.deregister(id).await
        }
        async fn update(&self, service: ServiceInfo) -> Result<()> {
            self.inner.update(service).await
        }
        async fn list_services(&self) -> Result<Vec<ServiceInfo>> {
            self.inner.list_services().await
        }
        async fn update_health(&self, id: &str, health: ServiceHealth) -> Result<()> {
            self.inner.update_health(id, health).await
        }
        fn watch(&self) -> broadcast::Receiver<ServiceEvent> {
            self.inner.watch()
        }
        async fn heartbeat(&self, id: &str) -> Result<()> {
            self.inner.heartbeat(id).await
        }
    }

    /// Memory storage whose deletes and updates fail. Saves of version
    /// 2.0.0 wait for `release` and then fail.
    #[derive(Default)]
    struct BrokenStorage {
        inner: MemoryStorage,
        release: Notify,
    }

    fn disk_gone() -> Error {
        Error::Storage("disk gone".to_string())
    }

    #[async_trait]
    impl PluginStorage for BrokenStorage {
        async fn save(&self, registration: &PluginRegistration) -> Result<()> {
            if registration.version == "2.0.0" {
                self.release.notified().await;
                return Err(disk_gone());
            }
            self.inner.save(registration).await
        }
        async fn get(&self, id: &str) -> Result<PluginRegistration> {
            self.inner.get(id).await
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Err(disk_gone())
        }
        async fn list(&self, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
            self.inner.list(filter).await
        }
        async fn update(&self, _registration: &PluginRegistration) -> Result<()> {
            Err(disk_gone())
        }
        async fn update_status(&self, _id: &str, _status: PluginStatus) -> Result<()> {
            Err(disk_gone())
        }
        async fn update_metrics(&self, _id: &str, _metrics: &PluginMetrics) -> Result<()> {
            Err(disk_gone())
        }
        async fn get_by_endpoint(&self, endpoint: &str) -> Result<PluginRegistration> {
            self.inner.get_by_endpoint(endpoint).await
        }
        async fn search(&self, query: &str, filter: &PluginFilter) -> Result<Vec<PluginRegistration>> {
            self.inner.search(query, filter).await
        }
        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
        fn backend_type(&self) -> StorageBackendType {
            StorageBackendType::Memory
        }
    }

    fn version(v: &str) -> PluginRegistration {
        let mut reg = formatter();
        reg.version = v.to_string();
        reg
    }

    #[tokio::test]
    async fn test_register_rejects_missing_fields() {
        let registry = registry();
        let err = registry
            .register(PluginRegistration::new("p1", "", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_register_sets_defaults_and_persists() {
        let registry = registry();
        let reg = registry
            .register(formatter().with_status(PluginStatus::Active))
            .await
            .unwrap();

        assert_eq!(reg.status, PluginStatus::Registered);
        assert_eq!(registry.storage().get("p1").await.unwrap().id, "p1");
    }

    #[tokio::test]
    async fn test_same_version_preserves_registration_time() {
        let registry = registry();
        let first = registry.register(formatter()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = registry.register(formatter()).await.unwrap();

        assert_eq!(second.registered_at, first.registered_at);
        assert!(second.last_seen > first.last_seen);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_new_version_supersedes() {
        let registry = registry();
        let first = registry.register(formatter()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let mut upgraded = formatter();
        upgraded.version = "2.0.0".to_string();
        let second = registry.register(upgraded).await.unwrap();

        assert!(second.registered_at > first.registered_at);
        assert_eq!(registry.get("p1").await.unwrap().version, "2.0.0");
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_list_by_category() {
        let registry = registry();
        registry.register(formatter()).await.unwrap();
        registry
            .register(PluginRegistration::new("p2", "Player", "1.0.0").with_category("media"))
            .await
            .unwrap();

        let tools = registry.list(&PluginFilter::new().by_category("tools")).await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, "p1");
    }

    #[tokio::test]
    async fn test_discover_requires_capabilities() {
        let registry = registry();
        registry.register(formatter()).await.unwrap();

        let none = registry
            .discover(&DiscoveryCriteria::new().requiring("fs.write"))
            .await;
        assert!(none.is_empty());

        let some = registry
            .discover(&DiscoveryCriteria::new().requiring("fs.read"))
            .await;
        assert_eq!(some.len(), 1);

        let excluded = registry
            .discover(&DiscoveryCriteria::new().requiring("fs.read").excluding("p1"))
            .await;
        assert!(excluded.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_are_copies() {
        let registry = registry();
        registry.register(formatter()).await.unwrap();

        let mut listed = registry.list(&PluginFilter::new()).await;
        listed[0].name = "Mutated".to_string();
        assert_eq!(registry.get("p1").await.unwrap().name, "Formatter");
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = registry();
        registry.register(formatter()).await.unwrap();
        let mut sub = registry.subscribe(&[event_types::UNREGISTERED]).await;

        registry.unregister("p1").await.unwrap();
        assert!(registry.get("p1").await.unwrap_err().is_not_found());
        assert!(registry.storage().get("p1").await.unwrap_err().is_not_found());
        assert_eq!(sub.drain().len(), 1);

        assert!(registry.unregister("p1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_status_emits_only_on_change() {
        let registry = registry();
        registry.register(formatter()).await.unwrap();
        let mut sub = registry.subscribe(&[event_types::STATUS_CHANGED]).await;

        registry.update_status("p1", PluginStatus::Active).await.unwrap();
        registry.update_status("p1", PluginStatus::Active).await.unwrap();

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["old_status"], "registered");
        assert_eq!(events[0].payload["new_status"], "active");
        assert_eq!(
            registry.storage().get("p1").await.unwrap().status,
            PluginStatus::Active
        );
        assert!(registry
            .update_status("nope", PluginStatus::Active)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_event_queue_overflow_drops() {
        let registry = PluginRegistry::new(
            Arc::new(MemoryStorage::new()),
            RegistryConfig {
                event_queue_capacity: 2,
            },
        );
        let mut sub = registry.subscribe(&[event_types::REGISTERED]).await;

        for i in 0..5 {
            registry
                .register(PluginRegistration::new(&format!("p{i}"), "P", "1.0.0"))
                .await
                .unwrap();
        }
        assert_eq!(sub.drain().len(), 2);
        assert_eq!(registry.count().await, 5);
    }

    #[tokio::test]
    async fn test_health_verdict() {
        let registry = registry();
        for id in ["a", "b", "c"] {
            registry
                .register(PluginRegistration::new(id, id, "1.0.0"))
                .await
                .unwrap();
        }
        assert_eq!(registry.get_health().await.status, HealthStatus::Healthy);

        registry.update_status("a", PluginStatus::Inactive).await.unwrap();
        assert_eq!(registry.get_health().await.status, HealthStatus::Degraded);

        registry.update_status("b", PluginStatus::Inactive).await.unwrap();
        let health = registry.get_health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.total, 3);
        assert_eq!(health.counts[&PluginStatus::Inactive], 2);
    }

    #[tokio::test]
    async fn test_bridge_failure_rolls_back() {
        let bridge = Arc::new(ServiceRegistryBridge::new(
            Arc::new(RefusingServiceRegistry {
                inner: InMemoryServiceRegistry::new(),
            }),
            BridgeConfig::default(),
        ));
        let registry = registry().with_bridge(bridge);
        let mut sub = registry.subscribe(&[]).await;

        let err = registry.register(formatter()).await.unwrap_err();
        assert!(matches!(err, Error::Bridge(_)));
        assert!(registry.get("p1").await.unwrap_err().is_not_found());
        assert!(registry.storage().get("p1").await.unwrap_err().is_not_found());
        assert!(sub.drain().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_tracks_registration() {
        let bridge = Arc::new(ServiceRegistryBridge::new(
            Arc::new(InMemoryServiceRegistry::new()),
            BridgeConfig::default(),
        ));
        let registry = registry().with_bridge(bridge.clone());

        registry.register(formatter()).await.unwrap();
        registry.update_status("p1", PluginStatus::Active).await.unwrap();
        assert_eq!(
            bridge.get_plugin_service("p1").await.unwrap().health,
            ServiceHealth::Passing
        );

        registry.unregister("p1").await.unwrap();
        assert!(bridge.list_plugin_services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_health_metrics() {
        let registry = registry();
        let reg = registry.register(formatter()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        registry.heartbeat("p1").await.unwrap();
        registry
            .update_health("p1", PluginHealth::new(HealthStatus::Healthy))
            .await
            .unwrap();
        registry
            .update_metrics("p1", PluginMetrics::with_requests(7))
            .await
            .unwrap();

        let read = registry.get("p1").await.unwrap();
        assert!(read.last_seen > reg.last_seen);
        assert_eq!(read.health.unwrap().status, HealthStatus::Healthy);
        assert_eq!(registry.storage().get("p1").await.unwrap().request_count(), 7);
        assert!(registry.heartbeat("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_storage_write_leaves_entry_unchanged() {
        let storage = Arc::new(BrokenStorage::default());
        let registry = PluginRegistry::new(storage.clone(), RegistryConfig::default());
        let reg = registry.register(formatter()).await.unwrap();
        let mut sub = registry.subscribe(&[]).await;

        let err = registry.unregister("p1").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(registry.get("p1").await.unwrap(), reg);
        assert!(storage.get("p1").await.is_ok());

        assert!(registry.heartbeat("p1").await.is_err());
        assert!(registry
            .update_health("p1", PluginHealth::new(HealthStatus::Unhealthy))
            .await
            .is_err());
        assert!(registry
            .update_metrics("p1", PluginMetrics::with_requests(3))
            .await
            .is_err());
        assert!(registry
            .update_status("p1", PluginStatus::Active)
            .await
            .is_err());
        assert_eq!(registry.get("p1").await.unwrap(), reg);
        assert!(sub.drain().is_empty());

        let reloaded = PluginRegistry::new(storage, RegistryConfig::default());
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert_eq!(reloaded.get("p1").await.unwrap(), reg);
    }

    #[tokio::test]
    async fn test_rollback_keeps_concurrent_registration() {
        let storage = Arc::new(BrokenStorage::default());
        let registry = Arc::new(PluginRegistry::new(storage.clone(), RegistryConfig::default()));
        registry.register(formatter()).await.unwrap();

        let slow = tokio::spawn({
            let registry = registry.clone();
            async move { registry.register(version("2.0.0")).await }
        });
        while registry.get("p1").await.unwrap().version != "2.0.0" {
            tokio::task::yield_now().await;
        }

        registry.register(version("3.0.0")).await.unwrap();
        storage.release.notify_one();

        assert!(matches!(slow.await.unwrap(), Err(Error::Storage(_))));
        assert_eq!(registry.get("p1").await.unwrap().version, "3.0.0");
        assert_eq!(storage.get("p1").await.unwrap().version, "3.0.0");
    }

    #[tokio::test]
    async fn test_load_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save(&formatter()).await.unwrap();

        let registry = PluginRegistry::new(storage, RegistryConfig::default());
        assert_eq!(registry.load().await.unwrap(), 1);
        assert_eq!(registry.get("p1").await.unwrap().name, "Formatter");
    }
}
