//! In-process service registry.

use crate::bridge::service::{ServiceEvent, ServiceHealth, ServiceInfo, ServiceRegistry};
use crate::core::{now, Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

const WATCH_CAPACITY: usize = 64;

/// Service registry kept in memory, with a broadcast watch stream.
pub struct InMemoryServiceRegistry {
    services: RwLock<HashMap<String, ServiceInfo>>,
    events: broadcast::Sender<ServiceEvent>,
}

impl InMemoryServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            services: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn notify(&self, event: ServiceEvent) {
        // No watchers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn register(&self, service: ServiceInfo) -> Result<()> {
        {
            let mut services = self.services.write().await;
            if services.contains_key(&service.id) {
                return Err(Error::AlreadyExists(format!("service {}", service.id)));
            }
            services.insert(service.id.clone(), service.clone());
        }
        self.notify(ServiceEvent::Registered(service));
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<()> {
        if self.services.write().await.remove(id).is_none() {
            return Err(Error::NotFound(format!("service {id}")));
        }
        self.notify(ServiceEvent::Deregistered(id.to_string()));
        Ok(())
    }

    async fn update(&self, service: ServiceInfo) -> Result<()> {
        {
            let mut services = self.services.write().await;
            let existing = services
                .get_mut(&service.id)
                .ok_or_else(|| Error::NotFound(format!("service {}", service.id)))?;
            *existing = service.clone();
        }
        self.notify(ServiceEvent::Updated(service));
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let mut services: Vec<ServiceInfo> =
            self.services.read().await.values().cloned().collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(services)
    }

    async fn update_health(&self, id: &str, health: ServiceHealth) -> Result<()> {
        let changed = {
            let mut services = self.services.write().await;
            let service = services
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("service {id}")))?;
            let changed = service.health != health;
            service.health = health;
            service.updated_at = now();
            changed
        };
        if changed {
            self.notify(ServiceEvent::HealthChanged {
                id: id.to_string(),
                health,
            });
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    async fn heartbeat(&self, id: &str) -> Result<()> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("service {id}")))?;
        service.last_heartbeat = Some(now());
        Ok(())
    }

    async fn get_service(&self, id: &str) -> Result<ServiceInfo> {
        self.services
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("service {id}")))
    }
}
