//! End-to-end flow: load → register → start → discover → event.

use pluginhub::discovery::{DiscoveryQuery, SearchRequest};
use pluginhub::model::{DiscoveryCriteria, PluginFilter, PluginStatus};
use pluginhub::registry::{event_types, PluginEvent};
use pluginhub::runtime::PluginState;
use pluginhub::{Error, HubConfig, PluginHub};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

async fn write_manifest(root: &Path, id: &str, category: &str, permissions: &[&str]) -> PathBuf {
    let dir = root.join(id);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let manifest = serde_json::json!({
        "id": id,
        "name": format!("{id} plugin"),
        "version": "1.0.0",
        "category": category,
        "permissions": permissions,
        "tags": [category],
    });
    tokio::fs::write(dir.join("manifest.json"), manifest.to_string())
        .await
        .unwrap();
    dir
}

async fn write_native(root: &Path, stem: &str) -> PathBuf {
    let module = root.join(format!("{stem}.so"));
    tokio::fs::write(&module, b"").await.unwrap();
    let manifest = serde_json::json!({"id": stem, "name": "Echo Plugin", "version": "1.0.0"});
    tokio::fs::write(root.join(format!("{stem}.json")), manifest.to_string())
        .await
        .unwrap();
    module
}

#[tokio::test]
async fn test_install_discover_and_broadcast() {
    let root = TempDir::new().unwrap();
    let hub = PluginHub::from_config(HubConfig::default()).await.unwrap();
    let mut events = hub.registry().subscribe(&[event_types::STATUS_CHANGED]).await;

    hub.install_plugin(&write_manifest(root.path(), "p1", "tools", &["fs.read"]).await)
        .await
        .unwrap();
    hub.install_plugin(&write_manifest(root.path(), "p2", "media", &["audio.play"]).await)
        .await
        .unwrap();
    hub.install_plugin(&write_native(root.path(), "echo").await)
        .await
        .unwrap();

    let tools = hub
        .registry()
        .list(&PluginFilter::new().by_category("tools"))
        .await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].id, "p1");

    let writers = hub
        .registry()
        .discover(&DiscoveryCriteria::new().requiring("fs.write"))
        .await;
    assert!(writers.is_empty());

    let found = hub
        .discovery()
        .find_plugins(&DiscoveryQuery::new("p1").requiring("fs.read"))
        .await
        .unwrap();
    assert_eq!(found.plugins[0].plugin.id, "p1");
    assert_eq!(found.total, 3);

    let search = hub
        .discovery()
        .search_plugins(&SearchRequest::new("media"))
        .await
        .unwrap();
    assert_eq!(search.plugins.len(), 1);

    let delivered = hub
        .manager()
        .broadcast_event(&PluginEvent::new("custom.reload", "p1"))
        .await
        .unwrap();
    assert_eq!(delivered, 3);

    let echoed = hub
        .manager()
        .process_data("echo", serde_json::json!({"hello": "world"}))
        .await
        .unwrap();
    assert_eq!(echoed["hello"], "world");

    let status_events = events.drain();
    assert_eq!(status_events.len(), 3);
    assert!(status_events.iter().all(|e| e.payload["new_status"] == "active"));

    hub.shutdown().await.unwrap();
    assert!(hub.manager().list_plugins().await.is_empty());
}

#[tokio::test]
async fn test_directory_without_manifest_is_rejected() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("bare");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let hub = PluginHub::from_config(HubConfig::default()).await.unwrap();

    let err = hub.install_plugin(&dir).await.unwrap_err();
    assert!(matches!(err, Error::Load(_)));
    assert!(hub.manager().list_plugins().await.is_empty());
    assert_eq!(hub.registry().count().await, 0);

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_and_restart_through_manager() {
    let root = TempDir::new().unwrap();
    let hub = PluginHub::from_config(HubConfig::default()).await.unwrap();
    hub.install_plugin(&write_manifest(root.path(), "p1", "tools", &[]).await)
        .await
        .unwrap();

    hub.manager().stop_plugin("p1").await.unwrap();
    hub.registry()
        .update_status("p1", PluginStatus::Inactive)
        .await
        .unwrap();
    assert_eq!(
        hub.manager().get_plugin_info("p1").await.unwrap().state,
        PluginState::Stopped
    );
    assert!(hub
        .discovery()
        .find_plugins(&DiscoveryQuery::default())
        .await
        .unwrap()
        .plugins
        .is_empty());

    hub.manager().start_plugin("p1").await.unwrap();
    hub.registry()
        .update_status("p1", PluginStatus::Active)
        .await
        .unwrap();
    assert_eq!(hub.manager().running_plugins().await, vec!["p1"]);

    hub.shutdown().await.unwrap();
}
