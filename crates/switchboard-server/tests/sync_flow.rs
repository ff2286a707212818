//! Cross-process synchronization flow against a real Redis.
//!
//! Each "process" here is a full wiring of store + cache + hooks + bus
//! listener + gateway registry, sharing one Redis and one source of
//! truth, exactly as independently-deployed Switchboard processes do.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchboard_core::{ConfigUpdate, EventBroadcaster, HookDispatcher, HookRegistry, SyncEvent};
use switchboard_server::cache::{CacheBackend, TenantConfigCache};
use switchboard_server::events::{EventBus, RedisBusListener};
use switchboard_server::gateway::{
    ConnectionHandle, ConnectionRegistry, GatewayFanoutHook, ServerMessage,
};
use switchboard_server::provider::{ConfigProvider, MemoryProvider};
use switchboard_server::store::SharedStore;
use switchboard_server::sync::{CacheSyncHook, ChangePublisher};
use tokio::sync::mpsc;

struct Process {
    store: SharedStore,
    cache: TenantConfigCache,
    publisher: ChangePublisher,
    registry: Arc<ConnectionRegistry>,
}

async fn spawn_process(provider: Arc<MemoryProvider>) -> Process {
    let store = common::connected_store().await;
    let cache = TenantConfigCache::new(
        CacheBackend::new(store.clone()),
        provider,
        Duration::from_secs(300),
    );
    let publisher = ChangePublisher::new(cache.clone(), EventBus::new(store.clone()));
    let registry = Arc::new(ConnectionRegistry::new());

    let broadcaster = EventBroadcaster::new_shared();
    let hooks = Arc::new(HookRegistry::new());
    hooks
        .register(Arc::new(CacheSyncHook::new(cache.clone())))
        .await;
    hooks
        .register(Arc::new(GatewayFanoutHook::new(registry.clone())))
        .await;
    tokio::spawn(HookDispatcher::new(hooks).run(broadcaster.subscribe()));
    RedisBusListener::new(store.clone(), broadcaster.clone()).spawn();

    // Let the SUBSCRIBE settle before anyone publishes
    tokio::time::sleep(Duration::from_millis(300)).await;

    Process {
        store,
        cache,
        publisher,
        registry,
    }
}

fn client(user: &str) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(16);
    (ConnectionHandle::new(user, tx), rx)
}

#[tokio::test]
async fn module_toggle_reaches_remote_room_and_cache() {
    let provider = MemoryProvider::new_shared();
    provider.add_tenant("G1", "alice", json!({})).await;
    provider
        .store_module_config("G1", "economy", true, None)
        .await
        .unwrap();

    let a = spawn_process(provider.clone()).await;
    let b = spawn_process(provider.clone()).await;

    // A client joined to room G1 on the remote gateway
    let (handle, mut rx) = client("alice");
    b.registry.register(handle.clone());
    b.registry.join_room("G1", &handle);

    // Warm the remote cache with the old state
    let warmed = b.cache.module_config("G1", "economy").await.unwrap().unwrap();
    assert_eq!(warmed["enabled"], true);

    // Writer path on process A: commit, then invalidate + publish
    provider
        .store_module_config("G1", "economy", false, None)
        .await
        .unwrap();
    a.publisher
        .module_toggled("G1", "economy", false, None)
        .await
        .unwrap();

    // The room push arrives with the decoded payload and a fresh timestamp
    let push = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("push within polling window")
        .expect("channel open");
    assert_eq!(push.event, "module:toggled");
    assert_eq!(push.data["tenantId"], "G1");
    assert_eq!(push.data["enabled"], false);
    assert!(push.data["timestamp"].is_i64());

    // A fresh read (post cache-delete) observes the committed state
    let module = b.cache.module_config("G1", "economy").await.unwrap().unwrap();
    assert_eq!(module["enabled"], false);
}

#[tokio::test]
async fn config_update_converges_and_is_idempotent() {
    let provider = MemoryProvider::new_shared();
    provider.add_tenant("G7", "alice", json!({"prefix": "!"})).await;

    let a = spawn_process(provider.clone()).await;
    let b = spawn_process(provider.clone()).await;

    b.cache.tenant_config("G7").await.unwrap();

    // Commit a change and hand-deliver the same envelope twice
    provider
        .store_tenant_config("G7", json!({"prefix": "?"}))
        .await
        .unwrap();
    let event = SyncEvent::ConfigUpdate(ConfigUpdate {
        tenant_id: "G7".into(),
        settings: json!({"prefix": "?"}),
    });
    let envelope = event.encode_at(1_700_000_000_000).unwrap();

    a.store.publish("config:update", &envelope).await;

    // Every process eagerly reloads and repopulates the shared entry
    let store = b.store.clone();
    let converged = common::wait_until(Duration::from_secs(5), move || {
        let store = store.clone();
        async move {
            store
                .get("tenant:G7:config")
                .await
                .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
                .map(|v| v["prefix"] == "?")
                .unwrap_or(false)
        }
    })
    .await;
    assert!(converged, "cache entry should converge to committed state");

    let once = b.cache.tenant_config("G7").await.unwrap();

    // Redelivery of the identical envelope changes nothing
    a.store.publish("config:update", &envelope).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let twice = b.cache.tenant_config("G7").await.unwrap();

    assert_eq!(once, twice);
}

#[tokio::test]
async fn revocation_evicts_connections_on_remote_gateways() {
    let provider = MemoryProvider::new_shared();
    provider.add_tenant("G9", "alice", json!({})).await;

    let a = spawn_process(provider.clone()).await;
    let b = spawn_process(provider.clone()).await;

    let (mallory1, mut mallory1_rx) = client("mallory");
    let (mallory2, mut mallory2_rx) = client("mallory");
    let (bob, mut bob_rx) = client("bob");
    for handle in [&mallory1, &mallory2, &bob] {
        b.registry.register(handle.clone());
        b.registry.join_room("G9", handle);
    }

    a.publisher
        .permission_revoked("G9", "mallory", "role removed")
        .await
        .unwrap();

    for rx in [&mut mallory1_rx, &mut mallory2_rx] {
        let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("eviction notice within polling window")
            .expect("channel open");
        assert_eq!(notice.event, "permission:revoked");
        assert_eq!(notice.data["action"], "redirect_home");
        assert_eq!(notice.data["reason"], "role removed");
    }

    // Later room broadcasts skip the evicted user but still reach others
    provider
        .store_module_config("G9", "economy", true, None)
        .await
        .unwrap();
    a.publisher
        .module_toggled("G9", "economy", true, None)
        .await
        .unwrap();

    let bob_push = tokio::time::timeout(Duration::from_secs(5), bob_rx.recv())
        .await
        .expect("bob still receives")
        .expect("channel open");
    assert_eq!(bob_push.event, "module:toggled");

    assert!(mallory1_rx.try_recv().is_err());
    assert!(mallory2_rx.try_recv().is_err());
    assert_eq!(b.registry.room_size("G9"), 1);
}
