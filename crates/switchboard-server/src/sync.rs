//! Cache synchronization: the writer-path contract and the subscriber
//! reaction.
//!
//! Policy: invalidate-on-write, lazy-reload-on-read,
//! eager-reload-on-remote-event. A writer commits to the source of truth,
//! deletes the affected cache key(s), then publishes the event — it never
//! repopulates the cache itself. Every process (the writer's own
//! included) reacts to the event by deleting, re-reading the source of
//! truth and repopulating with a bounded TTL.
//!
//! Two processes reloading concurrently after the same event is benign:
//! both reads observe the same committed state, so last-writer-wins on an
//! idempotent value.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_core::{
    BusChannel, CommandExecuted, CommandOutcome, ConfigUpdate, EnvelopeError, HookError,
    ModuleToggle, PermissionRevoked, SyncEvent, SyncHook, TenantReload,
};

use crate::cache::TenantConfigCache;
use crate::events::EventBus;

// ============================================================================
// Subscriber side
// ============================================================================

/// Hook that keeps the local cache converged with remote writes.
pub struct CacheSyncHook {
    cache: TenantConfigCache,
}

impl CacheSyncHook {
    pub fn new(cache: TenantConfigCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SyncHook for CacheSyncHook {
    fn name(&self) -> &str {
        "cache_sync"
    }

    fn channels(&self) -> &[BusChannel] {
        &[
            BusChannel::ConfigUpdate,
            BusChannel::ModuleToggle,
            BusChannel::TenantReload,
        ]
    }

    async fn handle(&self, event: &SyncEvent) -> Result<(), HookError> {
        match event {
            SyncEvent::ConfigUpdate(p) => self
                .cache
                .refresh_tenant_config(&p.tenant_id)
                .await
                .map_err(|e| HookError::provider(e.to_string())),
            SyncEvent::ModuleToggle(p) => self
                .cache
                .refresh_module(&p.tenant_id, &p.module_name)
                .await
                .map_err(|e| HookError::provider(e.to_string())),
            SyncEvent::TenantReload(p) => {
                // Bulk resynchronization: drop the whole tenant key space,
                // then warm the settings entry back up.
                self.cache.clear_tenant(&p.tenant_id).await;
                self.cache
                    .refresh_tenant_config(&p.tenant_id)
                    .await
                    .map_err(|e| HookError::provider(e.to_string()))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Writer side
// ============================================================================

/// Writer-path contract: invalidate the affected cache key(s) immediately
/// after the source-of-truth commit, then publish the event.
///
/// Route handlers and the platform worker call this after mutating the
/// source of truth; they never write the cache directly.
#[derive(Clone)]
pub struct ChangePublisher {
    cache: TenantConfigCache,
    bus: EventBus,
}

impl ChangePublisher {
    pub fn new(cache: TenantConfigCache, bus: EventBus) -> Self {
        Self { cache, bus }
    }

    /// A tenant's settings were committed.
    pub async fn config_updated(
        &self,
        tenant_id: &str,
        settings: Value,
    ) -> Result<(), EnvelopeError> {
        self.cache.invalidate_tenant_config(tenant_id).await;
        self.bus
            .publish(&SyncEvent::ConfigUpdate(ConfigUpdate {
                tenant_id: tenant_id.to_string(),
                settings,
            }))
            .await?;
        Ok(())
    }

    /// A module was toggled (and its config possibly changed).
    pub async fn module_toggled(
        &self,
        tenant_id: &str,
        module_name: &str,
        enabled: bool,
        config: Option<Value>,
    ) -> Result<(), EnvelopeError> {
        self.cache.invalidate_module(tenant_id, module_name).await;
        self.bus
            .publish(&SyncEvent::ModuleToggle(ModuleToggle {
                tenant_id: tenant_id.to_string(),
                module_name: module_name.to_string(),
                enabled,
                config,
            }))
            .await?;
        Ok(())
    }

    /// Request bulk resynchronization of a tenant.
    pub async fn tenant_reload(&self, tenant_id: &str) -> Result<(), EnvelopeError> {
        self.cache.clear_tenant(tenant_id).await;
        self.bus
            .publish(&SyncEvent::TenantReload(TenantReload {
                tenant_id: tenant_id.to_string(),
            }))
            .await?;
        Ok(())
    }

    /// A user's access to a tenant was revoked. No cache key is affected;
    /// the gateway reacts by evicting the user's connections.
    pub async fn permission_revoked(
        &self,
        tenant_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), EnvelopeError> {
        self.bus
            .publish(&SyncEvent::PermissionRevoked(PermissionRevoked {
                tenant_id: tenant_id.to_string(),
                user_id: user_id.to_string(),
                reason: reason.to_string(),
            }))
            .await?;
        Ok(())
    }

    /// A command finished executing somewhere in the fleet.
    pub async fn command_executed(
        &self,
        tenant_id: &str,
        command: &str,
        executor: &str,
        result: CommandOutcome,
    ) -> Result<(), EnvelopeError> {
        self.bus
            .publish(&SyncEvent::CommandExecuted(CommandExecuted {
                tenant_id: tenant_id.to_string(),
                command: command.to_string(),
                executor: executor.to_string(),
                result,
            }))
            .await?;
        Ok(())
    }
}

/// Everything a process needs to participate in cache synchronization.
pub fn cache_sync_hook(cache: TenantConfigCache) -> Arc<CacheSyncHook> {
    Arc::new(CacheSyncHook::new(cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBackend;
    use crate::provider::{ConfigProvider, MemoryProvider};
    use crate::store::SharedStore;
    use serde_json::json;
    use std::time::Duration;

    fn fixture() -> (Arc<MemoryProvider>, TenantConfigCache, CacheSyncHook) {
        let provider = MemoryProvider::new_shared();
        let cache = TenantConfigCache::new(
            CacheBackend::new(SharedStore::Disabled),
            provider.clone(),
            Duration::from_secs(60),
        );
        let hook = CacheSyncHook::new(cache.clone());
        (provider, cache, hook)
    }

    #[tokio::test]
    async fn config_update_event_converges_cache_to_committed_state() {
        let (provider, cache, hook) = fixture();
        provider.add_tenant("G1", "alice", json!({"prefix": "!"})).await;

        // Warm the cache, then commit a change behind its back.
        cache.tenant_config("G1").await.unwrap();
        provider
            .store_tenant_config("G1", json!({"prefix": "?"}))
            .await
            .unwrap();

        let event = SyncEvent::ConfigUpdate(ConfigUpdate {
            tenant_id: "G1".into(),
            settings: json!({"prefix": "?"}),
        });
        hook.handle(&event).await.unwrap();

        let config = cache.tenant_config("G1").await.unwrap().unwrap();
        assert_eq!(config["prefix"], "?");
    }

    #[tokio::test]
    async fn redelivering_the_same_event_is_idempotent() {
        let (provider, cache, hook) = fixture();
        provider.add_tenant("G1", "alice", json!({"prefix": "?"})).await;

        let event = SyncEvent::ConfigUpdate(ConfigUpdate {
            tenant_id: "G1".into(),
            settings: json!({"prefix": "?"}),
        });
        hook.handle(&event).await.unwrap();
        let first = cache.tenant_config("G1").await.unwrap();
        hook.handle(&event).await.unwrap();
        let second = cache.tenant_config("G1").await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn tenant_reload_clears_module_entries_too() {
        let (provider, cache, hook) = fixture();
        provider.add_tenant("G1", "alice", json!({})).await;
        provider
            .store_module_config("G1", "economy", true, None)
            .await
            .unwrap();

        cache.module_config("G1", "economy").await.unwrap();
        provider
            .store_module_config("G1", "economy", false, None)
            .await
            .unwrap();

        let event = SyncEvent::TenantReload(TenantReload {
            tenant_id: "G1".into(),
        });
        hook.handle(&event).await.unwrap();

        let module = cache.module_config("G1", "economy").await.unwrap().unwrap();
        assert_eq!(module["enabled"], false);
    }

    #[tokio::test]
    async fn permission_revoked_leaves_cache_untouched() {
        let (provider, cache, hook) = fixture();
        provider.add_tenant("G1", "alice", json!({"prefix": "!"})).await;
        cache.tenant_config("G1").await.unwrap();

        let event = SyncEvent::PermissionRevoked(PermissionRevoked {
            tenant_id: "G1".into(),
            user_id: "bob".into(),
            reason: "role removed".into(),
        });
        // Not in this hook's channel set at all
        assert!(!hook.matches(&event));
    }
}
