//! Tenant configuration read-through cache.
//!
//! ## Key scheme
//!
//! - `tenant:{id}:config` — tenant settings
//! - `tenant:{id}:module:{name}` — one module's state
//!
//! The `tenant:{id}:` prefix is the wildcard cleared on bulk
//! resynchronization.
//!
//! ## Invalidation
//!
//! Writers delete keys through [`ChangePublisher`](crate::sync::ChangePublisher);
//! every process re-populates on the corresponding bus event. Entries are
//! capped at one hour so a missed invalidation self-heals.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::backend::CacheBackend;
use crate::provider::{ConfigProvider, ProviderError};

/// Ceiling for cache entry TTLs, the backstop against missed invalidations.
pub const TTL_CEILING: Duration = Duration::from_secs(3600);

/// Read-through cache for tenant settings and module state.
#[derive(Clone)]
pub struct TenantConfigCache {
    backend: CacheBackend,
    provider: Arc<dyn ConfigProvider>,
    ttl: Duration,
}

impl TenantConfigCache {
    /// Create a cache; `ttl` is clamped to the one-hour ceiling.
    pub fn new(backend: CacheBackend, provider: Arc<dyn ConfigProvider>, ttl: Duration) -> Self {
        Self {
            backend,
            provider,
            ttl: ttl.min(TTL_CEILING),
        }
    }

    pub fn config_key(tenant_id: &str) -> String {
        format!("tenant:{tenant_id}:config")
    }

    pub fn module_key(tenant_id: &str, module: &str) -> String {
        format!("tenant:{tenant_id}:module:{module}")
    }

    pub fn tenant_prefix(tenant_id: &str) -> String {
        format!("tenant:{tenant_id}:")
    }

    /// Tenant settings, from cache or the source of truth.
    pub async fn tenant_config(&self, tenant_id: &str) -> Result<Option<Value>, ProviderError> {
        let key = Self::config_key(tenant_id);
        if let Some(cached) = self.cached_json(&key).await {
            return Ok(Some(cached));
        }
        match self.provider.load_tenant_config(tenant_id).await? {
            Some(settings) => {
                self.populate(&key, &settings).await;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// One module's state for a tenant, from cache or the source of truth.
    pub async fn module_config(
        &self,
        tenant_id: &str,
        module: &str,
    ) -> Result<Option<Value>, ProviderError> {
        let key = Self::module_key(tenant_id, module);
        if let Some(cached) = self.cached_json(&key).await {
            return Ok(Some(cached));
        }
        match self.provider.load_module_config(tenant_id, module).await? {
            Some(state) => {
                self.populate(&key, &state).await;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Eager reload after a remote event: delete (defensive — a concurrent
    /// reader may have just repopulated a stale value), re-read, repopulate.
    pub async fn refresh_tenant_config(&self, tenant_id: &str) -> Result<(), ProviderError> {
        let key = Self::config_key(tenant_id);
        self.backend.invalidate(&key).await;
        if let Some(settings) = self.provider.load_tenant_config(tenant_id).await? {
            self.populate(&key, &settings).await;
        }
        Ok(())
    }

    /// Eager reload of one module's state after a remote event.
    pub async fn refresh_module(&self, tenant_id: &str, module: &str) -> Result<(), ProviderError> {
        let key = Self::module_key(tenant_id, module);
        self.backend.invalidate(&key).await;
        if let Some(state) = self.provider.load_module_config(tenant_id, module).await? {
            self.populate(&key, &state).await;
        }
        Ok(())
    }

    /// Clear everything cached for a tenant (bulk resynchronization).
    pub async fn clear_tenant(&self, tenant_id: &str) {
        self.backend
            .invalidate_prefix(&Self::tenant_prefix(tenant_id))
            .await;
    }

    /// Delete a single cached entry without reloading.
    pub async fn invalidate_tenant_config(&self, tenant_id: &str) {
        self.backend.invalidate(&Self::config_key(tenant_id)).await;
    }

    /// Delete a single cached module entry without reloading.
    pub async fn invalidate_module(&self, tenant_id: &str, module: &str) {
        self.backend
            .invalidate(&Self::module_key(tenant_id, module))
            .await;
    }

    async fn cached_json(&self, key: &str) -> Option<Value> {
        let raw = self.backend.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "dropping corrupt cache entry");
                self.backend.invalidate(key).await;
                None
            }
        }
    }

    async fn populate(&self, key: &str, value: &Value) {
        match serde_json::to_string(value) {
            Ok(raw) => self.backend.set(key, raw, self.ttl).await,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to serialize cache value");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ConfigProvider, MemoryProvider};
    use crate::store::SharedStore;
    use serde_json::json;

    fn cache_over(provider: Arc<MemoryProvider>) -> TenantConfigCache {
        TenantConfigCache::new(
            CacheBackend::new(SharedStore::Disabled),
            provider,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn read_through_populates_cache() {
        let provider = MemoryProvider::new_shared();
        provider.add_tenant("G1", "alice", json!({"prefix": "!"})).await;
        let cache = cache_over(provider.clone());

        let config = cache.tenant_config("G1").await.unwrap().unwrap();
        assert_eq!(config["prefix"], "!");

        // A second read hits the cache: mutate the source and observe the
        // stale (but present) entry — freshness is only restored by events.
        provider
            .store_tenant_config("G1", json!({"prefix": "?"}))
            .await
            .unwrap();
        let cached = cache.tenant_config("G1").await.unwrap().unwrap();
        assert_eq!(cached["prefix"], "!");
    }

    #[tokio::test]
    async fn refresh_reloads_committed_state() {
        let provider = MemoryProvider::new_shared();
        provider.add_tenant("G1", "alice", json!({"prefix": "!"})).await;
        let cache = cache_over(provider.clone());

        cache.tenant_config("G1").await.unwrap();
        provider
            .store_tenant_config("G1", json!({"prefix": "?"}))
            .await
            .unwrap();

        cache.refresh_tenant_config("G1").await.unwrap();
        let config = cache.tenant_config("G1").await.unwrap().unwrap();
        assert_eq!(config["prefix"], "?");
    }

    #[tokio::test]
    async fn unknown_tenant_is_none_not_error() {
        let cache = cache_over(MemoryProvider::new_shared());
        assert!(cache.tenant_config("missing").await.unwrap().is_none());
    }

    #[test]
    fn ttl_is_clamped_to_ceiling() {
        let cache = TenantConfigCache::new(
            CacheBackend::new(SharedStore::Disabled),
            MemoryProvider::new_shared(),
            Duration::from_secs(86_400),
        );
        assert_eq!(cache.ttl, TTL_CEILING);
    }
}
