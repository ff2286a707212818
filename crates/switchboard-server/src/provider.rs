//! Source-of-truth seam.
//!
//! The relational store that owns configuration and membership data is an
//! external collaborator; Switchboard only depends on these traits. Cache
//! entries are disposable precisely because everything here can be
//! re-read at any time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;

/// Errors from the source of truth.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("source of truth unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Tenant configuration reads and writes.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Committed settings for a tenant, `None` when the tenant is unknown.
    async fn load_tenant_config(&self, tenant_id: &str) -> Result<Option<Value>, ProviderError>;

    /// A module's state for a tenant (`{"enabled": .., "config": ..}`).
    async fn load_module_config(
        &self,
        tenant_id: &str,
        module: &str,
    ) -> Result<Option<Value>, ProviderError>;

    /// Commit new settings for a tenant.
    async fn store_tenant_config(
        &self,
        tenant_id: &str,
        settings: Value,
    ) -> Result<(), ProviderError>;

    /// Commit a module toggle (and optional config change) for a tenant.
    async fn store_module_config(
        &self,
        tenant_id: &str,
        module: &str,
        enabled: bool,
        config: Option<Value>,
    ) -> Result<(), ProviderError>;
}

/// Tenant membership and authorization checks.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Whether the user owns the tenant or holds an elevated membership
    /// role for it. Room joins treat an `Err` as a denial (fail closed).
    async fn can_access(&self, user_id: &str, tenant_id: &str) -> Result<bool, ProviderError>;

    /// Every tenant the user is entitled to, for room auto-join.
    async fn tenants_for_user(&self, user_id: &str) -> Result<Vec<String>, ProviderError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Default, Clone)]
struct TenantRecord {
    owner: String,
    admins: HashSet<String>,
    settings: Value,
    modules: HashMap<String, Value>,
}

/// In-memory provider for tests and local development.
#[derive(Default)]
pub struct MemoryProvider {
    tenants: RwLock<HashMap<String, TenantRecord>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a tenant with an owner and initial settings.
    pub async fn add_tenant(&self, tenant_id: &str, owner: &str, settings: Value) {
        self.tenants.write().await.insert(
            tenant_id.to_string(),
            TenantRecord {
                owner: owner.to_string(),
                settings,
                ..TenantRecord::default()
            },
        );
    }

    /// Grant a user an elevated membership role for a tenant.
    pub async fn grant_admin(&self, tenant_id: &str, user_id: &str) {
        if let Some(record) = self.tenants.write().await.get_mut(tenant_id) {
            record.admins.insert(user_id.to_string());
        }
    }

    /// Revoke an elevated membership role.
    pub async fn revoke_admin(&self, tenant_id: &str, user_id: &str) {
        if let Some(record) = self.tenants.write().await.get_mut(tenant_id) {
            record.admins.remove(user_id);
        }
    }
}

#[async_trait]
impl ConfigProvider for MemoryProvider {
    async fn load_tenant_config(&self, tenant_id: &str) -> Result<Option<Value>, ProviderError> {
        Ok(self
            .tenants
            .read()
            .await
            .get(tenant_id)
            .map(|record| record.settings.clone()))
    }

    async fn load_module_config(
        &self,
        tenant_id: &str,
        module: &str,
    ) -> Result<Option<Value>, ProviderError> {
        Ok(self
            .tenants
            .read()
            .await
            .get(tenant_id)
            .and_then(|record| record.modules.get(module).cloned()))
    }

    async fn store_tenant_config(
        &self,
        tenant_id: &str,
        settings: Value,
    ) -> Result<(), ProviderError> {
        let mut tenants = self.tenants.write().await;
        let record = tenants.entry(tenant_id.to_string()).or_default();
        record.settings = settings;
        Ok(())
    }

    async fn store_module_config(
        &self,
        tenant_id: &str,
        module: &str,
        enabled: bool,
        config: Option<Value>,
    ) -> Result<(), ProviderError> {
        let mut tenants = self.tenants.write().await;
        let record = tenants.entry(tenant_id.to_string()).or_default();
        record.modules.insert(
            module.to_string(),
            json!({ "enabled": enabled, "config": config }),
        );
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for MemoryProvider {
    async fn can_access(&self, user_id: &str, tenant_id: &str) -> Result<bool, ProviderError> {
        Ok(self
            .tenants
            .read()
            .await
            .get(tenant_id)
            .map(|record| record.owner == user_id || record.admins.contains(user_id))
            .unwrap_or(false))
    }

    async fn tenants_for_user(&self, user_id: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .tenants
            .read()
            .await
            .iter()
            .filter(|(_, record)| record.owner == user_id || record.admins.contains(user_id))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn owner_and_admin_have_access() {
        let provider = MemoryProvider::new();
        provider.add_tenant("G1", "owner", json!({})).await;
        provider.grant_admin("G1", "mod").await;

        assert!(provider.can_access("owner", "G1").await.unwrap());
        assert!(provider.can_access("mod", "G1").await.unwrap());
        assert!(!provider.can_access("stranger", "G1").await.unwrap());
        assert!(!provider.can_access("owner", "G2").await.unwrap());
    }

    #[tokio::test]
    async fn tenants_for_user_covers_owned_and_administered() {
        let provider = MemoryProvider::new();
        provider.add_tenant("G1", "alice", json!({})).await;
        provider.add_tenant("G2", "bob", json!({})).await;
        provider.grant_admin("G2", "alice").await;

        let mut tenants = provider.tenants_for_user("alice").await.unwrap();
        tenants.sort();
        assert_eq!(tenants, vec!["G1", "G2"]);
    }

    #[tokio::test]
    async fn module_store_shapes_enabled_and_config() {
        let provider = MemoryProvider::new();
        provider.add_tenant("G1", "alice", json!({})).await;
        provider
            .store_module_config("G1", "economy", false, Some(json!({"currency": "gold"})))
            .await
            .unwrap();

        let module = provider
            .load_module_config("G1", "economy")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(module["enabled"], false);
        assert_eq!(module["config"]["currency"], "gold");
    }
}
