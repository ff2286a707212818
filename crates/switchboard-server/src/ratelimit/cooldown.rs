//! Per-action cooldown flags.
//!
//! A cooldown is presence, nothing more: a key with a TTL. Checking and
//! setting are separate calls — callers check, act, then set, accepting
//! that two concurrent actors racing on the same `(scope, actor, action)`
//! may each act once before a flag lands. Worst case is one extra action.

use std::time::Duration;

use crate::store::SharedStore;

/// Tracker for boolean TTL cooldown flags in the shared store.
#[derive(Clone)]
pub struct CooldownTracker {
    store: SharedStore,
}

impl CooldownTracker {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    fn key(scope: &str, actor_id: &str, action_id: &str) -> String {
        format!("cooldown:{scope}:{actor_id}:{action_id}")
    }

    /// Whether the actor is still cooling down on this action.
    /// Existence of the flag is the whole answer.
    pub async fn has_cooldown(&self, scope: &str, actor_id: &str, action_id: &str) -> bool {
        self.store.exists(&Self::key(scope, actor_id, action_id)).await
    }

    /// Start a cooldown; the store's TTL is the only expiry mechanism.
    pub async fn set_cooldown(
        &self,
        scope: &str,
        actor_id: &str,
        action_id: &str,
        ttl: Duration,
    ) {
        self.store
            .set(&Self::key(scope, actor_id, action_id), "1", Some(ttl))
            .await;
    }

    /// Lift a cooldown early.
    pub async fn clear_cooldown(&self, scope: &str, actor_id: &str, action_id: &str) {
        self.store.delete(&Self::key(scope, actor_id, action_id)).await;
    }
}
