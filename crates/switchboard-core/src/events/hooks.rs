//! Hook trait for bus event handlers.
//!
//! Hooks are async handlers that react to [`SyncEvent`]s. They are
//! registered explicitly at process startup — there is no runtime
//! discovery — and the dispatcher owns logging and continuation: a hook
//! returns `Result`, and neither an `Err` nor a panic reaches the other
//! hooks or the dispatch loop.

use async_trait::async_trait;

use super::types::{BusChannel, SyncEvent};

/// Error type for hook operations.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Hook execution failed with a message.
    #[error("hook execution failed: {0}")]
    Execution(String),

    /// Hook failed to send to an internal channel.
    #[error("channel send failed: {0}")]
    Channel(String),

    /// Hook failed reading or writing the source of truth.
    #[error("provider error: {0}")]
    Provider(String),

    /// Hook failed to (de)serialize a payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    pub fn execution(msg: impl Into<String>) -> Self {
        HookError::Execution(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        HookError::Provider(msg.into())
    }
}

/// A handler for bus events.
///
/// # Implementation notes
///
/// - Hooks should be quick; for heavy work, hand off to an internal
///   channel and return.
/// - Within one process, invocations for a given channel arrive in
///   receipt order; across processes there is no ordering at all.
/// - Hooks must be idempotent: the same envelope may be acted on twice
///   (once locally on publish, once echoed back from the wire).
#[async_trait]
pub trait SyncHook: Send + Sync {
    /// Unique name for this hook, used in logs and metrics.
    fn name(&self) -> &str;

    /// Channels this hook subscribes to. Empty means every channel.
    fn channels(&self) -> &[BusChannel] {
        &[]
    }

    /// Handle one event.
    async fn handle(&self, event: &SyncEvent) -> Result<(), HookError>;

    /// Whether this hook should see the given event.
    fn matches(&self, event: &SyncEvent) -> bool {
        let channels = self.channels();
        channels.is_empty() || channels.contains(&event.channel())
    }

    /// Called once when the hook system starts.
    async fn on_start(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once when the hook system shuts down.
    async fn on_shutdown(&self) -> Result<(), HookError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::TenantReload;

    struct ReloadOnly;

    #[async_trait]
    impl SyncHook for ReloadOnly {
        fn name(&self) -> &str {
            "reload_only"
        }

        fn channels(&self) -> &[BusChannel] {
            &[BusChannel::TenantReload]
        }

        async fn handle(&self, _event: &SyncEvent) -> Result<(), HookError> {
            Ok(())
        }
    }

    #[test]
    fn matches_filters_by_channel() {
        let hook = ReloadOnly;
        let reload = SyncEvent::TenantReload(TenantReload {
            tenant_id: "G1".into(),
        });
        assert!(hook.matches(&reload));

        let update = SyncEvent::ConfigUpdate(crate::events::types::ConfigUpdate {
            tenant_id: "G1".into(),
            settings: serde_json::json!({}),
        });
        assert!(!hook.matches(&update));
    }
}
