//! Hook registry and dispatcher.
//!
//! The registry holds the statically-constructed hooks a process registers
//! at startup; the dispatcher consumes events from a broadcast receiver
//! and routes them to matching hooks with timeout, panic recovery and
//! error isolation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

use super::hooks::{HookError, SyncHook};
use super::types::SyncEvent;

/// Default timeout for hook execution.
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Hook Registry
// ============================================================================

/// Registry for sync hooks with lifecycle management.
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn SyncHook>>>,
    timeout: Duration,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Create a new registry with a custom hook timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            timeout,
        }
    }

    /// Register a hook.
    pub async fn register(&self, hook: Arc<dyn SyncHook>) {
        let name = hook.name().to_string();
        self.hooks.write().await.push(hook);
        debug!(hook = %name, "registered sync hook");
    }

    /// Number of registered hooks.
    pub async fn hook_count(&self) -> usize {
        self.hooks.read().await.len()
    }

    async fn matching_hooks(&self, event: &SyncEvent) -> Vec<Arc<dyn SyncHook>> {
        let hooks = self.hooks.read().await;
        hooks.iter().filter(|h| h.matches(event)).cloned().collect()
    }

    /// Dispatch an event to all matching hooks, in registration order.
    ///
    /// Hooks run sequentially so invocations for a channel keep their
    /// receipt order within the process. Each hook is wrapped in timeout
    /// protection and panic recovery; failures are logged and the
    /// dispatcher moves on to the next hook.
    pub async fn dispatch(&self, event: &SyncEvent) {
        let hooks = self.matching_hooks(event).await;

        if hooks.is_empty() {
            debug!(channel = %event.channel(), "no hooks matched event");
            return;
        }

        for hook in hooks {
            let hook_name = hook.name().to_string();

            let result = tokio::time::timeout(self.timeout, async {
                AssertUnwindSafe(hook.handle(event)).catch_unwind().await
            })
            .await;

            match result {
                Ok(Ok(Ok(()))) => {
                    debug!(hook = %hook_name, channel = %event.channel(), "hook handled event");
                }
                Ok(Ok(Err(e))) => {
                    warn!(
                        hook = %hook_name,
                        channel = %event.channel(),
                        error = %e,
                        "hook execution failed"
                    );
                }
                Ok(Err(panic)) => {
                    let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    error!(
                        hook = %hook_name,
                        channel = %event.channel(),
                        panic = %panic_msg,
                        "hook panicked"
                    );
                }
                Err(_) => {
                    error!(
                        hook = %hook_name,
                        channel = %event.channel(),
                        timeout_secs = self.timeout.as_secs(),
                        "hook timed out"
                    );
                }
            }
        }
    }

    /// Run `on_start` for all hooks.
    pub async fn on_start(&self) {
        let hooks = self.hooks.read().await;
        for hook in hooks.iter() {
            if let Err(e) = hook.on_start().await {
                warn!(hook = %hook.name(), error = %e, "hook on_start failed");
            }
        }
    }

    /// Run `on_shutdown` for all hooks.
    pub async fn on_shutdown(&self) {
        let hooks = self.hooks.read().await;
        for hook in hooks.iter() {
            if let Err(e) = hook.on_shutdown().await {
                warn!(hook = %hook.name(), error = %e, "hook on_shutdown failed");
            }
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Hook Dispatcher
// ============================================================================

/// Dispatcher that drains a broadcast receiver into the registry.
///
/// Runs as a background task until the channel closes, then drains hook
/// shutdown handlers.
pub struct HookDispatcher {
    registry: Arc<HookRegistry>,
}

impl HookDispatcher {
    /// Create a new dispatcher.
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self { registry }
    }

    /// Run the dispatcher, consuming events from the receiver.
    pub async fn run(self, mut receiver: broadcast::Receiver<SyncEvent>) {
        info!("starting hook dispatcher");

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.registry.dispatch(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Missed events are recoverable: the next reload converges.
                    warn!(missed = n, "dispatcher lagged, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("dispatcher channel closed, stopping");
                    break;
                }
            }
        }

        self.registry.on_shutdown().await;
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBroadcaster;
    use crate::events::types::{BusChannel, TenantReload};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHook {
        name: &'static str,
        count: AtomicU32,
    }

    impl CountingHook {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                count: AtomicU32::new(0),
            }
        }

        fn count(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncHook for CountingHook {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _event: &SyncEvent) -> Result<(), HookError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanicHook;

    #[async_trait]
    impl SyncHook for PanicHook {
        fn name(&self) -> &str {
            "panic_hook"
        }

        async fn handle(&self, _event: &SyncEvent) -> Result<(), HookError> {
            panic!("handler blew up");
        }
    }

    struct ChannelBoundHook {
        inner: CountingHook,
    }

    #[async_trait]
    impl SyncHook for ChannelBoundHook {
        fn name(&self) -> &str {
            "reload_bound"
        }

        fn channels(&self) -> &[BusChannel] {
            &[BusChannel::TenantReload]
        }

        async fn handle(&self, event: &SyncEvent) -> Result<(), HookError> {
            self.inner.handle(event).await
        }
    }

    fn reload(tenant: &str) -> SyncEvent {
        SyncEvent::TenantReload(TenantReload {
            tenant_id: tenant.into(),
        })
    }

    #[tokio::test]
    async fn dispatch_reaches_registered_hooks() {
        let registry = HookRegistry::new();
        let hook = Arc::new(CountingHook::new("counter"));
        registry.register(hook.clone()).await;

        registry.dispatch(&reload("G1")).await;

        assert_eq!(hook.count(), 1);
    }

    #[tokio::test]
    async fn panic_in_one_hook_does_not_starve_others() {
        let registry = HookRegistry::new();
        let counting = Arc::new(CountingHook::new("counter"));
        registry.register(Arc::new(PanicHook)).await;
        registry.register(counting.clone()).await;

        registry.dispatch(&reload("G1")).await;

        assert_eq!(counting.count(), 1);
    }

    #[tokio::test]
    async fn channel_bound_hook_skips_other_channels() {
        let registry = HookRegistry::new();
        let hook = Arc::new(ChannelBoundHook {
            inner: CountingHook::new("inner"),
        });
        registry.register(hook.clone()).await;

        let update = SyncEvent::ConfigUpdate(crate::events::types::ConfigUpdate {
            tenant_id: "G1".into(),
            settings: serde_json::json!({}),
        });
        registry.dispatch(&update).await;
        registry.dispatch(&reload("G1")).await;

        assert_eq!(hook.inner.count(), 1);
    }

    #[tokio::test]
    async fn dispatcher_drains_broadcast_receiver() {
        let broadcaster = EventBroadcaster::new();
        let registry = Arc::new(HookRegistry::new());
        let hook = Arc::new(CountingHook::new("counter"));
        registry.register(hook.clone()).await;

        let dispatcher = HookDispatcher::new(registry.clone());
        tokio::spawn(dispatcher.run(broadcaster.subscribe()));

        broadcaster.send(reload("G1"));
        broadcaster.send(reload("G2"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(hook.count(), 2);
    }
}
