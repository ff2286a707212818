use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use switchboard_core::{EventBroadcaster, HookDispatcher, HookRegistry};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::{CacheBackend, TenantConfigCache};
use crate::config::AppConfig;
use crate::events::{EventBus, RedisBusListener};
use crate::gateway::{self, ConnectionRegistry, GatewayAuth, GatewayFanoutHook};
use crate::middleware as app_middleware;
use crate::middleware::RateLimitState;
use crate::provider::{ConfigProvider, MemoryProvider, TenantDirectory};
use crate::store::SharedStore;
use crate::sync::{ChangePublisher, cache_sync_hook};
use crate::handlers;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub cache: TenantConfigCache,
    pub provider: Arc<dyn ConfigProvider>,
    pub directory: Arc<dyn TenantDirectory>,
    pub publisher: ChangePublisher,
    pub registry: Arc<ConnectionRegistry>,
    pub gateway_auth: Arc<GatewayAuth>,
    pub rate_limit: RateLimitState,
    pub broadcaster: Arc<EventBroadcaster>,
}

pub fn build_app(state: AppState) -> Router {
    // API routes carry bearer auth and rate limiting; auth must sit
    // outside the limiter so the user-scoped window sees the caller.
    let api = Router::new()
        .route(
            "/tenants/{tenant_id}/config",
            get(handlers::get_tenant_config).put(handlers::put_tenant_config),
        )
        .route(
            "/tenants/{tenant_id}/modules/{module}",
            get(handlers::get_module_config).put(handlers::put_module_config),
        )
        .route("/tenants/{tenant_id}/reload", post(handlers::post_tenant_reload))
        .route(
            "/tenants/{tenant_id}/revocations",
            post(handlers::post_revocation),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authentication_middleware,
        ));

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        // Persistent-connection gateway (does its own handshake auth)
        .route("/gateway", get(gateway::gateway_handler))
        .nest("/api", api)
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct SwitchboardServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    config: AppConfig,
    provider: Option<Arc<dyn ConfigProvider>>,
    directory: Option<Arc<dyn TenantDirectory>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            provider: None,
            directory: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Plug in the real source of truth. Local runs and tests fall back
    /// to the in-memory provider.
    pub fn with_source_of_truth(
        mut self,
        provider: Arc<dyn ConfigProvider>,
        directory: Arc<dyn TenantDirectory>,
    ) -> Self {
        self.provider = Some(provider);
        self.directory = Some(directory);
        self
    }

    /// Wire everything up: store, cache, bus, hooks, gateway.
    pub async fn build(self) -> anyhow::Result<SwitchboardServer> {
        crate::metrics::init_metrics();

        let store = SharedStore::connect(&self.config.redis).await;

        let (provider, directory) = match (self.provider, self.directory) {
            (Some(provider), Some(directory)) => (provider, directory),
            _ => {
                tracing::info!("no source of truth configured, using in-memory provider");
                let memory = MemoryProvider::new_shared();
                (
                    memory.clone() as Arc<dyn ConfigProvider>,
                    memory as Arc<dyn TenantDirectory>,
                )
            }
        };

        let cache = TenantConfigCache::new(
            CacheBackend::new(store.clone()),
            provider.clone(),
            self.config.cache_ttl(),
        );
        let bus = EventBus::new(store.clone());
        let publisher = ChangePublisher::new(cache.clone(), bus);

        let broadcaster = EventBroadcaster::new_shared();
        let registry = Arc::new(ConnectionRegistry::new());

        // Every process reacts to bus events through the same hook path,
        // whether it published them or heard them on the wire.
        let hooks = Arc::new(HookRegistry::new());
        hooks.register(cache_sync_hook(cache.clone())).await;
        hooks
            .register(Arc::new(GatewayFanoutHook::new(registry.clone())))
            .await;
        hooks.on_start().await;
        tokio::spawn(HookDispatcher::new(hooks).run(broadcaster.subscribe()));

        RedisBusListener::new(store.clone(), broadcaster.clone()).spawn();

        let rate_limit = RateLimitState::from_config(store.clone(), &self.config.rate_limit);

        let state = AppState {
            store,
            cache,
            provider,
            directory,
            publisher,
            registry,
            gateway_auth: Arc::new(GatewayAuth::new(&self.config.auth.secret)),
            rate_limit,
            broadcaster,
        };

        let app = build_app(state);

        Ok(SwitchboardServer {
            addr: self.config.addr(),
            app,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchboardServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
