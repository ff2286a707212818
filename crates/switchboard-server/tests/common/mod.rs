//! Shared test harness: one Redis container for the whole suite.
#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use switchboard_server::config::RedisConfig;
use switchboard_server::store::SharedStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container.
pub async fn redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{host_port}");

            (container, url)
        })
        .await;

    url.clone()
}

pub fn redis_config(url: String) -> RedisConfig {
    RedisConfig {
        enabled: true,
        url,
        pool_size: 5,
        timeout_ms: 5000,
    }
}

pub async fn connected_store() -> SharedStore {
    let url = redis_url().await;
    SharedStore::connect(&redis_config(url)).await
}

/// Poll `check` until it returns true or the deadline passes.
pub async fn wait_until<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
