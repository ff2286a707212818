//! Integration tests for the shared store adapter against a real Redis.

mod common;

use std::time::Duration;

use switchboard_server::config::RedisConfig;
use switchboard_server::store::SharedStore;

#[tokio::test]
async fn get_set_delete_roundtrip() {
    let store = common::connected_store().await;

    store.set("it:kv", r#"{"a":1}"#, None).await;
    assert_eq!(store.get("it:kv").await.as_deref(), Some(r#"{"a":1}"#));
    assert!(store.exists("it:kv").await);

    store.delete("it:kv").await;
    assert_eq!(store.get("it:kv").await, None);
    assert!(!store.exists("it:kv").await);
}

#[tokio::test]
async fn ttl_expires_entries() {
    let store = common::connected_store().await;

    store
        .set("it:ttl", "1", Some(Duration::from_secs(1)))
        .await;
    assert!(store.exists("it:ttl").await);
    assert!(store.ttl("it:ttl").await.is_some());

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(!store.exists("it:ttl").await);
}

#[tokio::test]
async fn increment_counts_within_one_window() {
    let store = common::connected_store().await;
    let window = Duration::from_secs(60);

    assert_eq!(
        store.increment_with_expiry("it:ctr:a", window).await,
        Some(1)
    );
    assert_eq!(
        store.increment_with_expiry("it:ctr:a", window).await,
        Some(2)
    );
    assert_eq!(
        store.increment_with_expiry("it:ctr:a", window).await,
        Some(3)
    );

    // Independent identifier, independent window
    assert_eq!(
        store.increment_with_expiry("it:ctr:b", window).await,
        Some(1)
    );

    store.delete("it:ctr:a").await;
    store.delete("it:ctr:b").await;
}

#[tokio::test]
async fn increments_leave_the_window_expiry_untouched() {
    let store = common::connected_store().await;
    let window = Duration::from_secs(1);

    assert_eq!(
        store.increment_with_expiry("it:ctr:win", window).await,
        Some(1)
    );
    tokio::time::sleep(Duration::from_millis(600)).await;

    // This increment must not push the expiry out
    assert_eq!(
        store.increment_with_expiry("it:ctr:win", window).await,
        Some(2)
    );
    tokio::time::sleep(Duration::from_millis(700)).await;

    // Window opened at t=0 with 1s expiry, so by t=1.3s a fresh one starts
    assert_eq!(
        store.increment_with_expiry("it:ctr:win", window).await,
        Some(1)
    );

    store.delete("it:ctr:win").await;
}

#[tokio::test]
async fn delete_prefix_clears_only_the_key_space() {
    let store = common::connected_store().await;

    store.set("it:tenant:G1:config", "1", None).await;
    store.set("it:tenant:G1:module:economy", "2", None).await;
    store.set("it:tenant:G2:config", "3", None).await;

    store.delete_prefix("it:tenant:G1:").await;

    assert!(!store.exists("it:tenant:G1:config").await);
    assert!(!store.exists("it:tenant:G1:module:economy").await);
    assert!(store.exists("it:tenant:G2:config").await);

    store.delete("it:tenant:G2:config").await;
}

#[tokio::test]
async fn publish_without_subscribers_is_a_silent_noop() {
    let store = common::connected_store().await;
    assert_eq!(store.publish("it:nobody-listens", "{}").await, 0);
}

#[tokio::test]
async fn unreachable_store_fails_soft() {
    let config = RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        pool_size: 2,
        timeout_ms: 500,
    };
    let store = SharedStore::connect(&config).await;

    // Every command degrades to its neutral result instead of erroring
    store.set("it:dead", "1", None).await;
    assert_eq!(store.get("it:dead").await, None);
    assert!(!store.exists("it:dead").await);
    assert_eq!(
        store
            .increment_with_expiry("it:dead", Duration::from_secs(60))
            .await,
        None
    );
    assert!(!store.is_available().await);
}
