//! Prometheus metrics for the Switchboard server.
//!
//! - Cache metrics (hit/miss rates per tier)
//! - Bus metrics (events published/received per channel)
//! - Gateway metrics (live connections)
//! - Rate limiter metrics (rejections per scope)

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";

    pub const BUS_EVENTS_PUBLISHED_TOTAL: &str = "bus_events_published_total";
    pub const BUS_EVENTS_RECEIVED_TOTAL: &str = "bus_events_received_total";

    pub const GATEWAY_CONNECTIONS: &str = "gateway_connections";

    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "rate_limit_rejections_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Called once at server startup; we serve `/metrics` ourselves.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_bus_published(channel: &'static str) {
    counter!(names::BUS_EVENTS_PUBLISHED_TOTAL, "channel" => channel).increment(1);
}

pub fn record_bus_received(channel: &'static str) {
    counter!(names::BUS_EVENTS_RECEIVED_TOTAL, "channel" => channel).increment(1);
}

pub fn gateway_connection_opened() {
    gauge!(names::GATEWAY_CONNECTIONS).increment(1.0);
}

pub fn gateway_connection_closed() {
    gauge!(names::GATEWAY_CONNECTIONS).decrement(1.0);
}

pub fn record_rate_limit_rejection(scope: &'static str) {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL, "scope" => scope).increment(1);
}
