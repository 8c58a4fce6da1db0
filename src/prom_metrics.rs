//! # Prometheus Metrics: Exposition for Scraping
//!
//! Exposes habitsync operational metrics in the Prometheus text exposition
//! format.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `habitsync_sync_messages_total` | Counter | `topic` | Messages broadcast per topic |
//! | `habitsync_sync_dropped_subscribers_total` | Counter | `topic` | Connections dropped for a full or closed queue |
//! | `habitsync_sync_subscribers` | Gauge | `topic` | Currently registered connections |
//! | `habitsync_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//! | `habitsync_stats_cache_hits_total` | Counter | - | Month/year stats served from cache |
//! | `habitsync_stats_cache_misses_total` | Counter | - | Month/year stats recomputed |
//!
//! The hubs update the sync metrics as they fan out; the `/metrics` endpoint
//! renders the registry on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Label set for per-topic sync metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct TopicLabel {
    pub topic: String,
}

impl TopicLabel {
    pub fn new(topic: impl std::fmt::Display) -> Self {
        TopicLabel {
            topic: topic.to_string(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

type HistogramFamily = Family<HttpLabel, Histogram, fn() -> Histogram>;

fn request_histogram() -> Histogram {
    // 5ms .. ~10s
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Thread-safe metrics registry.
///
/// All fields use atomic types and are safe to update from any task.
pub struct Metrics {
    pub registry: Registry,
    pub sync_messages: Family<TopicLabel, Counter>,
    pub sync_dropped_subscribers: Family<TopicLabel, Counter>,
    pub sync_subscribers: Family<TopicLabel, Gauge>,
    pub http_request_duration: HistogramFamily,
    pub stats_cache_hits: Counter,
    pub stats_cache_misses: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sync_messages = Family::<TopicLabel, Counter>::default();
        registry.register(
            "habitsync_sync_messages",
            "Messages broadcast by topic",
            sync_messages.clone(),
        );

        let sync_dropped_subscribers = Family::<TopicLabel, Counter>::default();
        registry.register(
            "habitsync_sync_dropped_subscribers",
            "Connections dropped because their queue was full or closed",
            sync_dropped_subscribers.clone(),
        );

        let sync_subscribers = Family::<TopicLabel, Gauge>::default();
        registry.register(
            "habitsync_sync_subscribers",
            "Registered connections by topic",
            sync_subscribers.clone(),
        );

        let http_request_duration: HistogramFamily =
            Family::new_with_constructor(request_histogram);
        registry.register(
            "habitsync_http_request_duration_seconds",
            "HTTP request latency",
            http_request_duration.clone(),
        );

        let stats_cache_hits = Counter::default();
        registry.register(
            "habitsync_stats_cache_hits",
            "Month/year statistics served from cache",
            stats_cache_hits.clone(),
        );

        let stats_cache_misses = Counter::default();
        registry.register(
            "habitsync_stats_cache_misses",
            "Month/year statistics recomputed from day tasks",
            stats_cache_misses.clone(),
        );

        Self {
            registry,
            sync_messages,
            sync_dropped_subscribers,
            sync_subscribers,
            http_request_duration,
            stats_cache_hits,
            stats_cache_misses,
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
