//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    writes: CounterVec,
    evictions: CounterVec,
    errors: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("story_cache_hits_total", "Total cache hits"),
                &["entity"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("story_cache_misses_total", "Total cache misses"),
                &["entity"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new("story_cache_writes_total", "Total cache writes"),
                &["entity"],
            )
            .expect("valid metric definition"),
            evictions: CounterVec::new(
                Opts::new(
                    "story_cache_evictions_total",
                    "Total entries removed from lists and sets",
                ),
                &["entity"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("story_cache_errors_total", "Total cache errors"),
                &["entity", "error_type"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.evictions.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

fn extract_entity(key: &str) -> &str {
    crate::CacheKey::entity_type(key).unwrap_or("unknown")
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics().hits.with_label_values(&[entity]).inc();
    }

    pub fn record_miss(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics().misses.with_label_values(&[entity]).inc();
    }

    pub fn record_write(&self, key: &str) {
        let entity = extract_entity(key);
        get_metrics().writes.with_label_values(&[entity]).inc();
    }

    pub fn record_eviction(&self, key: &str, count: u64) {
        let entity = extract_entity(key);
        get_metrics()
            .evictions
            .with_label_values(&[entity])
            .inc_by(count as f64);
    }

    pub fn record_error(&self, key: &str, error_type: &str) {
        let entity = extract_entity(key);
        get_metrics()
            .errors
            .with_label_values(&[entity, error_type])
            .inc();
    }
}
