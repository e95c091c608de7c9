//! Cache Cleaner Metrics
//!
//! Prometheus metrics for the dead-entry sweep job

use once_cell::sync::Lazy;
use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};
use std::time::Duration;

static CLEANUP_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_cache_cleaner_runs_total",
        "Total cache sweep cycles (success/error)",
        &["status"]
    )
    .expect("Failed to register cache cleaner runs metric")
});

static CLEANUP_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "fact_cache_cleaner_duration_seconds",
        "Duration of cache sweep cycles",
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register cache cleaner duration metric")
});

static ENTRIES_PRUNED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_cache_cleaner_pruned_total",
        "Entries removed by the sweep, by structure",
        &["structure"]
    )
    .expect("Failed to register cache cleaner pruned metric")
});

/// Record sweep result (success/error)
pub fn record_cleanup_run(status: &str) {
    CLEANUP_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_cleanup_duration(duration: Duration) {
    CLEANUP_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record pruned entries by structure (queue/category/registry)
pub fn record_pruned(structure: &str, count: u64) {
    ENTRIES_PRUNED_TOTAL
        .with_label_values(&[structure])
        .inc_by(count);
}
