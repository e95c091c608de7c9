//! Prefetcher Metrics

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram,
    IntCounterVec, IntGauge,
};
use std::time::Duration;

static TICKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_prefetch_ticks_total",
        "Prefetch ticks by outcome (skipped/fetched/error)",
        &["outcome"]
    )
    .expect("Failed to register prefetch ticks metric")
});

static FACTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_prefetch_facts_total",
        "Fetched items by result (saved/rejected/failed)",
        &["result", "provider"]
    )
    .expect("Failed to register prefetch facts metric")
});

static TICK_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "fact_prefetch_tick_duration_seconds",
        "Duration of prefetch ticks that fetched content",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register prefetch duration metric")
});

static READY_FACTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "fact_prefetch_ready_facts",
        "Delivery queue length observed at the last tick"
    )
    .expect("Failed to register ready facts metric")
});

pub fn record_tick(outcome: &str) {
    TICKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_facts(result: &str, provider: &str, count: u64) {
    FACTS_TOTAL
        .with_label_values(&[result, provider])
        .inc_by(count);
}

pub fn record_tick_duration(duration: Duration) {
    TICK_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_ready_facts(count: u64) {
    READY_FACTS.set(count as i64);
}
