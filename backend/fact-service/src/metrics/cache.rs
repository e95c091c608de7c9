use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

static DANGLING_ENTRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_cache_dangling_entries_total",
        "Index entries found pointing at an expired fact body",
        &["index"]
    )
    .expect("Failed to register dangling entries metric")
});

/// Record dangling ids hit on read (queue/category)
pub fn record_dangling(index: &str, count: u64) {
    DANGLING_ENTRIES_TOTAL
        .with_label_values(&[index])
        .inc_by(count);
}
