use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

static FACTS_SERVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_served_total",
        "Facts served by path (queue/personalized/placeholder)",
        &["path"]
    )
    .expect("Failed to register facts served metric")
});

static LIKES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_category_likes_total",
        "Category affinity adjustments (like/unlike)",
        &["action"]
    )
    .expect("Failed to register likes metric")
});

pub fn record_served(path: &str) {
    FACTS_SERVED_TOTAL.with_label_values(&[path]).inc();
}

pub fn record_like(action: &str) {
    LIKES_TOTAL.with_label_values(&[action]).inc();
}
