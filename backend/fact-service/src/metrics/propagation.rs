use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

static TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fact_propagation_tasks_total",
        "Propagation tasks by outcome (enqueued/dropped/expanded/leaf/depth_limit/fetch_error/adjust_error)",
        &["outcome"]
    )
    .expect("Failed to register propagation tasks metric")
});

static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "fact_propagation_queue_depth",
        "Tasks waiting in the propagation queue"
    )
    .expect("Failed to register propagation queue depth metric")
});

pub fn record_task(outcome: &str) {
    TASKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as i64);
}
