//! Prometheus metrics, registered lazily on the default registry

pub mod cache;
pub mod cleaner;
pub mod prefetch;
pub mod propagation;
pub mod serving;

use prometheus::{Encoder, TextEncoder};

/// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_metrics() {
        prefetch::record_tick("skipped");
        let text = render();
        assert!(text.contains("fact_prefetch_ticks_total"));
    }
}
