//! Cache Cleaner Background Job
//!
//! Periodically removes index entries whose fact body has expired:
//! ids in the delivery queue, ids in per-category sets, and categories
//! whose set became empty. Bodies themselves expire through their TTL.

use crate::cache::{FactCache, SweepReport};
use crate::context::RequestContext;
use crate::error::ServiceResult;
use crate::metrics::cleaner as metrics;
use crate::shutdown::ShutdownSignal;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Sweep interval
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the cache cleaner
#[derive(Debug, Clone)]
pub struct CacheCleanerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for CacheCleanerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: CLEANUP_INTERVAL,
        }
    }
}

/// Start the cache cleaner loop; returns when `shutdown` fires.
pub async fn start_cache_cleaner(
    cache: FactCache,
    config: CacheCleanerConfig,
    mut shutdown: ShutdownSignal,
) {
    if !config.enabled {
        info!("Cache cleaner disabled by configuration");
        return;
    }

    info!(
        interval_secs = config.interval.as_secs(),
        "Starting cache cleaner background job"
    );

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick; nothing has expired at startup
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                if let Err(e) = run_cleanup_cycle(&cache).await {
                    error!(
                        error = %e,
                        transient = e.is_transient(),
                        "Cache cleanup cycle failed, retrying next interval"
                    );
                }
            }
        }
    }

    info!("Cache cleaner stopped");
}

/// Run a single sweep and record its metrics. Errors are returned
/// unlogged; the loop in [`start_cache_cleaner`] reports them.
pub async fn run_cleanup_cycle(cache: &FactCache) -> ServiceResult<SweepReport> {
    let ctx = RequestContext::background();
    let cycle_start = Instant::now();

    let result = cache.clean_dead_entries(&ctx).await;
    metrics::record_cleanup_duration(cycle_start.elapsed());

    match &result {
        Ok(report) => {
            metrics::record_cleanup_run("success");
            metrics::record_pruned("queue", report.queue_removed);
            metrics::record_pruned("category", report.category_entries_removed);
            metrics::record_pruned("registry", report.categories_dropped as u64);

            info!(
                correlation_id = %ctx.correlation_id,
                queue_scanned = report.queue_scanned,
                queue_removed = report.queue_removed,
                category_entries_removed = report.category_entries_removed,
                categories_dropped = report.categories_dropped,
                duration_ms = cycle_start.elapsed().as_millis() as u64,
                "Cache cleanup cycle completed"
            );
        }
        Err(_) => metrics::record_cleanup_run("error"),
    }

    result
}
