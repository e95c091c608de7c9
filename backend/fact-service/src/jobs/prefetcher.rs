//! Prefetch Controller
//!
//! Keeps the delivery queue above a low-water mark. Each tick:
//!
//! 1. Reads the queue length; at or above `min_facts` the tick is a no-op.
//! 2. Picks a category: with `advanced_probability` from the advanced
//!    provider (categories discovered by propagation), otherwise, or when
//!    the advanced provider is empty, from the basic catalogue.
//! 3. Fetches `batch_size` summaries, normalizes and saves each one.
//!    A bad item is counted and skipped; it never aborts the batch.
//!
//! A failed fetch is logged and left to the next tick; there is no retry
//! loop here beyond what the content source does itself.

use crate::cache::FactCache;
use crate::category::CategoryProvider;
use crate::content::{normalize, SharedContentSource};
use crate::context::RequestContext;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::prefetch as metrics;
use crate::shutdown::ShutdownSignal;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How often to check occupancy
const PREFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Summaries requested per fetch
const BATCH_SIZE: usize = 5;

/// Low-water mark for the delivery queue
const MIN_FACTS: u64 = 50;

/// Configuration for the prefetcher
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub batch_size: usize,
    pub min_facts: u64,
    pub prefetch_on_start: bool,
    /// Chance of drawing from the advanced provider first
    pub advanced_probability: f64,
    /// Upper bound on one fetch from the content source
    pub fetch_timeout: Duration,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: PREFETCH_INTERVAL,
            batch_size: BATCH_SIZE,
            min_facts: MIN_FACTS,
            prefetch_on_start: true,
            advanced_probability: 0.7,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue already at or above the low-water mark
    Skipped { ready: u64 },
    Fetched {
        category: String,
        provider: &'static str,
        saved: usize,
        rejected: usize,
        failed: usize,
    },
}

pub struct Prefetcher {
    cache: FactCache,
    content: SharedContentSource,
    basic: Arc<CategoryProvider>,
    advanced: Arc<CategoryProvider>,
    config: PrefetchConfig,
}

impl Prefetcher {
    pub fn new(
        cache: FactCache,
        content: SharedContentSource,
        basic: Arc<CategoryProvider>,
        advanced: Arc<CategoryProvider>,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            cache,
            content,
            basic,
            advanced,
            config,
        }
    }

    /// Run until `shutdown` fires. Returns immediately when disabled.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        if !self.config.enabled {
            info!("Prefetcher disabled by configuration");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            min_facts = self.config.min_facts,
            basic_categories = self.basic.len(),
            "Starting prefetcher background job"
        );

        if self.config.prefetch_on_start {
            self.run_cycle().await;
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => self.run_cycle().await,
            }
        }

        info!("Prefetcher stopped");
    }

    async fn run_cycle(&self) {
        let ctx = RequestContext::background();
        let cycle_start = Instant::now();

        match self.tick(&ctx).await {
            Ok(TickOutcome::Skipped { ready }) => {
                metrics::record_tick("skipped");
                debug!(
                    correlation_id = %ctx.correlation_id,
                    ready,
                    "Enough facts ready, skipping prefetch"
                );
            }
            Ok(TickOutcome::Fetched {
                category,
                provider,
                saved,
                rejected,
                failed,
            }) => {
                metrics::record_tick("fetched");
                metrics::record_tick_duration(cycle_start.elapsed());
                info!(
                    correlation_id = %ctx.correlation_id,
                    category = %category,
                    provider,
                    saved,
                    rejected,
                    failed,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Prefetch cycle completed"
                );
            }
            Err(e) => {
                metrics::record_tick("error");
                warn!(
                    correlation_id = %ctx.correlation_id,
                    error = %e,
                    transient = e.is_transient(),
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Prefetch cycle failed"
                );
            }
        }
    }

    /// One control step; see the module docs.
    pub async fn tick(&self, ctx: &RequestContext) -> ServiceResult<TickOutcome> {
        let ready = self.cache.count_ready().await?;
        metrics::set_ready_facts(ready);

        if ready >= self.config.min_facts {
            return Ok(TickOutcome::Skipped { ready });
        }

        let (category, provider) = self.pick_category()?;

        let summaries = tokio::time::timeout(
            self.config.fetch_timeout,
            self.content
                .fetch_summaries(&category, self.config.batch_size),
        )
        .await
        .map_err(|_| {
            ServiceError::Timeout(format!(
                "fetching '{}' took longer than {:?}",
                category, self.config.fetch_timeout
            ))
        })??;

        let (mut saved, mut rejected, mut failed) = (0, 0, 0);
        for mut summary in summaries {
            if summary.category.is_empty() {
                summary.category = category.clone();
            }

            let fact = match normalize(summary) {
                Ok(fact) => fact,
                Err(e) => {
                    debug!(
                        correlation_id = %ctx.correlation_id,
                        category = %category,
                        error = %e,
                        "Rejected fetched article"
                    );
                    rejected += 1;
                    continue;
                }
            };

            match self.cache.save(ctx, &fact).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        fact_id = %fact.id,
                        error = %e,
                        "Failed to save fact"
                    );
                    failed += 1;
                }
            }
        }

        metrics::record_facts("saved", provider, saved as u64);
        metrics::record_facts("rejected", provider, rejected as u64);
        metrics::record_facts("failed", provider, failed as u64);

        Ok(TickOutcome::Fetched {
            category,
            provider,
            saved,
            rejected,
            failed,
        })
    }

    fn pick_category(&self) -> ServiceResult<(String, &'static str)> {
        let probability = self.config.advanced_probability.clamp(0.0, 1.0);
        if rand::thread_rng().gen_bool(probability) {
            match self.advanced.next() {
                Ok(category) => return Ok((category, "advanced")),
                Err(e) => debug!(error = %e, "Advanced provider unavailable, using basic"),
            }
        }

        Ok((self.basic.next()?, "basic"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::content::{ArticleSummary, ContentError, ContentResult, ContentSource, FixtureContentSource};
    use crate::shutdown;
    use parking_lot::Mutex;
    use story_cache::{CacheError, CacheResult, KeyValueStore, MemoryStore};

    struct Fixture {
        prefetcher: Prefetcher,
        cache: FactCache,
    }

    fn fixture(
        content: SharedContentSource,
        basic: CategoryProvider,
        advanced: CategoryProvider,
        config: PrefetchConfig,
    ) -> Fixture {
        let basic = Arc::new(basic);
        let cache = FactCache::new(
            Arc::new(MemoryStore::new()),
            basic.clone(),
            CacheConfig::default(),
        );
        let prefetcher = Prefetcher::new(cache.clone(), content, basic, Arc::new(advanced), config);
        Fixture { prefetcher, cache }
    }

    fn config(min_facts: u64, advanced_probability: f64) -> PrefetchConfig {
        PrefetchConfig {
            min_facts,
            advanced_probability,
            batch_size: 3,
            prefetch_on_start: false,
            interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tick_fetches_and_saves_batch() {
        let f = fixture(
            Arc::new(FixtureContentSource::demo("en")),
            CategoryProvider::fixed("World_War_II"),
            CategoryProvider::stack(Vec::<String>::new()),
            config(10, 0.0),
        );

        let outcome = f.prefetcher.tick(&RequestContext::new()).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Fetched {
                category: "World_War_II".into(),
                provider: "basic",
                saved: 3,
                rejected: 0,
                failed: 0,
            }
        );
        assert_eq!(f.cache.count_ready().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_tick_skips_when_enough_ready() {
        let f = fixture(
            Arc::new(FixtureContentSource::demo("en")),
            CategoryProvider::fixed("World_War_II"),
            CategoryProvider::stack(Vec::<String>::new()),
            config(3, 0.0),
        );
        let ctx = RequestContext::new();
        f.prefetcher.tick(&ctx).await.unwrap();

        let outcome = f.prefetcher.tick(&ctx).await.unwrap();
        assert_eq!(outcome, TickOutcome::Skipped { ready: 3 });
    }

    #[tokio::test]
    async fn test_advanced_provider_preferred_then_falls_back() {
        let f = fixture(
            Arc::new(FixtureContentSource::demo("en")),
            CategoryProvider::fixed("World_War_II"),
            CategoryProvider::stack(["Machine_learning"]),
            config(100, 1.0),
        );
        let ctx = RequestContext::new();

        match f.prefetcher.tick(&ctx).await.unwrap() {
            TickOutcome::Fetched { category, provider, .. } => {
                assert_eq!(category, "Machine_learning");
                assert_eq!(provider, "advanced");
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // Stack is now empty
        match f.prefetcher.tick(&ctx).await.unwrap() {
            TickOutcome::Fetched { category, provider, .. } => {
                assert_eq!(category, "World_War_II");
                assert_eq!(provider, "basic");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_and_saves_nothing() {
        let f = fixture(
            Arc::new(FixtureContentSource::demo("en")),
            CategoryProvider::fixed("Unknown_topic"),
            CategoryProvider::stack(Vec::<String>::new()),
            config(10, 0.0),
        );

        let err = f.prefetcher.tick(&RequestContext::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Fetch(ContentError::UnknownCategory(_))));
        assert_eq!(f.cache.count_ready().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_items_are_skipped() {
        let content = FixtureContentSource::new("en")
            .with_article("Go", "Goroutine", "A lightweight thread.", None, "https://go.dev")
            .with_article("Go", "", "No title here.", None, "https://go.dev/x")
            .with_article("Go", "Channels", "Typed conduits.", None, "https://go.dev/ch");
        let f = fixture(
            Arc::new(content),
            CategoryProvider::fixed("Go"),
            CategoryProvider::stack(Vec::<String>::new()),
            config(10, 0.0),
        );

        match f.prefetcher.tick(&RequestContext::new()).await.unwrap() {
            TickOutcome::Fetched { saved, rejected, .. } => {
                assert_eq!(saved, 2);
                assert_eq!(rejected, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    /// Store whose category-index writes fail after the body is stored
    struct FlakyIndexStore {
        inner: MemoryStore,
        fail_sadd: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for FlakyIndexStore {
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
            self.inner.set_ex(key, value, ttl).await
        }
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.inner.get(key).await
        }
        async fn del(&self, key: &str) -> CacheResult<()> {
            self.inner.del(key).await
        }
        async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
            self.inner.exists_many(keys).await
        }
        async fn lpush(&self, key: &str, value: &str) -> CacheResult<u64> {
            self.inner.lpush(key, value).await
        }
        async fn rpop(&self, key: &str) -> CacheResult<Option<String>> {
            self.inner.rpop(key).await
        }
        async fn llen(&self, key: &str) -> CacheResult<u64> {
            self.inner.llen(key).await
        }
        async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
            self.inner.lrange(key, start, stop).await
        }
        async fn lrem(&self, key: &str, value: &str) -> CacheResult<u64> {
            self.inner.lrem(key, value).await
        }
        async fn sadd(&self, key: &str, member: &str) -> CacheResult<bool> {
            let fail = {
                let mut flag = self.fail_sadd.lock();
                std::mem::replace(&mut *flag, false)
            };
            if fail {
                return Err(CacheError::Timeout(Duration::from_millis(1)));
            }
            self.inner.sadd(key, member).await
        }
        async fn srem(&self, key: &str, members: &[String]) -> CacheResult<u64> {
            self.inner.srem(key, members).await
        }
        async fn srandmember(&self, key: &str, count: usize) -> CacheResult<Vec<String>> {
            self.inner.srandmember(key, count).await
        }
        async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
            self.inner.smembers(key).await
        }
        async fn scard(&self, key: &str) -> CacheResult<u64> {
            self.inner.scard(key).await
        }
        async fn ping(&self) -> CacheResult<()> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn test_one_failed_save_does_not_abort_batch() {
        let store = Arc::new(FlakyIndexStore {
            inner: MemoryStore::new(),
            fail_sadd: Mutex::new(true),
        });
        let basic = Arc::new(CategoryProvider::fixed("World_War_II"));
        let cache = FactCache::new(store, basic.clone(), CacheConfig::default());
        let prefetcher = Prefetcher::new(
            cache.clone(),
            Arc::new(FixtureContentSource::demo("en")),
            basic,
            Arc::new(CategoryProvider::stack(Vec::<String>::new())),
            config(10, 0.0),
        );

        match prefetcher.tick(&RequestContext::new()).await.unwrap() {
            TickOutcome::Fetched { saved, failed, .. } => {
                assert_eq!(saved, 2);
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // The partially written fact still sits in the delivery queue
        assert_eq!(cache.count_ready().await.unwrap(), 3);
    }

    struct SlowContent;

    #[async_trait::async_trait]
    impl ContentSource for SlowContent {
        async fn fetch_summaries(&self, _: &str, _: usize) -> ContentResult<Vec<ArticleSummary>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
        async fn fetch_subcategories(&self, _: &str, _: usize) -> ContentResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn ping(&self) -> ContentResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fetch_bounded_by_timeout() {
        let f = fixture(
            Arc::new(SlowContent),
            CategoryProvider::fixed("Go"),
            CategoryProvider::stack(Vec::<String>::new()),
            PrefetchConfig {
                fetch_timeout: Duration::from_millis(30),
                ..config(10, 0.0)
            },
        );

        let err = f.prefetcher.tick(&RequestContext::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_run_fills_cache_and_stops_on_shutdown() {
        let f = fixture(
            Arc::new(FixtureContentSource::demo("en")),
            CategoryProvider::fixed("Machine_learning"),
            CategoryProvider::stack(Vec::<String>::new()),
            PrefetchConfig {
                prefetch_on_start: true,
                ..config(1, 0.0)
            },
        );
        let cache = f.cache.clone();
        let (trigger, signal) = shutdown::channel();
        let prefetcher = Arc::new(f.prefetcher);
        let runner = {
            let prefetcher = prefetcher.clone();
            tokio::spawn(async move { prefetcher.run(signal).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("prefetcher did not stop")
            .unwrap();

        // One fetch of three, then every later tick is skipped
        assert_eq!(cache.count_ready().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_disabled_prefetcher_returns_immediately() {
        let f = fixture(
            Arc::new(FixtureContentSource::demo("en")),
            CategoryProvider::fixed("Go"),
            CategoryProvider::stack(Vec::<String>::new()),
            PrefetchConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let (_trigger, signal) = shutdown::channel();
        tokio::time::timeout(Duration::from_millis(100), f.prefetcher.run(signal))
            .await
            .expect("disabled prefetcher should not loop");
        assert_eq!(f.cache.count_ready().await.unwrap(), 0);
    }
}
