/// Retry wrapper for content sources: exponential backoff with jitter,
/// transient failures only.
use super::{ArticleSummary, ContentResult, ContentSource};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

pub struct RetryingSource<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: ContentSource> RetryingSource<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        category: &str,
        mut f: F,
    ) -> ContentResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ContentResult<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.config.initial_backoff;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = jittered(backoff, self.config.jitter);

                    warn!(
                        operation,
                        category = %category,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Content source call failed, retrying"
                    );

                    tokio::time::sleep(delay).await;

                    backoff = Duration::from_millis(
                        ((backoff.as_millis() as f64 * self.config.backoff_multiplier)
                            .min(self.config.max_backoff.as_millis() as f64))
                            as u64,
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn jittered(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    } else {
        base
    }
}

#[async_trait::async_trait]
impl<S: ContentSource> ContentSource for RetryingSource<S> {
    async fn fetch_summaries(
        &self,
        category: &str,
        limit: usize,
    ) -> ContentResult<Vec<ArticleSummary>> {
        self.run("fetch_summaries", category, || {
            self.inner.fetch_summaries(category, limit)
        })
        .await
    }

    async fn fetch_subcategories(&self, category: &str, limit: usize) -> ContentResult<Vec<String>> {
        self.run("fetch_subcategories", category, || {
            self.inner.fetch_subcategories(category, limit)
        })
        .await
    }

    async fn ping(&self) -> ContentResult<()> {
        // Readiness must reflect the current state, not a retried one
        self.inner.ping().await
    }
}
