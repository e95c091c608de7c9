//! Entry points the transport layer calls into

use crate::cache::FactCache;
use crate::content::SharedContentSource;
use crate::context::RequestContext;
use crate::db::SharedAffinityStore;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::serving as metrics;
use crate::models::{Category, Fact, PropagationTask};
use crate::services::propagation::PropagationQueue;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bound on each dependency probe in the readiness report
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ServingConfig {
    /// Share of per-user requests that try the user's top category first
    pub personalize_probability: f64,
    /// Categories required before a user's ranking is trusted
    pub top_n: usize,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            personalize_probability: 0.6,
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub status: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub checks: BTreeMap<&'static str, DependencyStatus>,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Clone)]
pub struct FactService {
    cache: FactCache,
    affinity: SharedAffinityStore,
    content: SharedContentSource,
    propagation: PropagationQueue,
    config: ServingConfig,
}

impl FactService {
    pub fn new(
        cache: FactCache,
        affinity: SharedAffinityStore,
        content: SharedContentSource,
        propagation: PropagationQueue,
        config: ServingConfig,
    ) -> Self {
        Self {
            cache,
            affinity,
            content,
            propagation,
            config,
        }
    }

    /// Next fact from the queue, or the placeholder when nothing is ready.
    pub async fn get_fact(&self, ctx: &RequestContext) -> ServiceResult<Fact> {
        match self.cache.pop_next(ctx).await {
            Ok(fact) => {
                metrics::record_served("queue");
                Ok(fact)
            }
            Err(e) if e.is_recoverable() => {
                info!(
                    correlation_id = %ctx.correlation_id,
                    reason = e.kind(),
                    "No fact ready, serving placeholder"
                );
                metrics::record_served("placeholder");
                Ok(Fact::placeholder())
            }
            Err(e) => {
                error!(
                    correlation_id = %ctx.correlation_id,
                    error = %e,
                    "Failed to pop fact"
                );
                Err(e)
            }
        }
    }

    /// Like [`get_fact`](Self::get_fact), but a configured share of calls
    /// first try a fact from the user's highest-ranked category.
    pub async fn get_fact_by_user(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> ServiceResult<Fact> {
        let probability = self.config.personalize_probability.clamp(0.0, 1.0);
        let personalize = rand::thread_rng().gen_bool(probability);
        if personalize {
            match self.personalized(ctx, user_id).await {
                Ok(Some(fact)) => {
                    metrics::record_served("personalized");
                    return Ok(fact);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    correlation_id = %ctx.correlation_id,
                    user_id = %user_id,
                    error = %e,
                    "Personalized lookup failed, falling back to queue"
                ),
            }
        }

        self.get_fact(ctx).await
    }

    async fn personalized(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
    ) -> ServiceResult<Option<Fact>> {
        let ranking = match self.affinity.top_categories(user_id, self.config.top_n).await {
            Ok(ranking) => ranking,
            Err(e) if e.is_recoverable() => {
                debug!(
                    correlation_id = %ctx.correlation_id,
                    user_id = %user_id,
                    reason = %e,
                    "Not enough affinity data for personalization"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(top) = ranking.first() else {
            return Ok(None);
        };

        match self.cache.get_by_category(ctx, &top.category, 1).await {
            Ok(facts) => Ok(facts.into_iter().next()),
            Err(e) if e.is_recoverable() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// +1 affinity for the category, then a best-effort propagation enqueue.
    /// A full propagation queue never fails the like.
    pub async fn like_category(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        category: &str,
    ) -> ServiceResult<()> {
        let category = Category::parse(category)?;
        self.affinity.adjust(user_id, &category, 1).await?;
        metrics::record_like("like");

        let accepted = self
            .propagation
            .try_enqueue(PropagationTask::root(user_id, category.clone()));

        debug!(
            correlation_id = %ctx.correlation_id,
            user_id = %user_id,
            category = %category,
            propagation_enqueued = accepted,
            "Category liked"
        );
        Ok(())
    }

    pub async fn unlike_category(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        category: &str,
    ) -> ServiceResult<()> {
        let category = Category::parse(category)?;
        self.affinity.adjust(user_id, &category, -1).await?;
        metrics::record_like("unlike");

        debug!(
            correlation_id = %ctx.correlation_id,
            user_id = %user_id,
            category = %category,
            "Category unliked"
        );
        Ok(())
    }

    /// Facts currently waiting in the delivery queue
    pub async fn ready_count(&self) -> ServiceResult<u64> {
        self.cache.count_ready().await
    }

    /// Probe every dependency, each bounded by [`READINESS_TIMEOUT`].
    pub async fn readiness(&self) -> ReadinessReport {
        let (cache, content, database) = tokio::join!(
            probe(self.cache.ping()),
            probe(async { Ok(self.content.ping().await?) }),
            probe(self.affinity.ping()),
        );

        let mut checks = BTreeMap::new();
        checks.insert("cache", cache);
        checks.insert("content", content);
        checks.insert("database", database);

        let healthy = checks.values().all(|c| c.status == "ok");
        ReadinessReport {
            status: if healthy { "ok" } else { "unhealthy" },
            checks,
        }
    }
}

async fn probe<F>(check: F) -> DependencyStatus
where
    F: Future<Output = ServiceResult<()>>,
{
    let started = Instant::now();
    let result = match tokio::time::timeout(READINESS_TIMEOUT, check).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(format!(
            "no answer within {:?}",
            READINESS_TIMEOUT
        ))),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(()) => DependencyStatus {
            status: "ok",
            latency_ms,
            error: None,
        },
        Err(e) => DependencyStatus {
            status: "failed",
            latency_ms,
            error: Some(e.to_string()),
        },
    }
}
