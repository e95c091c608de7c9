//! Fact cache and delivery queue
//!
//! Layout in the key-value store:
//! - v1:fact:{id} → serialized [`Fact`], expires after `fact_ttl`
//! - v1:queue:ready → list of ready ids (LPUSH on save, RPOP on pop: FIFO)
//! - v1:category:{name} → set of ids tagged with the category
//! - v1:categories:registry → set of category names with an index
//!
//! Only the fact body carries a TTL. Queue and category entries that outlive
//! their body are pruned on read and by [`FactCache::clean_dead_entries`].

use crate::category::{CategoryError, CategoryProvider};
use crate::context::RequestContext;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::cache as cache_metrics;
use crate::models::Fact;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use story_cache::{ttl, CacheError, CacheKey, SharedStore};
use tracing::{debug, info, warn};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a stored fact body
    pub fact_ttl: Duration,
    /// Resampling rounds before a category is declared exhausted
    pub sample_rounds: usize,
    /// Ids inspected per LRANGE page during a sweep
    pub sweep_page_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fact_ttl: ttl::FACT,
            sample_rounds: 3,
            sweep_page_size: 200,
        }
    }
}

/// Outcome of one dead-entry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub queue_scanned: usize,
    pub queue_removed: u64,
    pub category_entries_removed: u64,
    pub categories_dropped: usize,
}

#[derive(Clone)]
pub struct FactCache {
    store: SharedStore,
    /// Catalogue that exhausted categories are handed back to
    fallback: Arc<CategoryProvider>,
    config: CacheConfig,
}

impl FactCache {
    pub fn new(store: SharedStore, fallback: Arc<CategoryProvider>, config: CacheConfig) -> Self {
        Self {
            store,
            fallback,
            config,
        }
    }

    /// Store a fact and index it.
    ///
    /// The body is written first so an index entry never points at a body
    /// that was never written. A failed index write is reported as
    /// [`ServiceError::PartialWrite`]; the body is left to expire.
    pub async fn save(&self, ctx: &RequestContext, fact: &Fact) -> ServiceResult<()> {
        let body = serde_json::to_string(fact).map_err(CacheError::Serialization)?;

        self.store
            .set_ex(&CacheKey::fact(&fact.id), &body, self.config.fact_ttl)
            .await?;

        let partial = |stage: &'static str| {
            let fact_id = fact.id.clone();
            move |source: CacheError| ServiceError::PartialWrite {
                fact_id,
                stage,
                source,
            }
        };

        self.store
            .lpush(&CacheKey::ready_queue(), &fact.id)
            .await
            .map_err(partial("delivery index"))?;

        if !fact.category.is_empty() {
            self.store
                .sadd(&CacheKey::category(&fact.category), &fact.id)
                .await
                .map_err(partial("category index"))?;
            self.store
                .sadd(&CacheKey::category_registry(), &fact.category)
                .await
                .map_err(partial("category registry"))?;
        }

        debug!(
            correlation_id = %ctx.correlation_id,
            fact_id = %fact.id,
            category = %fact.category,
            "Fact saved"
        );
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> ServiceResult<Fact> {
        self.load(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("fact {}", id)))
    }

    /// Remove the oldest ready id and resolve it.
    ///
    /// Ids whose body has expired are dropped and the next one is tried.
    /// Returns [`ServiceError::EmptyQueue`] once the queue runs dry.
    pub async fn pop_next(&self, ctx: &RequestContext) -> ServiceResult<Fact> {
        let queue = CacheKey::ready_queue();

        loop {
            let Some(id) = self.store.rpop(&queue).await? else {
                return Err(ServiceError::EmptyQueue);
            };

            match self.load(&id).await? {
                Some(fact) => return Ok(fact),
                None => {
                    debug!(
                        correlation_id = %ctx.correlation_id,
                        fact_id = %id,
                        "Skipping dangling queue entry"
                    );
                    cache_metrics::record_dangling("queue", 1);
                }
            }
        }
    }

    /// Sample up to `count` live facts tagged with `category`.
    ///
    /// Dead members are pruned as they are found. Random sampling runs for
    /// a bounded number of rounds; if it comes up short, the remaining
    /// members are checked in one pass so a live fact hidden behind many
    /// dead ids is still found. Only when nothing live remains is the
    /// category handed to the fallback provider and
    /// [`ServiceError::Exhausted`] returned.
    pub async fn get_by_category(
        &self,
        ctx: &RequestContext,
        category: &str,
        count: usize,
    ) -> ServiceResult<Vec<Fact>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let key = CacheKey::category(category);
        let mut seen = HashSet::new();
        let mut found = Vec::with_capacity(count);

        for _ in 0..self.config.sample_rounds.max(1) {
            let needed = count - found.len();
            if needed == 0 {
                break;
            }

            let fresh: Vec<String> = self
                .store
                .srandmember(&key, needed)
                .await?
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect();
            if fresh.is_empty() {
                break;
            }

            let mut dead = Vec::new();
            for id in fresh {
                match self.load(&id).await? {
                    Some(fact) => found.push(fact),
                    None => dead.push(id),
                }
            }
            self.prune_category(ctx, &key, category, dead).await;
        }

        if found.len() < count {
            let rest: Vec<String> = self
                .store
                .smembers(&key)
                .await?
                .into_iter()
                .filter(|id| !seen.contains(id))
                .collect();

            let mut dead = self.dead_ids(rest.clone()).await?;
            let known_dead: HashSet<&String> = dead.iter().collect();
            let live: Vec<String> = rest
                .into_iter()
                .filter(|id| !known_dead.contains(id))
                .collect();
            for id in live {
                if found.len() == count {
                    break;
                }
                match self.load(&id).await? {
                    Some(fact) => found.push(fact),
                    None => dead.push(id),
                }
            }
            self.prune_category(ctx, &key, category, dead).await;
        }

        if found.is_empty() {
            self.register_exhausted(ctx, category);
            return Err(ServiceError::Exhausted(category.to_string()));
        }

        Ok(found)
    }

    /// Current delivery-queue length
    pub async fn count_ready(&self) -> ServiceResult<u64> {
        Ok(self.store.llen(&CacheKey::ready_queue()).await?)
    }

    /// Remove queue and category entries whose fact body has expired.
    ///
    /// Best-effort: runs alongside saves and pops without locking, so an
    /// entry written mid-sweep may be picked up by the next run instead.
    pub async fn clean_dead_entries(&self, ctx: &RequestContext) -> ServiceResult<SweepReport> {
        let mut report = SweepReport::default();
        let queue = CacheKey::ready_queue();
        let page = self.config.sweep_page_size.max(1) as i64;

        let mut dead_in_queue = HashSet::new();
        let mut offset = 0i64;
        loop {
            let ids = self.store.lrange(&queue, offset, offset + page - 1).await?;
            if ids.is_empty() {
                break;
            }
            report.queue_scanned += ids.len();
            offset += ids.len() as i64;

            dead_in_queue.extend(self.dead_ids(ids).await?);
        }

        for id in &dead_in_queue {
            report.queue_removed += self.store.lrem(&queue, id).await?;
        }

        let registry = CacheKey::category_registry();
        for category in self.store.smembers(&registry).await? {
            let key = CacheKey::category(&category);
            let members = self.store.smembers(&key).await?;
            let dead = self.dead_ids(members).await?;
            if !dead.is_empty() {
                report.category_entries_removed += self.store.srem(&key, &dead).await?;
            }

            if self.store.scard(&key).await? == 0 {
                self.store.srem(&registry, &[category.clone()]).await?;
                // A save may land between the check and the removal
                if self.store.scard(&key).await? > 0 {
                    self.store.sadd(&registry, &category).await?;
                } else {
                    report.categories_dropped += 1;
                }
            }
        }

        debug!(
            correlation_id = %ctx.correlation_id,
            queue_scanned = report.queue_scanned,
            queue_removed = report.queue_removed,
            category_entries_removed = report.category_entries_removed,
            categories_dropped = report.categories_dropped,
            "Dead entry sweep finished"
        );
        Ok(report)
    }

    pub async fn ping(&self) -> ServiceResult<()> {
        Ok(self.store.ping().await?)
    }

    async fn load(&self, id: &str) -> ServiceResult<Option<Fact>> {
        let key = CacheKey::fact(id);
        let Some(body) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Fact>(&body) {
            Ok(fact) => Ok(Some(fact)),
            Err(e) => {
                warn!(fact_id = %id, error = %e, "Dropping undecodable fact body");
                self.store.del(&key).await?;
                Ok(None)
            }
        }
    }

    async fn dead_ids(&self, ids: Vec<String>) -> ServiceResult<Vec<String>> {
        if ids.is_empty() {
            return Ok(ids);
        }

        let keys: Vec<String> = ids.iter().map(|id| CacheKey::fact(id)).collect();
        let alive = self.store.exists_many(&keys).await?;

        Ok(ids
            .into_iter()
            .zip(alive)
            .filter_map(|(id, alive)| (!alive).then_some(id))
            .collect())
    }

    /// Best-effort removal of dead ids from a category set
    async fn prune_category(
        &self,
        ctx: &RequestContext,
        key: &str,
        category: &str,
        dead: Vec<String>,
    ) {
        if dead.is_empty() {
            return;
        }

        cache_metrics::record_dangling("category", dead.len() as u64);
        if let Err(e) = self.store.srem(key, &dead).await {
            warn!(
                correlation_id = %ctx.correlation_id,
                category = %category,
                error = %e,
                "Failed to prune dead category entries"
            );
        }
    }

    fn register_exhausted(&self, ctx: &RequestContext, category: &str) {
        match self.fallback.register(category) {
            Ok(()) => info!(
                correlation_id = %ctx.correlation_id,
                category = %category,
                provider = self.fallback.name(),
                "Category exhausted, registered for prefetch"
            ),
            Err(CategoryError::Unsupported { provider, .. }) => debug!(
                correlation_id = %ctx.correlation_id,
                category = %category,
                provider,
                "Category exhausted; fallback provider is fixed"
            ),
            Err(e) => warn!(
                correlation_id = %ctx.correlation_id,
                category = %category,
                error = %e,
                "Failed to register exhausted category"
            ),
        }
    }
}
