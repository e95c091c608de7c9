//! Category affinity propagation
//!
//! A like enqueues a depth-0 task. Workers expand each task into the
//! category's subcategories, bulk-adjust the user's counters for them and
//! enqueue one child task per subcategory at `depth + 1`, until `max_depth`.
//!
//! The queue is bounded and lossy: enqueueing never blocks and a full queue
//! drops the task with a warning. Nothing is persisted; tasks still queued at
//! shutdown are discarded.

use crate::category::CategoryProvider;
use crate::content::SharedContentSource;
use crate::db::SharedAffinityStore;
use crate::metrics::propagation as metrics;
use crate::models::{Category, PropagationTask};
use crate::shutdown::ShutdownSignal;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Configuration for the propagation worker pool
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    pub enabled: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Tasks at this depth are discarded without expansion
    pub max_depth: u32,
    pub subcategory_limit: usize,
    pub base_weight: i64,
    pub decay_factor: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 10,
            queue_capacity: 1024,
            max_depth: 1,
            subcategory_limit: 10,
            base_weight: 1,
            decay_factor: 0.5,
        }
    }
}

impl PropagationConfig {
    /// Increment applied to subcategories found by a task at `depth`:
    /// `max(1, floor(base_weight * decay_factor^depth))`
    pub fn weight(&self, depth: u32) -> i64 {
        let decayed = self.base_weight as f64 * self.decay_factor.powi(depth as i32);
        (decayed.floor() as i64).max(1)
    }
}

/// What a worker did with one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    DepthLimit,
    /// No subcategories; nothing to adjust
    Leaf,
    Expanded { adjusted: usize, enqueued: usize },
    FetchFailed,
    AdjustFailed,
}

impl HandleOutcome {
    fn label(&self) -> &'static str {
        match self {
            HandleOutcome::DepthLimit => "depth_limit",
            HandleOutcome::Leaf => "leaf",
            HandleOutcome::Expanded { .. } => "expanded",
            HandleOutcome::FetchFailed => "fetch_error",
            HandleOutcome::AdjustFailed => "adjust_error",
        }
    }
}

/// Sending half of the work queue; cheap to clone.
#[derive(Clone)]
pub struct PropagationQueue {
    tx: mpsc::Sender<PropagationTask>,
    enabled: bool,
}

impl PropagationQueue {
    /// Non-blocking enqueue. Returns false when the task was dropped.
    pub fn try_enqueue(&self, task: PropagationTask) -> bool {
        if !self.enabled {
            debug!(category = %task.category, "Propagation disabled, task ignored");
            return false;
        }

        match self.tx.try_send(task) {
            Ok(()) => {
                metrics::record_task("enqueued");
                metrics::set_queue_depth(self.len());
                true
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(
                    user_id = %task.user_id,
                    category = %task.category,
                    depth = task.depth,
                    "Propagation queue full, dropping task"
                );
                metrics::record_task("dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(
                    category = %task.category,
                    "Propagation queue closed, dropping task"
                );
                metrics::record_task("dropped");
                false
            }
        }
    }

    /// Tasks currently waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct EngineInner {
    config: PropagationConfig,
    affinity: SharedAffinityStore,
    content: SharedContentSource,
    /// Discovered subcategories are offered here for prefetching
    discovered: Arc<CategoryProvider>,
    queue: PropagationQueue,
    rx: Mutex<mpsc::Receiver<PropagationTask>>,
}

#[derive(Clone)]
pub struct PropagationEngine {
    inner: Arc<EngineInner>,
}

impl PropagationEngine {
    pub fn new(
        config: PropagationConfig,
        affinity: SharedAffinityStore,
        content: SharedContentSource,
        discovered: Arc<CategoryProvider>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let queue = PropagationQueue {
            tx,
            enabled: config.enabled,
        };

        Self {
            inner: Arc::new(EngineInner {
                config,
                affinity,
                content,
                discovered,
                queue,
                rx: Mutex::new(rx),
            }),
        }
    }

    pub fn queue(&self) -> PropagationQueue {
        self.inner.queue.clone()
    }

    /// Run the worker pool until `shutdown` fires. In-flight tasks finish;
    /// queued ones are left behind.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let config = &self.inner.config;
        if !config.enabled {
            info!("Propagation engine disabled by configuration");
            return;
        }

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            max_depth = config.max_depth,
            "Starting propagation engine"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..config.workers.max(1) {
            let engine = self.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { engine.worker_loop(worker_id, shutdown).await });
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Propagation worker panicked");
            }
        }

        info!(
            discarded = self.inner.queue.len(),
            "Propagation engine stopped"
        );
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: ShutdownSignal) {
        debug!(worker_id, "Propagation worker started");

        loop {
            let task = {
                let mut rx = self.inner.rx.lock().await;
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => None,
                    task = rx.recv() => task,
                }
            };

            let Some(task) = task else {
                break;
            };

            metrics::set_queue_depth(self.inner.queue.len());
            let outcome = self.handle(task).await;
            metrics::record_task(outcome.label());
        }

        debug!(worker_id, "Propagation worker stopped");
    }

    /// Process one task. Failures are logged and end this task's subtree.
    pub async fn handle(&self, task: PropagationTask) -> HandleOutcome {
        let config = &self.inner.config;

        if task.depth >= config.max_depth {
            debug!(
                user_id = %task.user_id,
                category = %task.category,
                depth = task.depth,
                "Depth limit reached, discarding task"
            );
            return HandleOutcome::DepthLimit;
        }

        let raw = match self
            .inner
            .content
            .fetch_subcategories(task.category.as_str(), config.subcategory_limit)
            .await
        {
            Ok(subs) => subs,
            Err(e) => {
                warn!(
                    user_id = %task.user_id,
                    category = %task.category,
                    depth = task.depth,
                    error = %e,
                    "Subcategory lookup failed, discarding subtree"
                );
                return HandleOutcome::FetchFailed;
            }
        };

        let subcategories: Vec<Category> = raw
            .into_iter()
            .filter_map(|name| Category::parse(name).ok())
            .filter(|c| *c != task.category)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if subcategories.is_empty() {
            return HandleOutcome::Leaf;
        }

        let weight = config.weight(task.depth);
        if let Err(e) = self
            .inner
            .affinity
            .bulk_adjust(task.user_id, &subcategories, weight)
            .await
        {
            warn!(
                user_id = %task.user_id,
                category = %task.category,
                error = %e,
                "Bulk affinity adjust failed, discarding subtree"
            );
            return HandleOutcome::AdjustFailed;
        }

        let adjusted = subcategories.len();
        let mut enqueued = 0;
        for sub in subcategories {
            if let Err(e) = self.inner.discovered.register(sub.as_str()) {
                debug!(category = %sub, error = %e, "Discovered category not registered");
            }
            if self.inner.queue.try_enqueue(task.child(sub)) {
                enqueued += 1;
            }
        }

        debug!(
            user_id = %task.user_id,
            category = %task.category,
            depth = task.depth,
            adjusted,
            weight,
            "Propagated affinity to subcategories"
        );

        HandleOutcome::Expanded { adjusted, enqueued }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ArticleSummary, ContentError, ContentResult, ContentSource};
    use crate::db::{AffinityStore, CategoryAffinity};
    use crate::error::{ServiceError, ServiceResult};
    use crate::shutdown;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingAffinity {
        bulk_calls: SyncMutex<Vec<(Uuid, Vec<String>, i64)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl AffinityStore for RecordingAffinity {
        async fn adjust(&self, _: Uuid, _: &Category, _: i64) -> ServiceResult<()> {
            Ok(())
        }

        async fn bulk_adjust(
            &self,
            user_id: Uuid,
            categories: &[Category],
            delta: i64,
        ) -> ServiceResult<()> {
            if self.fail {
                return Err(ServiceError::Internal("db down".into()));
            }
            let names = categories.iter().map(|c| c.as_str().to_string()).collect();
            self.bulk_calls.lock().push((user_id, names, delta));
            Ok(())
        }

        async fn top_categories(&self, _: Uuid, _: usize) -> ServiceResult<Vec<CategoryAffinity>> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> ServiceResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct TreeContent {
        edges: HashMap<String, Vec<String>>,
        lookups: SyncMutex<Vec<String>>,
        fail: bool,
    }

    impl TreeContent {
        fn with_edge(mut self, parent: &str, children: &[&str]) -> Self {
            self.edges.insert(
                parent.to_string(),
                children.iter().map(|c| c.to_string()).collect(),
            );
            self
        }
    }

    #[async_trait::async_trait]
    impl ContentSource for TreeContent {
        async fn fetch_summaries(&self, _: &str, _: usize) -> ContentResult<Vec<ArticleSummary>> {
            Ok(Vec::new())
        }

        async fn fetch_subcategories(&self, category: &str, limit: usize) -> ContentResult<Vec<String>> {
            self.lookups.lock().push(category.to_string());
            if self.fail {
                return Err(ContentError::Unavailable("wiki down".into()));
            }
            Ok(self
                .edges
                .get(category)
                .map(|c| c.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        }

        async fn ping(&self) -> ContentResult<()> {
            Ok(())
        }
    }

    fn engine(
        config: PropagationConfig,
        affinity: Arc<RecordingAffinity>,
        content: Arc<TreeContent>,
    ) -> (PropagationEngine, Arc<CategoryProvider>) {
        let discovered = Arc::new(CategoryProvider::stack(Vec::<String>::new()));
        let engine = PropagationEngine::new(config, affinity, content, discovered.clone());
        (engine, discovered)
    }

    fn root_task(user: Uuid, name: &str) -> PropagationTask {
        PropagationTask::root(user, Category::parse(name).unwrap())
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_weight_decays_with_floor_of_one() {
        let config = PropagationConfig {
            base_weight: 8,
            decay_factor: 0.5,
            ..Default::default()
        };
        assert_eq!(config.weight(0), 8);
        assert_eq!(config.weight(1), 4);
        assert_eq!(config.weight(3), 1);
        assert_eq!(config.weight(10), 1);
        assert_eq!(PropagationConfig::default().weight(0), 1);
    }

    #[tokio::test]
    async fn test_like_root_adjusts_children_once_without_grandchildren() {
        let affinity = Arc::new(RecordingAffinity::default());
        let content = Arc::new(
            TreeContent::default()
                .with_edge("Root", &["Sub1", "Sub2"])
                .with_edge("Sub1", &["Grand"]),
        );
        let (engine, discovered) = engine(
            PropagationConfig {
                max_depth: 1,
                workers: 3,
                ..Default::default()
            },
            affinity.clone(),
            content.clone(),
        );
        let (trigger, signal) = shutdown::channel();
        let runner = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(signal).await })
        };

        let user = Uuid::new_v4();
        assert!(engine.queue().try_enqueue(root_task(user, "Root")));

        wait_until(|| engine.queue().is_empty() && !affinity.bulk_calls.lock().is_empty()).await;
        // Let the depth-1 children drain through the workers
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        runner.await.unwrap();

        let calls = affinity.bulk_calls.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, user);
        assert_eq!(calls[0].1, vec!["Sub1".to_string(), "Sub2".to_string()]);
        assert_eq!(calls[0].2, 1);
        assert_eq!(content.lookups.lock().clone(), vec!["Root".to_string()]);
        assert_eq!(discovered.len(), 2);
    }

    #[tokio::test]
    async fn test_handle_discards_at_depth_limit() {
        let affinity = Arc::new(RecordingAffinity::default());
        let content = Arc::new(TreeContent::default().with_edge("Sub1", &["Grand"]));
        let (engine, _) = engine(PropagationConfig::default(), affinity.clone(), content.clone());

        let task = root_task(Uuid::new_v4(), "Root").child(Category::parse("Sub1").unwrap());
        assert_eq!(engine.handle(task).await, HandleOutcome::DepthLimit);
        assert!(content.lookups.lock().is_empty());
        assert!(affinity.bulk_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_handle_enqueues_children_after_adjust() {
        let affinity = Arc::new(RecordingAffinity::default());
        let content = Arc::new(TreeContent::default().with_edge("Root", &["A", "B", "A"]));
        let (engine, _) = engine(
            PropagationConfig {
                max_depth: 2,
                ..Default::default()
            },
            affinity.clone(),
            content,
        );

        let outcome = engine.handle(root_task(Uuid::new_v4(), "Root")).await;
        assert_eq!(
            outcome,
            HandleOutcome::Expanded {
                adjusted: 2,
                enqueued: 2
            }
        );
        assert_eq!(engine.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_discards_subtree() {
        let affinity = Arc::new(RecordingAffinity::default());
        let content = Arc::new(TreeContent {
            fail: true,
            ..Default::default()
        });
        let (engine, discovered) = engine(PropagationConfig::default(), affinity.clone(), content);

        let outcome = engine.handle(root_task(Uuid::new_v4(), "Root")).await;
        assert_eq!(outcome, HandleOutcome::FetchFailed);
        assert!(affinity.bulk_calls.lock().is_empty());
        assert!(engine.queue().is_empty());
        assert!(discovered.is_empty());
    }

    #[tokio::test]
    async fn test_adjust_failure_enqueues_nothing() {
        let affinity = Arc::new(RecordingAffinity {
            fail: true,
            ..Default::default()
        });
        let content = Arc::new(TreeContent::default().with_edge("Root", &["Sub1"]));
        let (engine, _) = engine(
            PropagationConfig {
                max_depth: 3,
                ..Default::default()
            },
            affinity,
            content,
        );

        let outcome = engine.handle(root_task(Uuid::new_v4(), "Root")).await;
        assert_eq!(outcome, HandleOutcome::AdjustFailed);
        assert!(engine.queue().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_excess_without_error() {
        const CAPACITY: usize = 8;
        let (engine, _) = engine(
            PropagationConfig {
                queue_capacity: CAPACITY,
                ..Default::default()
            },
            Arc::new(RecordingAffinity::default()),
            Arc::new(TreeContent::default()),
        );

        let user = Uuid::new_v4();
        let mut handles = Vec::new();
        for i in 0..=CAPACITY {
            let queue = engine.queue();
            handles.push(tokio::spawn(async move {
                queue.try_enqueue(root_task(user, &format!("C{}", i)))
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, CAPACITY);
        assert_eq!(engine.queue().len(), CAPACITY);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let (engine, _) = engine(
            PropagationConfig::default(),
            Arc::new(RecordingAffinity::default()),
            Arc::new(TreeContent::default()),
        );
        let (trigger, signal) = shutdown::channel();
        let runner = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(signal).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("engine did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_queue_rejects_quietly() {
        let (engine, _) = engine(
            PropagationConfig {
                enabled: false,
                ..Default::default()
            },
            Arc::new(RecordingAffinity::default()),
            Arc::new(TreeContent::default()),
        );
        assert!(!engine.queue().try_enqueue(root_task(Uuid::new_v4(), "Root")));
    }
}
