use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fact_service::category::CategoryProvider;
use fact_service::config::{Config, LogFormat, StorageMode};
use fact_service::content::{FixtureContentSource, RetryingSource, SharedContentSource};
use fact_service::db::{InMemoryAffinityStore, PgAffinityStore, SharedAffinityStore};
use fact_service::jobs::{start_cache_cleaner, Prefetcher};
use fact_service::services::{FactService, PropagationEngine};
use fact_service::{shutdown, FactCache};
use story_cache::{CacheMetrics, MemoryStore, RedisStore, SharedStore};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.app.log_level));

    match config.app.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn connect_storage(config: &Config) -> Result<(SharedStore, SharedAffinityStore)> {
    match config.app.storage {
        StorageMode::Memory => {
            warn!("⚠️  Using in-memory storage; facts and likes are lost on restart");
            Ok((
                Arc::new(MemoryStore::new()),
                Arc::new(InMemoryAffinityStore::new()),
            ))
        }
        StorageMode::External => {
            let pg_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            sqlx::migrate!("./migrations")
                .run(&pg_pool)
                .await
                .context("Failed to run database migrations")?;
            info!("✅ Database pool created and migrations applied");

            let redis = RedisStore::connect(&config.redis.url, config.redis.op_timeout)
                .await
                .context("Failed to connect to Redis")?;
            info!("✅ Redis connection manager initialized");

            Ok((Arc::new(redis), Arc::new(PgAffinityStore::new(pg_pool))))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("🔧 Starting fact-service");
    info!(
        "✅ Configuration loaded: env={}, storage={:?}",
        config.app.env, config.app.storage
    );

    if let Err(e) = CacheMetrics::register(prometheus::default_registry()) {
        warn!(error = %e, "Failed to register cache metrics");
    }

    let (store, affinity) = connect_storage(&config).await?;

    let fixture = FixtureContentSource::demo(config.content.language.clone());
    let seed_categories = if config.content.basic_categories.is_empty() {
        fixture.categories()
    } else {
        config.content.basic_categories.clone()
    };
    let content: SharedContentSource =
        Arc::new(RetryingSource::new(fixture, config.content.retry.clone()));

    let basic = Arc::new(CategoryProvider::random(seed_categories));
    let advanced = Arc::new(CategoryProvider::stack(Vec::<String>::new()));
    info!(
        basic_categories = basic.len(),
        "✅ Category providers initialized"
    );

    let cache = FactCache::new(store, basic.clone(), config.cache.clone());
    let engine = PropagationEngine::new(
        config.propagation.clone(),
        affinity.clone(),
        content.clone(),
        advanced.clone(),
    );
    let service = FactService::new(
        cache.clone(),
        affinity,
        content.clone(),
        engine.queue(),
        config.serving.clone(),
    );

    let readiness = service.readiness().await;
    if readiness.is_ready() {
        info!("✅ All dependencies ready");
    } else {
        for (name, check) in &readiness.checks {
            warn!(
                dependency = *name,
                status = check.status,
                error = check.error.as_deref().unwrap_or(""),
                "Dependency not ready"
            );
        }
    }

    let (trigger, signal) = shutdown::channel();
    let mut tasks = JoinSet::new();

    let prefetcher = Prefetcher::new(
        cache.clone(),
        content,
        basic,
        advanced,
        config.prefetch.clone(),
    );
    let prefetch_signal = signal.clone();
    tasks.spawn(async move { prefetcher.run(prefetch_signal).await });
    info!("✅ Prefetcher started");

    tasks.spawn(start_cache_cleaner(
        cache,
        config.cleaner.clone(),
        signal.clone(),
    ));
    info!("✅ Cache cleaner started");

    let engine_signal = signal.clone();
    tasks.spawn(async move { engine.run(engine_signal).await });
    info!("✅ Propagation engine started");

    info!("🚀 fact-service running");
    shutdown_signal().await;
    info!("🛑 Shutdown signal received, stopping background jobs");
    trigger.trigger();

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    match service.ready_count().await {
        Ok(ready) => info!(ready_facts = ready, "👋 fact-service stopped"),
        Err(e) => info!(error = %e, "👋 fact-service stopped"),
    }
    Ok(())
}
