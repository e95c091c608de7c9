/// Affinity Repository
///
/// Per-(user, category) like counters and the top-N ranking query
use crate::error::{ServiceError, ServiceResult};
use crate::models::Category;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// One ranked row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryAffinity {
    pub category: String,
    #[sqlx(rename = "cnt")]
    pub count: i64,
}

#[async_trait::async_trait]
pub trait AffinityStore: Send + Sync {
    /// `count += delta` for the pair, creating the row on first touch
    async fn adjust(&self, user_id: Uuid, category: &Category, delta: i64) -> ServiceResult<()>;

    /// Same as [`adjust`](Self::adjust) for a set of categories, applied atomically
    async fn bulk_adjust(
        &self,
        user_id: Uuid,
        categories: &[Category],
        delta: i64,
    ) -> ServiceResult<()>;

    /// The `limit` highest counts, descending.
    ///
    /// Fails with [`ServiceError::InsufficientData`] when fewer than `limit`
    /// categories are populated for the user.
    async fn top_categories(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> ServiceResult<Vec<CategoryAffinity>>;

    async fn ping(&self) -> ServiceResult<()>;
}

pub type SharedAffinityStore = Arc<dyn AffinityStore>;

fn unique_names(categories: &[Category]) -> Vec<String> {
    categories
        .iter()
        .map(|c| c.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn check_populated(
    rows: Vec<CategoryAffinity>,
    limit: usize,
) -> ServiceResult<Vec<CategoryAffinity>> {
    if rows.len() < limit {
        return Err(ServiceError::InsufficientData {
            populated: rows.len(),
            required: limit,
        });
    }
    Ok(rows)
}

/// Postgres-backed store over `user_category_likes`
#[derive(Clone)]
pub struct PgAffinityStore {
    pool: PgPool,
}

impl PgAffinityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AffinityStore for PgAffinityStore {
    async fn adjust(&self, user_id: Uuid, category: &Category, delta: i64) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_category_likes (user_id, category, cnt)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, category)
            DO UPDATE SET cnt = user_category_likes.cnt + EXCLUDED.cnt, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(category.as_str())
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, category = %category, "Failed to adjust affinity: {}", e);
            ServiceError::Database(e)
        })?;

        Ok(())
    }

    async fn bulk_adjust(
        &self,
        user_id: Uuid,
        categories: &[Category],
        delta: i64,
    ) -> ServiceResult<()> {
        // ON CONFLICT cannot touch the same row twice in one statement
        let names = unique_names(categories);
        if names.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO user_category_likes (user_id, category, cnt)
            SELECT $1, c, $3 FROM UNNEST($2::text[]) AS t(c)
            ON CONFLICT (user_id, category)
            DO UPDATE SET cnt = user_category_likes.cnt + EXCLUDED.cnt, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(&names)
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, categories = names.len(), "Failed to bulk adjust affinity: {}", e);
            ServiceError::Database(e)
        })?;

        Ok(())
    }

    async fn top_categories(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> ServiceResult<Vec<CategoryAffinity>> {
        let rows = sqlx::query_as::<_, CategoryAffinity>(
            r#"
            SELECT category, cnt
            FROM user_category_likes
            WHERE user_id = $1
            ORDER BY cnt DESC, category ASC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, "Failed to load top categories: {}", e);
            ServiceError::Database(e)
        })?;

        check_populated(rows, limit)
    }

    async fn ping(&self) -> ServiceResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local store with the same ranking semantics
#[derive(Debug, Default)]
pub struct InMemoryAffinityStore {
    counts: Mutex<HashMap<(Uuid, String), i64>>,
}

impl InMemoryAffinityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, user_id: Uuid, category: &str) -> Option<i64> {
        self.counts
            .lock()
            .get(&(user_id, category.to_string()))
            .copied()
    }
}

#[async_trait::async_trait]
impl AffinityStore for InMemoryAffinityStore {
    async fn adjust(&self, user_id: Uuid, category: &Category, delta: i64) -> ServiceResult<()> {
        *self
            .counts
            .lock()
            .entry((user_id, category.as_str().to_string()))
            .or_insert(0) += delta;
        Ok(())
    }

    async fn bulk_adjust(
        &self,
        user_id: Uuid,
        categories: &[Category],
        delta: i64,
    ) -> ServiceResult<()> {
        let mut counts = self.counts.lock();
        for name in unique_names(categories) {
            *counts.entry((user_id, name)).or_insert(0) += delta;
        }
        Ok(())
    }

    async fn top_categories(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> ServiceResult<Vec<CategoryAffinity>> {
        let mut rows: Vec<CategoryAffinity> = self
            .counts
            .lock()
            .iter()
            .filter(|((user, _), _)| *user == user_id)
            .map(|((_, category), count)| CategoryAffinity {
                category: category.clone(),
                count: *count,
            })
            .collect();

        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        rows.truncate(limit);

        check_populated(rows, limit)
    }

    async fn ping(&self) -> ServiceResult<()> {
        Ok(())
    }
}
