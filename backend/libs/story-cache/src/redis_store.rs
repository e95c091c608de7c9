//! Redis backend
//!
//! Uses a cloned `ConnectionManager` per call; the manager multiplexes, so
//! nothing here may block the connection (no BRPOP). Every command is
//! bounded by the configured operation timeout.

use crate::{CacheError, CacheMetrics, CacheResult, KeyValueStore};
use redis::aio::ConnectionManager;
use redis::{FromRedisValue, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound for a single Redis command
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
    metrics: CacheMetrics,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_timeout(conn, DEFAULT_OP_TIMEOUT)
    }

    pub fn with_timeout(conn: ConnectionManager, op_timeout: Duration) -> Self {
        Self {
            conn,
            op_timeout,
            metrics: CacheMetrics::new(),
        }
    }

    /// Open a client and connection manager for `url`
    pub async fn connect(url: &str, op_timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_timeout(conn, op_timeout))
    }

    async fn guarded<T, F>(&self, key: &str, op: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Redis command failed");
                self.metrics.record_error(key, "redis");
                Err(CacheError::Redis(e))
            }
            Err(_) => {
                warn!(
                    key = %key,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                self.metrics.record_error(key, "timeout");
                Err(CacheError::Timeout(self.op_timeout))
            }
        }
    }

    async fn query<T: FromRedisValue>(&self, key: &str, cmd: redis::Cmd) -> CacheResult<T> {
        let mut conn = self.conn.clone();
        self.guarded(key, async move { cmd.query_async::<_, T>(&mut conn).await })
            .await
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let millis = ttl.as_millis().max(1) as u64;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(millis);
        self.query::<()>(key, cmd).await?;

        debug!(key = %key, ttl_ms = millis, "Cache set");
        self.metrics.record_write(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let value: Option<String> = self.query(key, cmd).await?;

        match value {
            Some(_) => self.metrics.record_hit(key),
            None => self.metrics.record_miss(key),
        }
        Ok(value)
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.query::<()>(key, cmd).await
    }

    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("EXISTS").arg(key);
        }

        let mut conn = self.conn.clone();
        self.guarded(&keys[0], async move {
            pipe.query_async::<_, Vec<bool>>(&mut conn).await
        })
        .await
    }

    async fn lpush(&self, key: &str, value: &str) -> CacheResult<u64> {
        let mut cmd = redis::cmd("LPUSH");
        cmd.arg(key).arg(value);
        let len: u64 = self.query(key, cmd).await?;
        self.metrics.record_write(key);
        Ok(len)
    }

    async fn rpop(&self, key: &str) -> CacheResult<Option<String>> {
        let mut cmd = redis::cmd("RPOP");
        cmd.arg(key);
        let value: Option<String> = self.query(key, cmd).await?;

        match value {
            Some(_) => self.metrics.record_hit(key),
            None => self.metrics.record_miss(key),
        }
        Ok(value)
    }

    async fn llen(&self, key: &str) -> CacheResult<u64> {
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(key);
        self.query(key, cmd).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
        let mut cmd = redis::cmd("LRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.query(key, cmd).await
    }

    async fn lrem(&self, key: &str, value: &str) -> CacheResult<u64> {
        let mut cmd = redis::cmd("LREM");
        cmd.arg(key).arg(0).arg(value);
        let removed: u64 = self.query(key, cmd).await?;
        self.metrics.record_eviction(key, removed);
        Ok(removed)
    }

    async fn sadd(&self, key: &str, member: &str) -> CacheResult<bool> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        let added: u64 = self.query(key, cmd).await?;
        self.metrics.record_write(key);
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut cmd = redis::cmd("SREM");
        cmd.arg(key);
        for member in members {
            cmd.arg(member);
        }
        let removed: u64 = self.query(key, cmd).await?;
        self.metrics.record_eviction(key, removed);
        Ok(removed)
    }

    async fn srandmember(&self, key: &str, count: usize) -> CacheResult<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        // Positive count: distinct members
        let mut cmd = redis::cmd("SRANDMEMBER");
        cmd.arg(key).arg(count);
        self.query(key, cmd).await
    }

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query(key, cmd).await
    }

    async fn scard(&self, key: &str) -> CacheResult<u64> {
        let mut cmd = redis::cmd("SCARD");
        cmd.arg(key);
        self.query(key, cmd).await
    }

    async fn ping(&self) -> CacheResult<()> {
        let cmd = redis::cmd("PING");
        let _: String = self.query("ping", cmd).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        RedisStore::connect(&url, Duration::from_secs(1))
            .await
            .expect("redis available")
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance
    async fn test_list_is_fifo_with_lpush_rpop() {
        let store = connect().await;
        let key = format!("v1:test:{}", rand::random::<u64>());

        store.lpush(&key, "a").await.unwrap();
        store.lpush(&key, "b").await.unwrap();

        assert_eq!(store.llen(&key).await.unwrap(), 2);
        assert_eq!(store.rpop(&key).await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.rpop(&key).await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.rpop(&key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance
    async fn test_set_ex_expires() {
        let store = connect().await;
        let key = format!("v1:test:{}", rand::random::<u64>());

        store
            .set_ex(&key, "value", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("value"));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(store.exists_many(&[key]).await.unwrap(), vec![false]);
    }
}
