//! Story key-value layer
//!
//! Store primitives the fact cache is built from:
//! - Versioned key schema
//! - String values with expiry
//! - Lists (delivery queue) and sets (category indices)
//! - Per-operation timeouts on the Redis backend
//! - Metrics integration
//!
//! Two backends implement [`KeyValueStore`]: [`RedisStore`] over a
//! multiplexed connection manager, and [`MemoryStore`] for tests and
//! single-process runs.

mod error;
mod keys;
mod memory;
mod metrics;
mod redis_store;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use memory::MemoryStore;
pub use metrics::CacheMetrics;
pub use redis_store::RedisStore;

use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a store backend
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Default TTL values
pub mod ttl {
    use std::time::Duration;

    /// Fact bodies live for five hours
    pub const FACT: Duration = Duration::from_secs(5 * 60 * 60);
}

/// Primitive operations over a key-value store with expiry, lists and sets.
///
/// Every call is atomic for the key it touches. Nothing here locks across
/// keys; callers that touch several keys get eventual consistency.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set a string value with an expiry
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Get a string value, `None` when missing or expired
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Delete a key of any type
    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Batched existence check, one flag per key in input order
    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>>;

    /// Push to the head of a list, returning the new length
    async fn lpush(&self, key: &str, value: &str) -> CacheResult<u64>;

    /// Atomically remove and return the tail of a list
    async fn rpop(&self, key: &str) -> CacheResult<Option<String>>;

    async fn llen(&self, key: &str) -> CacheResult<u64>;

    /// Inclusive range with Redis index semantics (negative counts from the tail)
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>>;

    /// Remove every occurrence of `value`, returning how many were removed
    async fn lrem(&self, key: &str, value: &str) -> CacheResult<u64>;

    /// Add a member, returning true when it was not present
    async fn sadd(&self, key: &str, member: &str) -> CacheResult<bool>;

    async fn srem(&self, key: &str, members: &[String]) -> CacheResult<u64>;

    /// Up to `count` distinct random members
    async fn srandmember(&self, key: &str, count: usize) -> CacheResult<Vec<String>>;

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>>;

    async fn scard(&self, key: &str) -> CacheResult<u64>;

    async fn ping(&self) -> CacheResult<()>;
}
