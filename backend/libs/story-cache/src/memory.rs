//! In-process backend with lazy expiry
//!
//! All state sits behind one mutex, so each call is atomic the same way a
//! single Redis command is. The lock is never held across an await.

use crate::{CacheMetrics, CacheResult, KeyValueStore};
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    /// Value and deadline; `None` never expires
    values: HashMap<String, (String, Option<Instant>)>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn live_value(&mut self, key: &str) -> Option<&String> {
        let expired = matches!(self.values.get(key), Some((_, Some(deadline))) if *deadline <= Instant::now());
        if expired {
            self.values.remove(key);
        }
        self.values.get(key).map(|(value, _)| value)
    }

    fn contains(&mut self, key: &str) -> bool {
        self.live_value(key).is_some() || self.lists.contains_key(key) || self.sets.contains_key(key)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    metrics: CacheMetrics,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolve a Redis-style index (negative counts from the tail) against `len`
fn resolve_index(index: i64, len: usize) -> i64 {
    if index < 0 {
        len as i64 + index
    } else {
        index
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        // A TTL past what Instant can represent is treated as no expiry
        let deadline = Instant::now().checked_add(ttl);
        self.inner
            .lock()
            .values
            .insert(key.to_string(), (value.to_string(), deadline));
        self.metrics.record_write(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let value = self.inner.lock().live_value(key).cloned();
        match value {
            Some(_) => self.metrics.record_hit(key),
            None => self.metrics.record_miss(key),
        }
        Ok(value)
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        inner.values.remove(key);
        inner.lists.remove(key);
        inner.sets.remove(key);
        Ok(())
    }

    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
        let mut inner = self.inner.lock();
        Ok(keys.iter().map(|key| inner.contains(key)).collect())
    }

    async fn lpush(&self, key: &str, value: &str) -> CacheResult<u64> {
        let mut inner = self.inner.lock();
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        self.metrics.record_write(key);
        Ok(list.len() as u64)
    }

    async fn rpop(&self, key: &str) -> CacheResult<Option<String>> {
        let mut inner = self.inner.lock();
        let value = inner.lists.get_mut(key).and_then(|list| list.pop_back());
        if inner.lists.get(key).is_some_and(|list| list.is_empty()) {
            inner.lists.remove(key);
        }
        Ok(value)
    }

    async fn llen(&self, key: &str) -> CacheResult<u64> {
        Ok(self
            .inner
            .lock()
            .lists
            .get(key)
            .map_or(0, |list| list.len() as u64))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
        let inner = self.inner.lock();
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };

        let len = list.len();
        let start = resolve_index(start, len).max(0);
        let stop = resolve_index(stop, len).min(len as i64 - 1);
        if start > stop {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn lrem(&self, key: &str, value: &str) -> CacheResult<u64> {
        let mut inner = self.inner.lock();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(0);
        };

        let before = list.len();
        list.retain(|item| item != value);
        let removed = (before - list.len()) as u64;
        if list.is_empty() {
            inner.lists.remove(key);
        }

        self.metrics.record_eviction(key, removed);
        Ok(removed)
    }

    async fn sadd(&self, key: &str, member: &str) -> CacheResult<bool> {
        let added = self
            .inner
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        self.metrics.record_write(key);
        Ok(added)
    }

    async fn srem(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(0);
        };

        let removed = members.iter().filter(|m| set.remove(m.as_str())).count() as u64;
        if set.is_empty() {
            inner.sets.remove(key);
        }

        self.metrics.record_eviction(key, removed);
        Ok(removed)
    }

    async fn srandmember(&self, key: &str, count: usize) -> CacheResult<Vec<String>> {
        let inner = self.inner.lock();
        let Some(set) = inner.sets.get(key) else {
            return Ok(Vec::new());
        };

        let mut rng = rand::thread_rng();
        Ok(set.iter().cloned().choose_multiple(&mut rng, count))
    }

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> CacheResult<u64> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map_or(0, |set| set.len() as u64))
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
