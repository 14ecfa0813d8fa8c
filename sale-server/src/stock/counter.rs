//! 原子计数器端口
//!
//! 库存底层只依赖三个原语：原子加、原子减、读取。生产部署把它
//! 接到共享计数存储（如 Redis 的 INCRBY/DECRBY/GET）；进程内
//! 适配器用每键一个 `AtomicI64` 提供同样的原子性。

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

pub type CounterResult<T> = Result<T, CounterError>;

/// Atomic integer store. Each call is individually atomic; no compound
/// operation (check-then-act) is offered, by contract.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add `delta` and return the post-operation value.
    async fn incr_by(&self, key: &str, delta: i64) -> CounterResult<i64>;

    /// Subtract `delta` and return the post-operation value.
    async fn decr_by(&self, key: &str, delta: i64) -> CounterResult<i64>;

    /// Current value; missing keys read as 0.
    async fn get(&self, key: &str) -> CounterResult<i64>;
}

/// In-process adapter: one `AtomicI64` per key.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, AtomicI64>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, key: &str, delta: i64) -> i64 {
        let entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicI64::new(0));
        entry.fetch_add(delta, Ordering::SeqCst) + delta
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr_by(&self, key: &str, delta: i64) -> CounterResult<i64> {
        Ok(self.apply(key, delta))
    }

    async fn decr_by(&self, key: &str, delta: i64) -> CounterResult<i64> {
        Ok(self.apply(key, -delta))
    }

    async fn get(&self, key: &str) -> CounterResult<i64> {
        Ok(self
            .counters
            .get(key)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0))
    }
}
