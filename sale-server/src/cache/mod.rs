//! 缓存端口 - get / set / invalidate
//!
//! 只做旁路缓存（look-aside），败退语义：命中失败与未命中等价，
//! 调用方总是能从权威数据源重建。没有跨键事务，没有持久化。

use async_trait::async_trait;
use dashmap::DashMap;
use shared::types::Timestamp;
use shared::util::now_millis;

/// Best-effort string cache with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `None` on miss, expiry, or backend fault.
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value` for `ttl_secs` seconds.
    async fn set(&self, key: &str, value: String, ttl_secs: u64);

    /// Drop the entry immediately.
    async fn invalidate(&self, key: &str);
}

struct CacheEntry {
    value: String,
    expires_at: Timestamp,
}

/// In-process TTL cache. Entries expire lazily on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let now = now_millis();
        // The read guard must be released before removing the entry
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        None
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now_millis() + (ttl_secs * 1000) as i64,
            },
        );
    }

    async fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }
}
