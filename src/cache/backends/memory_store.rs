use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::cache::store::{Expiry, KeyValueStore, StoreError};

const MEMORY_ENDPOINT: &str = "memory";

/// 两次清理过期键的最小间隔
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    last_sweep: Option<Instant>,
}

impl Entries {
    /// 过期的计数器键之后不会再被读到，只能在写入时顺带清掉
    fn sweep(&mut self, now: Instant) {
        if self
            .last_sweep
            .is_some_and(|at| now.saturating_duration_since(at) < SWEEP_INTERVAL)
        {
            return;
        }

        let before = self.map.len();
        self.map.retain(|_, e| e.is_live(now));
        self.last_sweep = Some(now);

        let removed = before - self.map.len();
        if removed > 0 {
            tracing::debug!(removed, "expired entries swept");
        }
    }
}

/// 进程内 TTL 存储，语义与 redis 后端一致
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 剩余存活时间；键不存在或未设置过期时返回 `None`
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .map
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().map.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.sweep(now);
        let expires_at = match expiry {
            Expiry::Never => None,
            Expiry::After(ttl) => Some(now + ttl),
            Expiry::KeepExisting => entries
                .map
                .get(key)
                .filter(|e| e.is_live(now))
                .and_then(|e| e.expires_at),
        };

        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().map.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.sweep(now);
        let current = match entries.map.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => entry
                .value
                .trim()
                .parse::<i64>()
                .map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("not an integer: {:?}", entry.value),
                })?,
            None => 0,
        };

        let next = current + 1;
        entries.map.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(next)
    }

    fn endpoints(&self) -> Vec<String> {
        vec![MEMORY_ENDPOINT.to_string()]
    }

    async fn health(&self, endpoint: &str) -> Result<(), StoreError> {
        if endpoint == MEMORY_ENDPOINT {
            Ok(())
        } else {
            Err(StoreError::UnknownEndpoint(endpoint.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_not_an_error() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Expiry::After(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_existing_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", "1", Expiry::After(Duration::from_secs(100)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;

        store.set("k", "2", Expiry::KeepExisting).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(60)));

        // 键不存在时不附带过期时间
        store.set("fresh", "x", Expiry::KeepExisting).await.unwrap();
        assert_eq!(store.ttl("fresh"), None);
    }

    #[tokio::test]
    async fn test_increment_from_absent_and_existing() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.increment("c", ttl).await.unwrap(), 1);
        assert_eq!(store.increment("c", ttl).await.unwrap(), 2);

        store.set("c", "41", Expiry::Never).await.unwrap();
        assert_eq!(store.increment("c", ttl).await.unwrap(), 42);
        assert!(store.ttl("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_counters_are_swept_on_write() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        store.increment("counter/2024-01/a@x.com", ttl).await.unwrap();
        store.increment("counter/2024-01/b@x.com", ttl).await.unwrap();
        assert_eq!(store.entries.lock().map.len(), 2);

        // 过期但还没到清理间隔，条目仍在
        tokio::time::advance(Duration::from_secs(20)).await;
        store.increment("counter/2024-02/a@x.com", ttl).await.unwrap();
        assert_eq!(store.entries.lock().map.len(), 3);

        tokio::time::advance(SWEEP_INTERVAL).await;
        store.increment("counter/2024-03/a@x.com", ttl).await.unwrap();
        assert_eq!(store.entries.lock().map.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("c", "lots", Expiry::Never).await.unwrap();
        let err = store.increment("c", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_health() {
        let store = MemoryStore::new();
        store.set("k", "v", Expiry::Never).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        assert_eq!(store.endpoints(), vec!["memory".to_string()]);
        store.health("memory").await.unwrap();
        assert!(store.health("elsewhere").await.is_err());
    }
}
