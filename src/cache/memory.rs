//! In-process LRU cache with per-entry expiry.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;

use super::config::CacheConfig;
use super::lock::{read_entries, write_entries};
use super::store::{CacheError, CacheStore};

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
        }
    }

    /// Number of entries currently held, expired ones included until touched.
    pub fn len(&self) -> usize {
        read_entries(&self.entries, "memory.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str, now: Instant) -> Option<Bytes> {
        let mut entries = write_entries(&self.entries, "memory.get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(self.lookup(key, Instant::now()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        write_entries(&self.entries, "memory.set").put(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = write_entries(&self.entries, "memory.set_if_absent");
        if entries.peek(key).is_some_and(|entry| entry.expires_at > now) {
            return Ok(false);
        }
        entries.put(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        write_entries(&self.entries, "memory.delete").pop(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(&self) {
        write_entries(&self.entries, "memory.close").clear();
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let store = MemoryCacheStore::new(&CacheConfig::memory());
        assert!(store.get("photo:id:a").await.expect("get").is_none());

        store
            .set("photo:id:a", Bytes::from_static(b"payload"), MINUTE)
            .await
            .expect("set");
        assert_eq!(
            store.get("photo:id:a").await.expect("get"),
            Some(Bytes::from_static(b"payload"))
        );

        store.delete("photo:id:a").await.expect("delete");
        assert!(store.get("photo:id:a").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn later_set_wins() {
        let store = MemoryCacheStore::new(&CacheConfig::memory());
        store
            .set("k", Bytes::from_static(b"first"), MINUTE)
            .await
            .expect("set");
        store
            .set("k", Bytes::from_static(b"second"), MINUTE)
            .await
            .expect("set");
        assert_eq!(
            store.get("k").await.expect("get"),
            Some(Bytes::from_static(b"second"))
        );
    }

    #[tokio::test]
    async fn set_if_absent_keeps_a_live_entry() {
        let store = MemoryCacheStore::new(&CacheConfig::memory());
        store
            .set("k", Bytes::from_static(b"tombstone"), MINUTE)
            .await
            .expect("set");

        let written = store
            .set_if_absent("k", Bytes::from_static(b"live"), MINUTE)
            .await
            .expect("set_if_absent");
        assert!(!written);
        assert_eq!(
            store.get("k").await.expect("get"),
            Some(Bytes::from_static(b"tombstone"))
        );

        assert!(
            store
                .set_if_absent("other", Bytes::from_static(b"fresh"), MINUTE)
                .await
                .expect("set_if_absent")
        );
    }

    #[tokio::test]
    async fn set_if_absent_replaces_an_expired_entry() {
        let store = MemoryCacheStore::new(&CacheConfig::memory());
        store
            .set("k", Bytes::from_static(b"old"), Duration::ZERO)
            .await
            .expect("set");

        let written = store
            .set_if_absent("k", Bytes::from_static(b"new"), MINUTE)
            .await
            .expect("set_if_absent");
        assert!(written);
        assert_eq!(
            store.get("k").await.expect("get"),
            Some(Bytes::from_static(b"new"))
        );
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let store = MemoryCacheStore::new(&CacheConfig::memory());
        {
            let mut entries = write_entries(&store.entries, "test.seed");
            entries.put(
                "k".to_string(),
                Entry {
                    value: Bytes::from_static(b"old"),
                    expires_at: Instant::now() + Duration::from_secs(5),
                },
            );
        }

        let later = Instant::now() + Duration::from_secs(10);
        assert!(store.lookup("k", later).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let config = CacheConfig {
            memory_capacity: 2,
            ..CacheConfig::memory()
        };
        let store = MemoryCacheStore::new(&config);

        store.set("a", Bytes::from_static(b"1"), MINUTE).await.expect("set");
        store.set("b", Bytes::from_static(b"2"), MINUTE).await.expect("set");
        // Touch `a` so `b` becomes the eviction candidate.
        assert!(store.get("a").await.expect("get").is_some());
        store.set("c", Bytes::from_static(b"3"), MINUTE).await.expect("set");

        assert!(store.get("a").await.expect("get").is_some());
        assert!(store.get("b").await.expect("get").is_none());
        assert!(store.get("c").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let store = MemoryCacheStore::new(&CacheConfig::memory());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set("k", Bytes::from_static(b"v"), MINUTE).await.expect("set");
        assert!(store.get("k").await.expect("get").is_some());
    }
}
