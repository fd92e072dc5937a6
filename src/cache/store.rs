//! The cache contract shared by every backend.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached, or is inside its reconnect backoff window.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation `{op}` timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache misconfigured: {0}")]
    Configuration(String),
}

/// TTL key-value store in front of the record store.
///
/// Implementations must tolerate concurrent callers; concurrent `set`s on one
/// key resolve last-write-wins. There is no multi-key atomicity.
///
/// Read-through fills go through [`CacheStore::set_if_absent`] so a fill that
/// raced a write never replaces the newer entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Store `value` only when no live entry holds `key`. Returns whether it was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    /// Release connections. Later calls may fail or reconnect.
    async fn close(&self);

    fn backend(&self) -> &'static str;
}

/// Backend used when caching is disabled: every read misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: Bytes,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(&self) {}

    fn backend(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_store_never_hits() {
        let store = NoopCacheStore;
        store
            .set("photo:id:a", Bytes::from_static(b"{}"), Duration::from_secs(60))
            .await
            .expect("set succeeds");
        assert!(store.get("photo:id:a").await.expect("get succeeds").is_none());
        assert_eq!(store.backend(), "disabled");
    }
}
