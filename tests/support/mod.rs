//! In-memory fakes shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use mediadex::application::pagination::PageSpec;
use mediadex::application::repos::{AssetFilter, AssetSlice, AssetsRepo, NewAsset, RepoError};
use mediadex::cache::{CacheConfig, CacheError, CacheStore, MemoryCacheStore};
use mediadex::domain::entities::AssetRecord;
use mediadex::domain::types::AssetKind;

pub fn base_time() -> OffsetDateTime {
    time::macros::datetime!(2025-03-01 12:00 UTC)
}

/// A live record created `minutes` after [`base_time`].
pub fn record(kind: AssetKind, id: &str, tags: &[&str], minutes: i64) -> AssetRecord {
    let created_at = base_time() + time::Duration::minutes(minutes);
    AssetRecord {
        id: id.to_string(),
        kind,
        url: format!("/uploads/2025/03/01/{id}.bin"),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        title: String::new(),
        created_at,
        updated_at: created_at,
        deleted_at: None,
    }
}

/// Record store held in memory, counting every call.
#[derive(Default)]
pub struct MemoryAssetsRepo {
    records: Mutex<Vec<AssetRecord>>,
    pub finds: AtomicUsize,
    pub lists: AtomicUsize,
    pub counts: AtomicUsize,
    pub inserts: AtomicUsize,
    pub soft_deletes: AtomicUsize,
    find_delay: Mutex<Option<Duration>>,
    find_reply_delay: Mutex<Option<Duration>>,
    duplicate_on_insert: AtomicBool,
    ping_fails: AtomicBool,
}

impl MemoryAssetsRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed(&self, records: impl IntoIterator<Item = AssetRecord>) {
        self.records.lock().await.extend(records);
    }

    /// Tombstone a row behind the service's back.
    pub async fn mark_deleted(&self, kind: AssetKind, id: &str) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.iter_mut().find(|r| r.kind == kind && r.id == id) {
            let now = OffsetDateTime::now_utc();
            record.deleted_at = Some(now);
            record.updated_at = now;
        }
    }

    pub async fn stored(&self, kind: AssetKind, id: &str) -> Option<AssetRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.kind == kind && r.id == id)
            .cloned()
    }

    pub async fn len(&self, kind: AssetKind) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub async fn set_find_delay(&self, delay: Duration) {
        *self.find_delay.lock().await = Some(delay);
    }

    /// Hold each point lookup's reply for `delay` after the row was read.
    pub async fn set_find_reply_delay(&self, delay: Duration) {
        *self.find_reply_delay.lock().await = Some(delay);
    }

    /// Make the next inserts fail as if a concurrent writer took the id.
    pub fn fail_inserts_with_duplicate(&self) {
        self.duplicate_on_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_pings(&self) {
        self.ping_fails.store(true, Ordering::SeqCst);
    }

    /// Total number of store reads and writes so far.
    pub fn calls(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
            + self.lists.load(Ordering::SeqCst)
            + self.counts.load(Ordering::SeqCst)
            + self.inserts.load(Ordering::SeqCst)
            + self.soft_deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetsRepo for MemoryAssetsRepo {
    async fn insert_asset(&self, asset: NewAsset) -> Result<AssetRecord, RepoError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.duplicate_on_insert.load(Ordering::SeqCst) {
            return Err(RepoError::Duplicate {
                constraint: "photos_pkey".to_string(),
            });
        }

        let mut records = self.records.lock().await;
        if records
            .iter()
            .any(|r| r.kind == asset.kind && r.id == asset.id)
        {
            return Err(RepoError::Duplicate {
                constraint: format!("{}_pkey", asset.kind.table()),
            });
        }
        let record = AssetRecord {
            id: asset.id,
            kind: asset.kind,
            url: asset.url,
            tags: asset.tags,
            title: asset.title,
            created_at: asset.created_at,
            updated_at: asset.created_at,
            deleted_at: None,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn find_asset(
        &self,
        kind: AssetKind,
        id: &str,
    ) -> Result<Option<AssetRecord>, RepoError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        let delay = *self.find_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let found = self.stored(kind, id).await;
        let reply_delay = *self.find_reply_delay.lock().await;
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn list_assets(
        &self,
        kind: AssetKind,
        filter: &AssetFilter,
        page: PageSpec,
    ) -> Result<AssetSlice, RepoError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let mut matching: Vec<AssetRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.kind == kind && filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let items = match page.limit_offset() {
            None => matching,
            Some((limit, offset)) => matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
        };
        Ok(AssetSlice { items, total })
    }

    async fn count_assets(&self, kind: AssetKind, filter: &AssetFilter) -> Result<u64, RepoError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        let count = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.kind == kind && filter.matches(r))
            .count();
        Ok(count as u64)
    }

    async fn soft_delete_asset(
        &self,
        kind: AssetKind,
        id: &str,
    ) -> Result<Option<AssetRecord>, RepoError> {
        self.soft_deletes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|r| r.kind == kind && r.id == id) else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_utc();
        record.deleted_at = record.deleted_at.or(Some(now));
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn ping(&self) -> Result<(), RepoError> {
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection refused"));
        }
        Ok(())
    }
}

/// Memory-backed cache that counts calls and can be told to fail.
pub struct CountingCache {
    inner: MemoryCacheStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub deletes: AtomicUsize,
    fail_sets: AtomicBool,
}

impl CountingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCacheStore::new(&CacheConfig::memory()),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_sets: AtomicBool::new(false),
        })
    }

    pub fn fail_sets(&self) {
        self.fail_sets.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.sets.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    /// Write straight to the backing store without touching the counters.
    pub async fn plant(&self, key: &str, value: &'static [u8]) {
        self.inner
            .set(key, Bytes::from_static(value), Duration::from_secs(60))
            .await
            .expect("memory cache accepts writes");
    }

    pub async fn peek(&self, key: &str) -> Option<Bytes> {
        self.inner.get(key).await.expect("memory cache reads")
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(CacheError::Timeout {
                op: "set",
                timeout_ms: 250,
            });
        }
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(CacheError::Timeout {
                op: "set_nx",
                timeout_ms: 250,
            });
        }
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.inner.ping().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// A cache whose backend is permanently unreachable.
#[derive(Default)]
pub struct FailingCache {
    pub attempts: AtomicUsize,
}

impl FailingCache {
    fn fail(&self) -> CacheError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        CacheError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(self.fail())
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(self.fail())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: Bytes,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Err(self.fail())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(self.fail())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(self.fail())
    }

    async fn close(&self) {}

    fn backend(&self) -> &'static str {
        "redis"
    }
}
