//! Cache-coordinated reads over the asset catalog.
//!
//! Every read is a [`QueryDescriptor`] resolved by [`CatalogService::fetch_and_cache`]:
//! look the key up in the cache, fall back to the store on a miss, and write
//! found results back with the configured TTL. Only by-id entries are kept
//! coherent on writes; tag and listing entries may lag the store until their
//! TTL runs out.
//!
//! Fills only land on an empty key. A soft delete overwrites unconditionally,
//! so a slow read that started before the delete cannot put the live copy back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::pagination::{AssetPage, PageSpec};
use crate::application::repos::{AssetFilter, AssetsRepo, RepoError, TagMatch};
use crate::cache::{CacheStore, QueryDescriptor, by_id_key};
use crate::domain::assets::{AssetId, TagSet, normalize_tag};
use crate::domain::entities::AssetRecord;
use crate::domain::error::DomainError;
use crate::domain::types::AssetKind;

const SOURCE: &str = "application::catalog";

pub const METRIC_CACHE_HIT: &str = "mediadex_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "mediadex_cache_miss_total";
pub const METRIC_CACHE_BYPASS: &str = "mediadex_cache_bypass_total";
pub const METRIC_CACHE_WRITE_ERROR: &str = "mediadex_cache_write_error_total";
pub const METRIC_CACHE_FILL_SKIPPED: &str = "mediadex_cache_fill_skipped_total";
pub const METRIC_STORE_QUERY_MS: &str = "mediadex_store_query_ms";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("{kind} `{id}` not found")]
    NotFound { kind: AssetKind, id: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheWrite {
    /// Read-through fill; never replaces an existing entry.
    Fill,
    /// Authoritative new state after a write.
    Overwrite,
}

/// A resolved read: one record or one listing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Asset(AssetRecord),
    Page(AssetPage),
}

impl QueryOutcome {
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            QueryOutcome::Asset(record) => serde_json::to_vec(record),
            QueryOutcome::Page(page) => serde_json::to_vec(page),
        }
    }

    fn decode(query: &QueryDescriptor, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        match query {
            QueryDescriptor::ById { .. } => serde_json::from_slice(bytes).map(QueryOutcome::Asset),
            QueryDescriptor::ByTags { .. } | QueryDescriptor::Listing { .. } => {
                serde_json::from_slice(bytes).map(QueryOutcome::Page)
            }
        }
    }

    /// Negative results stay out of the cache so a later create is visible at once.
    fn is_cacheable(&self) -> bool {
        match self {
            QueryOutcome::Asset(_) => true,
            QueryOutcome::Page(page) => !page.items.is_empty(),
        }
    }

    fn into_asset(self) -> Option<AssetRecord> {
        match self {
            QueryOutcome::Asset(record) => Some(record),
            QueryOutcome::Page(_) => None,
        }
    }

    fn into_page(self) -> Option<AssetPage> {
        match self {
            QueryOutcome::Page(page) => Some(page),
            QueryOutcome::Asset(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn AssetsRepo>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn AssetsRepo>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { repo, cache, ttl }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub async fn get_by_id(
        &self,
        kind: AssetKind,
        raw_id: Option<&str>,
    ) -> Result<AssetRecord, CatalogError> {
        let id = AssetId::parse_optional(raw_id)?;
        let query = QueryDescriptor::ById { id: id.clone() };
        self.fetch_and_cache(kind, &query)
            .await?
            .and_then(QueryOutcome::into_asset)
            .ok_or_else(|| CatalogError::NotFound {
                kind,
                id: id.into_inner(),
            })
    }

    /// Any-of tag search over live assets.
    pub async fn list_by_tags(
        &self,
        kind: AssetKind,
        raw_tags: Option<&str>,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<AssetPage, CatalogError> {
        let tags = TagSet::parse_csv(raw_tags)?;
        let page = PageSpec::parse(page, limit)?;
        self.fetch_page(kind, QueryDescriptor::ByTags { tags, page })
            .await
    }

    /// Default listing of live assets, optionally narrowed to one exact tag.
    pub async fn list_all(
        &self,
        kind: AssetKind,
        page: Option<&str>,
        limit: Option<&str>,
        tag: Option<&str>,
    ) -> Result<AssetPage, CatalogError> {
        let page = PageSpec::parse(page, limit)?;
        let tag = match tag {
            Some(raw) if !raw.trim().is_empty() => Some(normalize_tag(raw)?),
            _ => None,
        };
        self.fetch_page(kind, QueryDescriptor::Listing { tag, page })
            .await
    }

    /// Tombstone the asset and overwrite its by-id entry with the new state.
    pub async fn soft_delete(
        &self,
        kind: AssetKind,
        raw_id: Option<&str>,
    ) -> Result<AssetRecord, CatalogError> {
        let id = AssetId::parse_optional(raw_id)?;
        let record = self
            .repo
            .soft_delete_asset(kind, id.as_str())
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                kind,
                id: id.as_str().to_string(),
            })?;

        let outcome = QueryOutcome::Asset(record.clone());
        let key = by_id_key(kind, &id);
        if !self.cache_put(&key, &outcome, CacheWrite::Overwrite).await {
            // A stale live copy must not survive the failed overwrite.
            self.invalidate(kind, &id).await;
        }

        debug!(target = SOURCE, kind = %kind, id = %id, "asset tombstoned");
        Ok(record)
    }

    /// Drop the by-id entry for `id`. Tag and listing entries expire on their own.
    pub async fn invalidate(&self, kind: AssetKind, id: &AssetId) {
        self.drop_entry(&by_id_key(kind, id)).await;
    }

    async fn drop_entry(&self, key: &str) {
        if let Err(err) = self.cache.delete(key).await {
            counter!(METRIC_CACHE_WRITE_ERROR, "op" => "delete").increment(1);
            warn!(
                target = SOURCE,
                key = %key,
                backend = self.cache.backend(),
                error = %err,
                "cache invalidation failed"
            );
        }
    }

    /// Resolve `query` through the cache, falling back to the store.
    ///
    /// `Ok(None)` means the store had no matching record. Cache failures never
    /// surface: the read is served from the store instead.
    pub async fn fetch_and_cache(
        &self,
        kind: AssetKind,
        query: &QueryDescriptor,
    ) -> Result<Option<QueryOutcome>, CatalogError> {
        let key = query.cache_key(kind);
        let shape = query.shape();

        if let Some(hit) = self.cache_get(&key, query).await {
            counter!(METRIC_CACHE_HIT, "shape" => shape).increment(1);
            debug!(target = SOURCE, key = %key, "cache hit");
            return Ok(Some(hit));
        }

        let started = Instant::now();
        let outcome = self.load(kind, query).await;
        histogram!(METRIC_STORE_QUERY_MS, "shape" => shape)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        let outcome = outcome?;

        if let Some(found) = outcome.as_ref().filter(|found| found.is_cacheable()) {
            self.cache_put(&key, found, CacheWrite::Fill).await;
        }

        Ok(outcome)
    }

    async fn fetch_page(
        &self,
        kind: AssetKind,
        query: QueryDescriptor,
    ) -> Result<AssetPage, CatalogError> {
        let page = self
            .fetch_and_cache(kind, &query)
            .await?
            .and_then(QueryOutcome::into_page);
        // Listings always resolve to a page; an absent one is an empty window.
        Ok(page.unwrap_or_else(|| empty_page(&query)))
    }

    async fn load(
        &self,
        kind: AssetKind,
        query: &QueryDescriptor,
    ) -> Result<Option<QueryOutcome>, CatalogError> {
        match query {
            QueryDescriptor::ById { id } => Ok(self
                .repo
                .find_asset(kind, id.as_str())
                .await?
                .map(QueryOutcome::Asset)),
            QueryDescriptor::ByTags { tags, page } => {
                let filter = AssetFilter::live(TagMatch::HasSome(tags.as_slice().to_vec()));
                let slice = self.repo.list_assets(kind, &filter, *page).await?;
                Ok(Some(QueryOutcome::Page(AssetPage::from_slice(slice, *page))))
            }
            QueryDescriptor::Listing { tag, page } => {
                let tags = tag.clone().map(TagMatch::Has).unwrap_or_default();
                let filter = AssetFilter::live(tags);
                let slice = self.repo.list_assets(kind, &filter, *page).await?;
                Ok(Some(QueryOutcome::Page(AssetPage::from_slice(slice, *page))))
            }
        }
    }

    async fn cache_get(&self, key: &str, query: &QueryDescriptor) -> Option<QueryOutcome> {
        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                counter!(METRIC_CACHE_MISS, "shape" => query.shape()).increment(1);
                return None;
            }
            Err(err) => {
                counter!(METRIC_CACHE_BYPASS, "op" => "get").increment(1);
                warn!(
                    target = SOURCE,
                    key,
                    backend = self.cache.backend(),
                    error = %err,
                    "cache read failed, serving from store"
                );
                return None;
            }
        };

        match QueryOutcome::decode(query, &bytes) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                counter!(METRIC_CACHE_MISS, "shape" => query.shape()).increment(1);
                warn!(target = SOURCE, key, error = %err, "discarding undecodable cache entry");
                self.drop_entry(key).await;
                None
            }
        }
    }

    /// Returns false when the write failed. A fill that finds the key taken
    /// counts as done.
    async fn cache_put(&self, key: &str, outcome: &QueryOutcome, write: CacheWrite) -> bool {
        let payload = match outcome.encode() {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_ERROR, "op" => "encode").increment(1);
                warn!(target = SOURCE, key, error = %err, "failed to encode cache entry");
                return false;
            }
        };

        let result = match write {
            CacheWrite::Overwrite => self.cache.set(key, payload, self.ttl).await.map(|()| true),
            CacheWrite::Fill => self.cache.set_if_absent(key, payload, self.ttl).await,
        };
        match result {
            Ok(true) => true,
            Ok(false) => {
                counter!(METRIC_CACHE_FILL_SKIPPED).increment(1);
                debug!(target = SOURCE, key, "cache fill skipped, entry already present");
                true
            }
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_ERROR, "op" => "set").increment(1);
                warn!(
                    target = SOURCE,
                    key,
                    backend = self.cache.backend(),
                    error = %err,
                    "cache write failed"
                );
                false
            }
        }
    }
}

fn empty_page(query: &QueryDescriptor) -> AssetPage {
    let page = match query {
        QueryDescriptor::ByTags { page, .. } | QueryDescriptor::Listing { page, .. } => *page,
        QueryDescriptor::ById { .. } => PageSpec::All,
    };
    AssetPage::from_slice(Default::default(), page)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record() -> AssetRecord {
        AssetRecord {
            id: "a".to_string(),
            kind: AssetKind::Photo,
            url: "/uploads/a.jpg".to_string(),
            tags: vec!["sky".to_string()],
            title: String::new(),
            created_at: datetime!(2025-03-01 12:00 UTC),
            updated_at: datetime!(2025-03-01 12:00 UTC),
            deleted_at: None,
        }
    }

    #[test]
    fn outcome_decodes_by_query_shape() {
        let by_id = QueryDescriptor::ById {
            id: AssetId::parse("a").expect("valid"),
        };
        let encoded = QueryOutcome::Asset(record()).encode().expect("encodes");
        assert_eq!(
            QueryOutcome::decode(&by_id, &encoded).expect("decodes"),
            QueryOutcome::Asset(record())
        );

        let listing = QueryDescriptor::Listing {
            tag: None,
            page: PageSpec::All,
        };
        assert!(QueryOutcome::decode(&listing, &encoded).is_err());
    }

    #[test]
    fn empty_pages_are_not_cacheable() {
        let empty = QueryOutcome::Page(empty_page(&QueryDescriptor::Listing {
            tag: None,
            page: PageSpec::page(1, 10),
        }));
        assert!(!empty.is_cacheable());
        assert!(QueryOutcome::Asset(record()).is_cacheable());
    }
}
