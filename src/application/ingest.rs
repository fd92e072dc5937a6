//! Asset ingestion: validation, capacity admission, blob storage and insert.

use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::repos::{AssetFilter, AssetsRepo, NewAsset, RepoError, TagMatch};
use crate::domain::assets::{AssetId, TagSet};
use crate::domain::entities::AssetRecord;
use crate::domain::error::DomainError;
use crate::domain::types::AssetKind;
use crate::infra::uploads::{UploadStorage, UploadStorageError};

const SOURCE: &str = "application::ingest";

/// Which rows count towards the per-kind ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Every row, tombstones included.
    #[default]
    Total,
    /// Only rows without `deleted_at`.
    Live,
}

impl CapacityPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CapacityPolicy::Total => "total",
            CapacityPolicy::Live => "live",
        }
    }

    fn filter(self) -> AssetFilter {
        match self {
            CapacityPolicy::Total => AssetFilter::everything(),
            CapacityPolicy::Live => AssetFilter::live(TagMatch::Any),
        }
    }
}

impl std::str::FromStr for CapacityPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "total" => Ok(CapacityPolicy::Total),
            "live" => Ok(CapacityPolicy::Live),
            other => Err(format!(
                "unknown capacity policy `{other}` (expected total|live)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityLimits {
    pub photos: u64,
    pub videos: u64,
    pub policy: CapacityPolicy,
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self {
            photos: 50,
            videos: 20,
            policy: CapacityPolicy::Total,
        }
    }
}

impl CapacityLimits {
    pub fn limit_for(&self, kind: AssetKind) -> u64 {
        match kind {
            AssetKind::Photo => self.photos,
            AssetKind::Video => self.videos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub data: Bytes,
}

/// Raw multipart fields, still unvalidated.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file: Option<UploadFile>,
    pub tags_json: Option<String>,
    pub requested_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("{kind} `{id}` already exists")]
    Conflict { kind: AssetKind, id: String },
    #[error("{kind} capacity of {limit} reached")]
    Capacity { kind: AssetKind, limit: u64 },
    #[error("failed to store uploaded file")]
    Storage(#[from] UploadStorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct IngestService {
    repo: Arc<dyn AssetsRepo>,
    storage: Arc<UploadStorage>,
    limits: CapacityLimits,
}

impl IngestService {
    pub fn new(
        repo: Arc<dyn AssetsRepo>,
        storage: Arc<UploadStorage>,
        limits: CapacityLimits,
    ) -> Self {
        Self {
            repo,
            storage,
            limits,
        }
    }

    pub fn limits(&self) -> CapacityLimits {
        self.limits
    }

    /// Create an asset of `kind`.
    ///
    /// Cached reads need no invalidation here: by-id misses are never cached
    /// and listings may lag until their TTL expires.
    pub async fn ingest(
        &self,
        kind: AssetKind,
        request: UploadRequest,
    ) -> Result<AssetRecord, IngestError> {
        let file = request
            .file
            .filter(|file| !file.data.is_empty())
            .ok_or_else(|| {
                DomainError::validation(format!("a non-empty `{}` file is required", kind.file_field()))
            })?;
        let tags = TagSet::parse_json(request.tags_json.as_deref())?;
        let id = match request.requested_id.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                let id = AssetId::parse(raw.trim())?;
                if self.repo.find_asset(kind, id.as_str()).await?.is_some() {
                    return Err(IngestError::Conflict {
                        kind,
                        id: id.into_inner(),
                    });
                }
                id
            }
            _ => AssetId::generate(),
        };
        let title = request
            .title
            .map(|title| title.trim().to_string())
            .unwrap_or_default();

        self.admit(kind).await?;

        let stored = self.storage.store(&file.file_name, file.data).await?;
        let asset = NewAsset {
            id: id.as_str().to_string(),
            kind,
            url: stored.url(),
            tags: tags.into_vec(),
            title,
            created_at: OffsetDateTime::now_utc(),
        };

        match self.repo.insert_asset(asset).await {
            Ok(record) => {
                info!(
                    target = SOURCE,
                    kind = %kind,
                    id = %record.id,
                    size_bytes = stored.size_bytes,
                    checksum = %stored.checksum,
                    "asset ingested"
                );
                Ok(record)
            }
            Err(err) => {
                if let Err(cleanup) = self.storage.delete(&stored.stored_path).await {
                    warn!(
                        target = SOURCE,
                        path = %stored.stored_path,
                        error = %cleanup,
                        "failed to remove orphaned blob"
                    );
                }
                match err {
                    RepoError::Duplicate { .. } => Err(IngestError::Conflict {
                        kind,
                        id: id.into_inner(),
                    }),
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Check the ceiling against the store. Concurrent uploads may overshoot.
    async fn admit(&self, kind: AssetKind) -> Result<(), IngestError> {
        let limit = self.limits.limit_for(kind);
        let count = self
            .repo
            .count_assets(kind, &self.limits.policy.filter())
            .await?;
        if count >= limit {
            warn!(
                target = SOURCE,
                kind = %kind,
                count,
                limit,
                policy = self.limits.policy.as_str(),
                "capacity reached"
            );
            return Err(IngestError::Capacity { kind, limit });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("TOTAL".parse::<CapacityPolicy>(), Ok(CapacityPolicy::Total));
        assert_eq!("live".parse::<CapacityPolicy>(), Ok(CapacityPolicy::Live));
        assert!("some".parse::<CapacityPolicy>().is_err());
    }

    #[test]
    fn default_limits_match_catalog_ceilings() {
        let limits = CapacityLimits::default();
        assert_eq!(limits.limit_for(AssetKind::Photo), 50);
        assert_eq!(limits.limit_for(AssetKind::Video), 20);
        assert_eq!(limits.policy, CapacityPolicy::Total);
    }

    #[test]
    fn policies_select_filters() {
        assert!(CapacityPolicy::Total.filter().include_deleted);
        assert!(!CapacityPolicy::Live.filter().include_deleted);
    }
}
