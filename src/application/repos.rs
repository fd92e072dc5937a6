//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::pagination::PageSpec;
use crate::domain::entities::AssetRecord;
use crate::domain::types::AssetKind;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Tag membership predicate applied to a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagMatch {
    #[default]
    Any,
    /// The asset carries this exact tag.
    Has(String),
    /// The asset carries at least one of these tags.
    HasSome(Vec<String>),
}

impl TagMatch {
    pub fn matches(&self, record: &AssetRecord) -> bool {
        match self {
            TagMatch::Any => true,
            TagMatch::Has(tag) => record.has_tag(tag),
            TagMatch::HasSome(tags) => record.has_any_tag(tags),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetFilter {
    pub tags: TagMatch,
    pub include_deleted: bool,
}

impl AssetFilter {
    /// Live assets only, optionally narrowed by tags.
    pub fn live(tags: TagMatch) -> Self {
        Self {
            tags,
            include_deleted: false,
        }
    }

    pub fn everything() -> Self {
        Self {
            tags: TagMatch::Any,
            include_deleted: true,
        }
    }

    pub fn matches(&self, record: &AssetRecord) -> bool {
        (self.include_deleted || !record.is_tombstone()) && self.tags.matches(record)
    }
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub id: String,
    pub kind: AssetKind,
    pub url: String,
    pub tags: Vec<String>,
    pub title: String,
    pub created_at: OffsetDateTime,
}

/// Items of one listing window plus the total match count, read from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct AssetSlice {
    pub items: Vec<AssetRecord>,
    pub total: u64,
}

#[async_trait]
pub trait AssetsRepo: Send + Sync {
    async fn insert_asset(&self, asset: NewAsset) -> Result<AssetRecord, RepoError>;

    /// Point lookup. Tombstones are returned like any other row.
    async fn find_asset(&self, kind: AssetKind, id: &str)
    -> Result<Option<AssetRecord>, RepoError>;

    async fn list_assets(
        &self,
        kind: AssetKind,
        filter: &AssetFilter,
        page: PageSpec,
    ) -> Result<AssetSlice, RepoError>;

    async fn count_assets(&self, kind: AssetKind, filter: &AssetFilter)
    -> Result<u64, RepoError>;

    /// Stamp `deleted_at` and bump `updated_at`. Returns `None` for unknown ids.
    async fn soft_delete_asset(
        &self,
        kind: AssetKind,
        id: &str,
    ) -> Result<Option<AssetRecord>, RepoError>;

    /// Connectivity probe for health reporting.
    async fn ping(&self) -> Result<(), RepoError>;
}
