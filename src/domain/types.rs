//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

/// The two asset families the catalog stores. Each lives in its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Photo,
    Video,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Photo, AssetKind::Video];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Photo => "photo",
            AssetKind::Video => "video",
        }
    }

    /// Plural path segment used under `/v1`.
    pub fn collection(self) -> &'static str {
        match self {
            AssetKind::Photo => "photos",
            AssetKind::Video => "videos",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            AssetKind::Photo => "photos",
            AssetKind::Video => "videos",
        }
    }

    /// Multipart field carrying the file payload.
    pub fn file_field(self) -> &'static str {
        self.as_str()
    }

    /// Multipart field carrying an optional caller-supplied identifier.
    pub fn id_field(self) -> &'static str {
        match self {
            AssetKind::Photo => "imageId",
            AssetKind::Video => "videoId",
        }
    }

    /// JSON field holding the listing total in paged responses.
    pub fn total_field(self) -> &'static str {
        match self {
            AssetKind::Photo => "totalPhotos",
            AssetKind::Video => "totalVideos",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
