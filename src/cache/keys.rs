//! Cache key derivation.
//!
//! Every read is described by a [`QueryDescriptor`]; its key is a pure function
//! of the asset kind and the canonical query shape.

use std::borrow::Cow;

use crate::application::pagination::PageSpec;
use crate::domain::assets::{AssetId, TagSet};
use crate::domain::types::AssetKind;

/// Placeholder for "no tag filter" in listing keys.
const ANY_TAG: &str = "*";

/// The shape of a catalog read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryDescriptor {
    /// Point lookup by identifier.
    ById { id: AssetId },
    /// Any-of tag search.
    ByTags { tags: TagSet, page: PageSpec },
    /// Default listing with an optional exact tag filter.
    Listing { tag: Option<String>, page: PageSpec },
}

impl QueryDescriptor {
    pub fn cache_key(&self, kind: AssetKind) -> String {
        match self {
            QueryDescriptor::ById { id } => by_id_key(kind, id),
            QueryDescriptor::ByTags { tags, page } => {
                let joined = tags
                    .as_slice()
                    .iter()
                    .map(|tag| escape(tag))
                    .collect::<Vec<_>>()
                    .join(",");
                let (number, size) = page.key_parts();
                format!("{}:tags:{joined}:{number}:{size}", kind.as_str())
            }
            QueryDescriptor::Listing { tag, page } => {
                let tag = tag.as_deref().map(escape).unwrap_or(Cow::Borrowed(ANY_TAG));
                let (number, size) = page.key_parts();
                format!("{}:list:{tag}:{number}:{size}", kind.as_str())
            }
        }
    }

    /// Short label used in logs and metrics.
    pub fn shape(&self) -> &'static str {
        match self {
            QueryDescriptor::ById { .. } => "by_id",
            QueryDescriptor::ByTags { .. } => "by_tags",
            QueryDescriptor::Listing { .. } => "listing",
        }
    }
}

/// Key of the single entry that must be overwritten or dropped when `id` changes.
pub fn by_id_key(kind: AssetKind, id: &AssetId) -> String {
    format!("{}:id:{}", kind.as_str(), escape(id.as_str()))
}

/// Percent-escape the key separators so user data cannot forge another key.
fn escape(component: &str) -> Cow<'_, str> {
    if !component.contains(['%', ':', ',', '*']) {
        return Cow::Borrowed(component);
    }

    let mut escaped = String::with_capacity(component.len() + 6);
    for ch in component.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            ',' => escaped.push_str("%2C"),
            '*' => escaped.push_str("%2A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
