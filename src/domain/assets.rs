//! Identifier and tag invariants shared by reads and ingestion.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::error::DomainError;

/// Maximum accepted identifier length in characters.
pub const MAX_ID_LEN: usize = 128;

/// Maximum accepted tag length in characters.
pub const MAX_TAG_LEN: usize = 64;

/// Maximum number of tags accepted in a single query or upload.
pub const MAX_TAGS: usize = 32;

/// Validated asset identifier.
///
/// Identifiers are opaque: callers may supply their own, so the only rules are
/// non-blank, bounded length, and no control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

impl AssetId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::validation("asset id must not be empty"));
        }
        if raw.chars().count() > MAX_ID_LEN {
            return Err(DomainError::validation(format!(
                "asset id must be at most {MAX_ID_LEN} characters"
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(DomainError::validation(
                "asset id must not contain control characters",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Accepts an optional raw value, treating absence as a validation failure.
    pub fn parse_optional(raw: Option<&str>) -> Result<Self, DomainError> {
        match raw {
            Some(value) => Self::parse(value),
            None => Err(DomainError::validation("asset id is required")),
        }
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalise a single tag: trimmed, non-empty, bounded.
pub fn normalize_tag(raw: &str) -> Result<String, DomainError> {
    let tag = raw.trim();
    if tag.is_empty() {
        return Err(DomainError::validation("tags must not be blank"));
    }
    if tag.chars().count() > MAX_TAG_LEN {
        return Err(DomainError::validation(format!(
            "tags must be at most {MAX_TAG_LEN} characters"
        )));
    }
    if tag.chars().any(char::is_control) {
        return Err(DomainError::validation(
            "tags must not contain control characters",
        ));
    }
    Ok(tag.to_string())
}

/// A non-empty, sorted, de-duplicated set of tags.
///
/// Ordering is canonical so that `b,a` and `a,b,a` compare (and hash into cache
/// keys) identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new<I, S>(tags: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for raw in tags {
            set.insert(normalize_tag(raw.as_ref())?);
        }
        if set.is_empty() {
            return Err(DomainError::validation("at least one tag is required"));
        }
        if set.len() > MAX_TAGS {
            return Err(DomainError::validation(format!(
                "at most {MAX_TAGS} tags are accepted"
            )));
        }
        Ok(Self(set.into_iter().collect()))
    }

    /// Parse a comma-separated query value such as `?tags=a,b`.
    pub fn parse_csv(raw: Option<&str>) -> Result<Self, DomainError> {
        let raw = raw.ok_or_else(|| DomainError::validation("tags query is required"))?;
        if raw.trim().is_empty() {
            return Err(DomainError::validation("tags query must not be empty"));
        }
        Self::new(raw.split(','))
    }

    /// Parse the multipart `tags` field: a JSON array of strings.
    pub fn parse_json(raw: Option<&str>) -> Result<Self, DomainError> {
        let raw = raw.ok_or_else(|| DomainError::validation("tags are required"))?;
        let values: Vec<String> = serde_json::from_str(raw).map_err(|err| {
            DomainError::validation(format!("tags must be a JSON array of strings: {err}"))
        })?;
        Self::new(values)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_are_rejected() {
        assert!(AssetId::parse("").is_err());
        assert!(AssetId::parse("   ").is_err());
        assert!(AssetId::parse_optional(None).is_err());
        assert!(AssetId::parse("line\nbreak").is_err());
        assert_eq!(AssetId::parse("img-42").expect("valid").as_str(), "img-42");
    }

    #[test]
    fn overlong_ids_are_rejected() {
        let raw = "x".repeat(MAX_ID_LEN + 1);
        assert!(AssetId::parse(&raw).is_err());
        assert!(AssetId::parse(&raw[..MAX_ID_LEN]).is_ok());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(AssetId::generate(), AssetId::generate());
    }

    #[test]
    fn tag_sets_are_sorted_and_deduplicated() {
        let left = TagSet::parse_csv(Some("b,a")).expect("valid");
        let right = TagSet::parse_csv(Some(" a , b ,a")).expect("valid");
        assert_eq!(left, right);
        assert_eq!(left.as_slice(), ["a", "b"]);
    }

    #[test]
    fn empty_tag_queries_are_rejected() {
        assert!(TagSet::parse_csv(None).is_err());
        assert!(TagSet::parse_csv(Some("")).is_err());
        assert!(TagSet::parse_csv(Some("a,,b")).is_err());
    }

    #[test]
    fn json_tags_must_be_string_arrays() {
        let tags = TagSet::parse_json(Some(r#"["sky","beach","sky"]"#)).expect("valid");
        assert_eq!(tags.as_slice(), ["beach", "sky"]);

        assert!(TagSet::parse_json(Some("sky,beach")).is_err());
        assert!(TagSet::parse_json(Some("[1, 2]")).is_err());
        assert!(TagSet::parse_json(Some("[]")).is_err());
        assert!(TagSet::parse_json(None).is_err());
    }
}
