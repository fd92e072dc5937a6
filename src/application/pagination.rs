//! Offset pagination helpers shared by the catalog listings.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::application::repos::AssetSlice;
use crate::domain::entities::AssetRecord;
use crate::domain::error::DomainError;

/// Requested window over a listing.
///
/// `All` is selected when the caller omits `limit` or passes `0`; pages are
/// 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSpec {
    All,
    Page { number: NonZeroU32, size: NonZeroU32 },
}

impl PageSpec {
    pub fn page(number: u32, size: u32) -> Self {
        match (NonZeroU32::new(number), NonZeroU32::new(size)) {
            (Some(number), Some(size)) => Self::Page { number, size },
            (None, Some(size)) => Self::Page {
                number: NonZeroU32::MIN,
                size,
            },
            (_, None) => Self::All,
        }
    }

    /// Parse raw `page`/`limit` query values.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Result<Self, DomainError> {
        let limit = parse_number("limit", limit)?.unwrap_or(0);
        let Some(size) = NonZeroU32::new(limit) else {
            return Ok(Self::All);
        };

        let number = match parse_number("page", page)? {
            None => NonZeroU32::MIN,
            Some(value) => NonZeroU32::new(value)
                .ok_or_else(|| DomainError::validation("page must be at least 1"))?,
        };

        Ok(Self::Page { number, size })
    }

    /// Returns `(limit, offset)` for a bounded window.
    pub fn limit_offset(&self) -> Option<(i64, i64)> {
        match self {
            Self::All => None,
            Self::Page { number, size } => {
                let size = i64::from(size.get());
                let offset = i64::from(number.get() - 1) * size;
                Some((size, offset))
            }
        }
    }

    /// `(page, size)` as embedded in cache keys; `All` maps to `(0, 0)`.
    pub fn key_parts(&self) -> (u32, u32) {
        match self {
            Self::All => (0, 0),
            Self::Page { number, size } => (number.get(), size.get()),
        }
    }
}

fn parse_number(name: &str, raw: Option<&str>) -> Result<Option<u32>, DomainError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<u32>().map(Some).map_err(|_| {
            DomainError::validation(format!("{name} must be a non-negative integer"))
        }),
    }
}

/// A listing window with totals derived from the same snapshot as the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPage {
    pub items: Vec<AssetRecord>,
    pub total_count: u64,
    pub total_pages: u64,
    pub current_page: Option<u32>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl AssetPage {
    pub fn from_slice(slice: AssetSlice, page: PageSpec) -> Self {
        let AssetSlice { items, total } = slice;
        match page {
            PageSpec::All => Self {
                items,
                total_count: total,
                total_pages: 1,
                current_page: None,
                has_next_page: false,
                has_previous_page: false,
            },
            PageSpec::Page { number, size } => {
                let total_pages = total.div_ceil(u64::from(size.get()));
                let current = u64::from(number.get());
                Self {
                    items,
                    total_count: total,
                    total_pages,
                    current_page: Some(number.get()),
                    has_next_page: current < total_pages,
                    has_previous_page: current > 1,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_zero_limit_means_all() {
        assert_eq!(PageSpec::parse(None, None).expect("valid"), PageSpec::All);
        assert_eq!(
            PageSpec::parse(Some("3"), Some("0")).expect("valid"),
            PageSpec::All
        );
        assert_eq!(PageSpec::page(2, 0), PageSpec::All);
    }

    #[test]
    fn limit_without_page_starts_at_first_page() {
        let spec = PageSpec::parse(None, Some("10")).expect("valid");
        assert_eq!(spec, PageSpec::page(1, 10));
        assert_eq!(spec.limit_offset(), Some((10, 0)));
    }

    #[test]
    fn invalid_numbers_are_validation_errors() {
        assert!(PageSpec::parse(Some("two"), Some("10")).is_err());
        assert!(PageSpec::parse(Some("1"), Some("-5")).is_err());
        assert!(PageSpec::parse(Some("0"), Some("10")).is_err());
    }

    #[test]
    fn second_page_of_twenty_five() {
        let spec = PageSpec::page(2, 10);
        assert_eq!(spec.limit_offset(), Some((10, 10)));

        let page = AssetPage::from_slice(
            AssetSlice {
                items: Vec::new(),
                total: 25,
            },
            spec,
        );
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, Some(2));
        assert!(page.has_next_page);
        assert!(page.has_previous_page);
    }

    #[test]
    fn last_and_first_page_flags() {
        let last = AssetPage::from_slice(
            AssetSlice {
                items: Vec::new(),
                total: 25,
            },
            PageSpec::page(3, 10),
        );
        assert!(!last.has_next_page);
        assert!(last.has_previous_page);

        let first = AssetPage::from_slice(
            AssetSlice {
                items: Vec::new(),
                total: 5,
            },
            PageSpec::page(1, 10),
        );
        assert_eq!(first.total_pages, 1);
        assert!(!first.has_next_page);
        assert!(!first.has_previous_page);
    }

    #[test]
    fn unpaged_listing_reports_single_page() {
        let page = AssetPage::from_slice(
            AssetSlice {
                items: Vec::new(),
                total: 25,
            },
            PageSpec::All,
        );
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.current_page, None);
        assert!(!page.has_next_page);
        assert!(!page.has_previous_page);
    }
}
