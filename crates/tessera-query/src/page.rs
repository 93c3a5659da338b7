//! Tessera Offset Pagination
//!
//! The query engine is always asked for one row more than the page size.
//! Receiving that extra row is how a next page is detected; the row itself
//! is dropped before the page is materialized.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde_json::Value as JsonValue;
use tessera_common::{Result, TesseraError};

// =============================================================================
// Offset Page
// =============================================================================

/// A window over a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPage {
    pub offset: usize,
    pub size: usize,
}

impl OffsetPage {
    /// Create a page, clamping `size` into `1..=max_size`.
    pub fn new(offset: usize, size: usize, max_size: usize) -> Self {
        Self {
            offset,
            size: size.clamp(1, max_size.max(1)),
        }
    }

    /// Parse the nested `page` parameter.
    pub fn parse(param: Option<&JsonValue>, default_size: usize, max_size: usize) -> Result<Self> {
        let Some(param) = param else {
            return Ok(Self::new(0, default_size, max_size));
        };
        let obj = param.as_object().ok_or_else(|| {
            TesseraError::Parse("The page parameter must be an object.".to_string())
        })?;

        if let Some(key) = obj.keys().find(|k| *k != "offset" && *k != "limit" && *k != "size") {
            return Err(TesseraError::Parse(format!(
                "The page parameter `{}` is not supported.",
                key
            )));
        }

        let offset = parse_count(obj.get("offset"), "offset")?.unwrap_or(0);
        let size = match parse_count(obj.get("size"), "size")? {
            Some(size) => Some(size),
            None => parse_count(obj.get("limit"), "limit")?,
        }
        .unwrap_or(default_size);

        if size == 0 {
            return Err(TesseraError::Parse(
                "The page size must be greater than zero.".to_string(),
            ));
        }
        Ok(Self::new(offset, size, max_size))
    }

    /// Rows to request from the query engine.
    pub fn query_limit(&self) -> usize {
        self.size + 1
    }

    /// Cut a result that was fetched with `query_limit`.
    pub fn split<T>(&self, mut rows: Vec<T>) -> PageWindow<T> {
        let has_next = rows.len() > self.size;
        rows.truncate(self.size);
        PageWindow {
            items: rows,
            has_next,
        }
    }

    pub fn next(&self) -> OffsetPage {
        OffsetPage {
            offset: self.offset + self.size,
            size: self.size,
        }
    }

    /// Previous page, or `None` on the first page.
    pub fn prev(&self) -> Option<OffsetPage> {
        (self.offset > 0).then(|| OffsetPage {
            offset: self.offset.saturating_sub(self.size),
            size: self.size,
        })
    }
}

fn parse_count(value: Option<&JsonValue>, name: &str) -> Result<Option<usize>> {
    let invalid = || {
        TesseraError::Parse(format!(
            "The page {} must be a non-negative integer.",
            name
        ))
    };
    match value {
        None => Ok(None),
        Some(JsonValue::Number(n)) => n.as_u64().map(|n| Some(n as usize)).ok_or_else(invalid),
        Some(JsonValue::String(s)) => s.trim().parse::<usize>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Rows of one page plus whether more rows exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow<T> {
    pub items: Vec<T>,
    pub has_next: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_size_clamped() {
        let page = OffsetPage::parse(Some(&json!({"size": "500"})), 50, 50).unwrap();
        assert_eq!(page.size, 50);
        assert_eq!(page.query_limit(), 51);
    }

    #[test]
    fn test_defaults() {
        let page = OffsetPage::parse(None, 20, 50).unwrap();
        assert_eq!(page, OffsetPage { offset: 0, size: 20 });
        assert!(page.prev().is_none());
    }

    #[test]
    fn test_extra_row_signals_next_page() {
        let page = OffsetPage::new(0, 2, 50);

        let window = page.split(vec!["a", "b", "c"]);
        assert_eq!(window.items, vec!["a", "b"]);
        assert!(window.has_next);

        let window = page.split(vec!["a", "b"]);
        assert_eq!(window.items.len(), 2);
        assert!(!window.has_next);
    }

    #[test]
    fn test_next_and_prev() {
        let page = OffsetPage::parse(Some(&json!({"offset": "4", "size": "2"})), 50, 50).unwrap();
        assert_eq!(page.next(), OffsetPage { offset: 6, size: 2 });
        assert_eq!(page.prev(), Some(OffsetPage { offset: 2, size: 2 }));

        let page = OffsetPage::new(1, 5, 50);
        assert_eq!(page.prev(), Some(OffsetPage { offset: 0, size: 5 }));
    }

    #[test]
    fn test_invalid_page_parameters() {
        assert!(OffsetPage::parse(Some(&json!({"offset": "-1"})), 50, 50).is_err());
        assert!(OffsetPage::parse(Some(&json!({"size": "0"})), 50, 50).is_err());
        assert!(OffsetPage::parse(Some(&json!({"number": "2"})), 50, 50).is_err());
        assert!(OffsetPage::parse(Some(&json!("10")), 50, 50).is_err());
    }
}
