//! Tessera Sort Keys
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::path::{FieldPathResolver, ResolvedPath};
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tessera_resource::ResourceDescriptor;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One sort key; earlier keys take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub direction: Direction,
    pub resolved: Option<ResolvedPath>,
}

impl SortKey {
    pub fn new(path: impl Into<String>, direction: Direction) -> Self {
        Self {
            path: path.into(),
            direction,
            resolved: None,
        }
    }

    pub fn is_descending(&self) -> bool {
        self.direction == Direction::Desc
    }
}

/// Split `sort=-title,created` into ordered keys.
pub fn parse_sort(raw: &str) -> Result<Vec<SortKey>> {
    raw.split(',')
        .map(str::trim)
        .map(|segment| {
            let (path, direction) = match segment.strip_prefix('-') {
                Some(path) => (path, Direction::Desc),
                None => (segment, Direction::Asc),
            };
            if path.is_empty() {
                return Err(TesseraError::Parse(format!(
                    "The sort parameter `{}` contains an empty field.",
                    raw
                )));
            }
            Ok(SortKey::new(path, direction))
        })
        .collect()
}

/// Resolve the path of every key against `root`.
pub fn resolve_sort(
    keys: &mut [SortKey],
    resolver: &FieldPathResolver<'_>,
    root: &Arc<ResourceDescriptor>,
) -> Result<()> {
    for key in keys {
        key.resolved = Some(resolver.resolve(root, &key.path)?);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort() {
        let keys = parse_sort("-title,created").unwrap();
        assert_eq!(
            keys,
            vec![
                SortKey::new("title", Direction::Desc),
                SortKey::new("created", Direction::Asc),
            ]
        );
        assert!(keys[0].is_descending());
    }

    #[test]
    fn test_nested_sort_path() {
        let keys = parse_sort("author.name").unwrap();
        assert_eq!(keys[0].path, "author.name");
        assert_eq!(keys[0].direction, Direction::Asc);
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(parse_sort("title,,body").is_err());
        assert!(parse_sort("-").is_err());
        assert!(parse_sort("").is_err());
    }
}
