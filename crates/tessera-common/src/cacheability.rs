//! Tessera Cacheability - Cache Metadata Accumulator
//!
//! Every value node carries the cache tags, cache contexts and max-age that
//! influenced it. Merging is associative and commutative: tags and contexts
//! are unioned, max-age takes the minimum with "uncacheable" dominating.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Max Age
// =============================================================================

/// How long a rendered value may be cached.
///
/// Variant order matters: the derived `Ord` makes `Uncacheable` the
/// smallest value and `Permanent` the largest, so merging is `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxAge {
    Uncacheable,
    Seconds(u64),
    #[default]
    Permanent,
}

impl MaxAge {
    /// Interpret the wire convention where `-1` means uncacheable.
    pub fn from_i64(value: i64) -> Self {
        if value < 0 {
            MaxAge::Uncacheable
        } else {
            MaxAge::Seconds(value as u64)
        }
    }

    /// Wire convention: `-1` for uncacheable, `None` for permanent.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MaxAge::Uncacheable => Some(-1),
            MaxAge::Seconds(secs) => Some(i64::try_from(*secs).unwrap_or(i64::MAX)),
            MaxAge::Permanent => None,
        }
    }

    /// Value for a `Cache-Control` response header.
    pub fn cache_control(&self) -> String {
        match self {
            MaxAge::Uncacheable => "no-cache, private".to_string(),
            MaxAge::Seconds(secs) => format!("max-age={}, public", secs),
            MaxAge::Permanent => "max-age=31536000, public".to_string(),
        }
    }
}

// =============================================================================
// Cacheability
// =============================================================================

/// Cache tags, contexts and max-age describing how a value may be cached
/// and when it must be invalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cacheability {
    pub tags: BTreeSet<String>,
    pub contexts: BTreeSet<String>,
    pub max_age: MaxAge,
}

impl Cacheability {
    /// Neutral element of `merge`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uncacheable() -> Self {
        Self {
            max_age: MaxAge::Uncacheable,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.insert(context.into());
        self
    }

    pub fn with_max_age(mut self, max_age: MaxAge) -> Self {
        self.max_age = self.max_age.min(max_age);
        self
    }

    /// Pure merge: union of tags, union of contexts, minimum max-age.
    pub fn merge(&self, other: &Cacheability) -> Cacheability {
        Cacheability {
            tags: self.tags.union(&other.tags).cloned().collect(),
            contexts: self.contexts.union(&other.contexts).cloned().collect(),
            max_age: self.max_age.min(other.max_age),
        }
    }

    /// Fold any number of accumulators into one.
    pub fn merge_all<'a, I>(items: I) -> Cacheability
    where
        I: IntoIterator<Item = &'a Cacheability>,
    {
        items
            .into_iter()
            .fold(Cacheability::new(), |acc, item| acc.merge(item))
    }

    pub fn is_cacheable(&self) -> bool {
        self.max_age != MaxAge::Uncacheable
    }

    /// Space-separated tags, as sent in an `X-Cache-Tags` header.
    pub fn tags_header(&self) -> String {
        self.tags.iter().cloned().collect::<Vec<_>>().join(" ")
    }

    /// Space-separated contexts, as sent in an `X-Cache-Contexts` header.
    pub fn contexts_header(&self) -> String {
        self.contexts.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

impl fmt::Display for Cacheability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tags=[{}] contexts=[{}] max_age={:?}",
            self.tags_header(),
            self.contexts_header(),
            self.max_age
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
