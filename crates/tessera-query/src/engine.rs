//! Tessera Query Engine
//!
//! The query-engine collaborator receives the compiled predicate tree, the
//! sort keys and the range, and returns matching identifiers. `MemoryQuery`
//! evaluates everything against a `ContentStore`, following reference
//! traversal steps by loading the targets.
//!
//! Matching semantics:
//! - a clause holds when any value collected along the path satisfies it
//! - negated operators (`<>`, `NOT IN`, `NOT BETWEEN`) hold when no value
//!   satisfies the positive form
//! - all clauses of a condition must hold
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::filter::{Clause, Conjunction, FilterConditionNode, FilterGroupNode, FilterNode, Operator};
use crate::path::{FieldPathResolver, PathSegment, ResolvedPath, SegmentKind};
use crate::sort::SortKey;
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;
use tessera_common::Result;
use tessera_resource::{ContentItem, ContentStore, DescriptorRegistry, FieldItem, ResourceDescriptor};

// =============================================================================
// Query Engine Trait
// =============================================================================

/// Executes compiled query parameters against storage.
pub trait QueryEngine {
    fn apply_condition(&mut self, tree: &FilterGroupNode);

    /// Keys apply left to right as successive tie-breakers.
    fn apply_sort(&mut self, keys: &[SortKey]);

    fn apply_range(&mut self, offset: usize, limit: usize);

    /// Matching identifiers in result order.
    fn execute(&self) -> Result<Vec<String>>;
}

// =============================================================================
// Memory Query
// =============================================================================

/// Query over every item of one resource subtype in a content store.
pub struct MemoryQuery<'a> {
    store: &'a dyn ContentStore,
    registry: &'a DescriptorRegistry,
    descriptor: Arc<ResourceDescriptor>,
    condition: Option<FilterGroupNode>,
    sort: Vec<SortKey>,
    range: Option<(usize, usize)>,
}

impl<'a> MemoryQuery<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        registry: &'a DescriptorRegistry,
        descriptor: Arc<ResourceDescriptor>,
    ) -> Self {
        Self {
            store,
            registry,
            descriptor,
            condition: None,
            sort: Vec::new(),
            range: None,
        }
    }

    fn resolved<'p>(&self, path: &str, resolved: &'p Option<ResolvedPath>) -> Result<Cow<'p, ResolvedPath>> {
        match resolved {
            Some(resolved) => Ok(Cow::Borrowed(resolved)),
            None => FieldPathResolver::new(self.registry)
                .resolve(&self.descriptor, path)
                .map(Cow::Owned),
        }
    }

    /// Values reached by walking `path` from `item`.
    fn collect(&self, item: &ContentItem, path: &ResolvedPath) -> Result<Vec<JsonValue>> {
        let mut current = vec![item.clone()];
        let mut values = Vec::new();

        for segment in &path.segments {
            match segment.kind {
                SegmentKind::Reference => {
                    let mut next = Vec::new();
                    for item in &current {
                        let Some(field) = self.internal_for(segment, item) else {
                            continue;
                        };
                        for target in item.references(&field) {
                            match self.store.load(&target.entity_type, &target.id)? {
                                Some(loaded) => next.push(loaded),
                                None => tracing::warn!(
                                    entity_type = %target.entity_type,
                                    id = %target.id,
                                    "skipping missing reference target"
                                ),
                            }
                        }
                    }
                    current = next;
                }
                SegmentKind::Field => {
                    for item in &current {
                        let Some(field) = self.internal_for(segment, item) else {
                            continue;
                        };
                        for value in item.get(&field) {
                            match value {
                                FieldItem::Value(v) => values.push(v.clone()),
                                FieldItem::Reference { target, .. } => {
                                    values.push(JsonValue::String(target.id.clone()))
                                }
                            }
                        }
                    }
                }
                SegmentKind::Id => {
                    values.extend(current.iter().map(|i| JsonValue::String(i.id.clone())));
                }
            }
        }
        Ok(values)
    }

    /// Internal field name of `segment` on the subtype of `item`.
    fn internal_for(&self, segment: &PathSegment, item: &ContentItem) -> Option<String> {
        let descriptor = self.registry.for_item(item)?;
        segment.internal_for(descriptor.public_type()).map(str::to_string)
    }

    fn group_matches(&self, group: &FilterGroupNode, item: &ContentItem) -> Result<bool> {
        if group.children.is_empty() {
            return Ok(true);
        }
        for child in &group.children {
            let matched = match child {
                FilterNode::Condition(condition) => self.condition_matches(condition, item)?,
                FilterNode::Group(group) => self.group_matches(group, item)?,
            };
            match (group.conjunction, matched) {
                (Conjunction::And, false) => return Ok(false),
                (Conjunction::Or, true) => return Ok(true),
                _ => {}
            }
        }
        Ok(group.conjunction == Conjunction::And)
    }

    fn condition_matches(&self, condition: &FilterConditionNode, item: &ContentItem) -> Result<bool> {
        let path = self.resolved(&condition.path, &condition.resolved)?;
        let collected = self.collect(item, &path)?;
        Ok(condition
            .clauses()
            .iter()
            .all(|clause| clause_matches(clause, &collected)))
    }

    fn sort_values(&self, item: &ContentItem) -> Result<Vec<Option<JsonValue>>> {
        self.sort
            .iter()
            .map(|key| {
                let path = self.resolved(&key.path, &key.resolved)?;
                Ok(self.collect(item, &path)?.into_iter().next())
            })
            .collect()
    }
}

impl QueryEngine for MemoryQuery<'_> {
    fn apply_condition(&mut self, tree: &FilterGroupNode) {
        self.condition = Some(tree.clone());
    }

    fn apply_sort(&mut self, keys: &[SortKey]) {
        self.sort.extend_from_slice(keys);
    }

    fn apply_range(&mut self, offset: usize, limit: usize) {
        self.range = Some((offset, limit));
    }

    fn execute(&self) -> Result<Vec<String>> {
        let items = self
            .store
            .scan(self.descriptor.entity_type(), self.descriptor.subtype())?;

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let keep = match &self.condition {
                Some(tree) => self.group_matches(tree, &item)?,
                None => true,
            };
            if keep {
                let keys = self.sort_values(&item)?;
                rows.push((item.id, keys));
            }
        }

        if !self.sort.is_empty() {
            rows.sort_by(|(_, a), (_, b)| {
                for ((left, right), key) in a.iter().zip(b.iter()).zip(self.sort.iter()) {
                    let ordering = compare_optional(left.as_ref(), right.as_ref());
                    let ordering = if key.is_descending() { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let ids = rows.into_iter().map(|(id, _)| id);
        let ids: Vec<String> = match self.range {
            Some((offset, limit)) => ids.skip(offset).take(limit).collect(),
            None => ids.collect(),
        };

        tracing::debug!(
            resource_type = %self.descriptor.public_type(),
            matched = ids.len(),
            "executed memory query"
        );
        Ok(ids)
    }
}

// =============================================================================
// Value Comparison
// =============================================================================

fn clause_matches(clause: &Clause<'_>, collected: &[JsonValue]) -> bool {
    let any = |pred: &dyn Fn(&JsonValue) -> bool| collected.iter().any(|v| pred(v));
    let expected = clause.values;

    match clause.operator {
        Operator::Eq => any(&|v| expected.iter().any(|e| values_equal(v, e))),
        Operator::NotEq => !any(&|v| expected.iter().any(|e| values_equal(v, e))),
        Operator::Gt => any(&|v| ordered(v, expected, |o| o == Ordering::Greater)),
        Operator::Gte => any(&|v| ordered(v, expected, |o| o != Ordering::Less)),
        Operator::Lt => any(&|v| ordered(v, expected, |o| o == Ordering::Less)),
        Operator::Lte => any(&|v| ordered(v, expected, |o| o != Ordering::Greater)),
        Operator::StartsWith => any(&|v| text_match(v, expected, |h, n| h.starts_with(n))),
        Operator::Contains => any(&|v| text_match(v, expected, |h, n| h.contains(n))),
        Operator::EndsWith => any(&|v| text_match(v, expected, |h, n| h.ends_with(n))),
        Operator::In => any(&|v| expected.iter().any(|e| values_equal(v, e))),
        Operator::NotIn => !any(&|v| expected.iter().any(|e| values_equal(v, e))),
        Operator::Between => any(&|v| between(v, expected)),
        Operator::NotBetween => !any(&|v| between(v, expected)),
        Operator::IsNull => collected.iter().all(JsonValue::is_null),
        Operator::IsNotNull => collected.iter().any(|v| !v.is_null()),
    }
}

fn ordered(value: &JsonValue, expected: &[JsonValue], accept: impl Fn(Ordering) -> bool) -> bool {
    expected
        .first()
        .and_then(|e| compare_values(value, e))
        .map(accept)
        .unwrap_or(false)
}

fn between(value: &JsonValue, bounds: &[JsonValue]) -> bool {
    match bounds {
        [low, high] => {
            matches!(compare_values(value, low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_values(value, high), Some(Ordering::Less | Ordering::Equal))
        }
        _ => false,
    }
}

fn text_match(value: &JsonValue, expected: &[JsonValue], test: impl Fn(&str, &str) -> bool) -> bool {
    let haystack = as_text(value).to_lowercase();
    expected
        .first()
        .map(|needle| test(&haystack, &as_text(needle).to_lowercase()))
        .unwrap_or(false)
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// Type-aware comparison. Query values arrive as strings, so strings are
/// coerced toward the stored value's type when they parse.
fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (JsonValue::Number(a), JsonValue::String(b)) => a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?),
        (JsonValue::String(a), JsonValue::Number(b)) => a.trim().parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::String(b)) => Some(a.cmp(&parse_bool(b)?)),
        (JsonValue::String(a), JsonValue::Bool(b)) => Some(parse_bool(a)?.cmp(b)),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Missing values sort before present ones.
fn compare_optional(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| as_text(a).cmp(&as_text(b))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::QueryParams;
    use tessera_common::ApiConfig;
    use tessera_resource::{FieldDefinition, MemoryStore, ResourceDefinition};

    fn fixture() -> (DescriptorRegistry, MemoryStore) {
        let registry = DescriptorRegistry::new(vec![
            ResourceDefinition::new("node", "article")
                .field(FieldDefinition::attribute("title"))
                .field(FieldDefinition::attribute("rank"))
                .field(FieldDefinition::attribute("status"))
                .field(FieldDefinition::relationship("uid", ["user--user"]).alias("author")),
            ResourceDefinition::new("user", "user").field(FieldDefinition::attribute("name")),
        ])
        .unwrap();

        let store = MemoryStore::with_items(vec![
            ContentItem::new("user", "user", "u1").with_value("name", "Ada"),
            ContentItem::new("user", "user", "u2").with_value("name", "Grace"),
            ContentItem::new("node", "article", "a1")
                .with_value("title", "Rust basics")
                .with_value("rank", 3)
                .with_value("status", true)
                .with_reference("uid", "user", "u1"),
            ContentItem::new("node", "article", "a2")
                .with_value("title", "Advanced Rust")
                .with_value("rank", 1)
                .with_value("status", false)
                .with_reference("uid", "user", "u2"),
            ContentItem::new("node", "article", "a3")
                .with_value("title", "Cooking")
                .with_value("rank", 2)
                .with_value("status", true)
                .with_reference("uid", "user", "u1"),
        ])
        .unwrap();
        (registry, store)
    }

    fn run(query: &str) -> Vec<String> {
        let (registry, store) = fixture();
        let article = registry.by_public_type("node--article").unwrap();
        let mut params = QueryParams::parse(Some(query), &ApiConfig::default()).unwrap();
        params.resolve(&registry, &article).unwrap();

        let mut engine = MemoryQuery::new(&store, &registry, article);
        engine.apply_condition(&params.filter);
        engine.apply_sort(&params.sort);
        engine.apply_range(params.page.offset, params.page.query_limit());
        engine.execute().unwrap()
    }

    #[test]
    fn test_no_filter_keeps_storage_order() {
        assert_eq!(run(""), vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn test_shorthand_and_type_coercion() {
        assert_eq!(run("filter[status]=1"), vec!["a1", "a3"]);
        assert_eq!(run("filter[rank][path]=rank&filter[rank][operator]=>=&filter[rank][value]=2"), vec!["a1", "a3"]);
    }

    #[test]
    fn test_nested_path_filter() {
        assert_eq!(run("filter[who][path]=author.name&filter[who][value]=Grace"), vec!["a2"]);
        assert_eq!(run("filter[who][path]=author.id&filter[who][value]=u1"), vec!["a1", "a3"]);
    }

    #[test]
    fn test_or_group() {
        let query = "filter[g][group][conjunction]=OR\
                     &filter[a][path]=title&filter[a][operator]=CONTAINS&filter[a][value]=cook&filter[a][group]=g\
                     &filter[b][path]=rank&filter[b][value]=1&filter[b][group]=g";
        assert_eq!(run(query), vec!["a2", "a3"]);
    }

    #[test]
    fn test_multi_value_operators() {
        assert_eq!(
            run("filter[r][path]=rank&filter[r][operator]=IN&filter[r][value][]=1&filter[r][value][]=3"),
            vec!["a1", "a2"]
        );
        assert_eq!(
            run("filter[r][path]=rank&filter[r][operator]=NOT BETWEEN&filter[r][value][]=1&filter[r][value][]=2"),
            vec!["a1"]
        );
        assert_eq!(run("filter[t][path]=title&filter[t][operator]=IS NULL"), Vec::<String>::new());
    }

    #[test]
    fn test_multi_key_sort() {
        assert_eq!(run("sort=-rank"), vec!["a1", "a3", "a2"]);
        assert_eq!(run("sort=author.name,-title"), vec!["a1", "a3", "a2"]);
        assert_eq!(run("sort=title"), vec!["a2", "a3", "a1"]);
    }

    #[test]
    fn test_range_requests_extra_row() {
        assert_eq!(run("page[size]=2"), vec!["a1", "a2", "a3"]);
        assert_eq!(run("page[size]=1&page[offset]=2"), vec!["a3"]);
    }
}
