//! Tessera Filter Expressions
//!
//! Filter descriptors as they arrive from the query string, operator/value
//! reconciliation, and the condition and group nodes the tree compiler
//! assembles into a predicate tree.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::path::{FieldPathResolver, ResolvedPath};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tessera_resource::ResourceDescriptor;

// =============================================================================
// Operators
// =============================================================================

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    Contains,
    EndsWith,
    In,
    NotIn,
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::StartsWith => "STARTS_WITH",
            Operator::Contains => "CONTAINS",
            Operator::EndsWith => "ENDS_WITH",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Operators applied to the whole value array at once.
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::Between | Operator::NotBetween
        )
    }

    /// Operators that take no value.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

impl FromStr for Operator {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" => Operator::Eq,
            "<>" | "!=" => Operator::NotEq,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "STARTS_WITH" => Operator::StartsWith,
            "CONTAINS" => Operator::Contains,
            "ENDS_WITH" => Operator::EndsWith,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "BETWEEN" => Operator::Between,
            "NOT BETWEEN" => Operator::NotBetween,
            "IS NULL" => Operator::IsNull,
            "IS NOT NULL" => Operator::IsNotNull,
            _ => {
                return Err(TesseraError::Parse(format!(
                    "The operator `{}` is not supported.",
                    s
                )))
            }
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the children of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl FromStr for Conjunction {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Conjunction::And),
            "OR" => Ok(Conjunction::Or),
            _ => Err(TesseraError::Parse(format!(
                "The conjunction `{}` is not supported. Use AND or OR.",
                s
            ))),
        }
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// A condition as supplied by the client, before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionDescriptor {
    pub path: String,
    pub operators: Vec<Operator>,
    pub values: Vec<JsonValue>,
    pub member_of: Option<String>,
}

impl ConditionDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operators: Vec::new(),
            values: Vec::new(),
            member_of: None,
        }
    }

    pub fn operator(mut self, op: Operator) -> Self {
        self.operators.push(op);
        self
    }

    pub fn value(mut self, value: impl Into<JsonValue>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn member_of(mut self, group: impl Into<String>) -> Self {
        self.member_of = Some(group.into());
        self
    }

    /// Line operators up with values.
    ///
    /// No operator means `=` for every value. A leading multi-value or
    /// unary operator is kept alone and applies to the whole array; any
    /// other operator list is padded with `=` or cut to the value count.
    pub fn reconcile(&self, id: &str) -> Result<(Vec<Operator>, Vec<JsonValue>)> {
        let values = self.values.clone();

        let Some(first) = self.operators.first().copied() else {
            if values.is_empty() {
                return Err(missing_value(id));
            }
            return Ok((vec![Operator::Eq; values.len()], values));
        };

        if first.is_unary() {
            if !values.is_empty() {
                return Err(TesseraError::Parse(format!(
                    "The filter condition `{}` uses `{}` which takes no value.",
                    id, first
                )));
            }
            return Ok((vec![first], values));
        }

        if values.is_empty() {
            return Err(missing_value(id));
        }

        if first.is_multi_value() {
            if matches!(first, Operator::Between | Operator::NotBetween) && values.len() != 2 {
                return Err(TesseraError::Parse(format!(
                    "The filter condition `{}` uses `{}` which requires exactly 2 values.",
                    id, first
                )));
            }
            return Ok((vec![first], values));
        }

        if let Some(op) = self
            .operators
            .iter()
            .find(|op| op.is_multi_value() || op.is_unary())
        {
            return Err(TesseraError::Parse(format!(
                "The filter condition `{}` can only use `{}` as its first operator.",
                id, op
            )));
        }

        let mut operators: Vec<Operator> = self.operators.iter().copied().take(values.len()).collect();
        operators.resize(values.len(), Operator::Eq);
        Ok((operators, values))
    }
}

fn missing_value(id: &str) -> TesseraError {
    TesseraError::Parse(format!("The filter condition `{}` requires a value.", id))
}

/// A group as supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupDescriptor {
    pub conjunction: Conjunction,
    pub member_of: Option<String>,
}

/// One entry of the flat filter map.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDescriptor {
    Condition(ConditionDescriptor),
    Group(GroupDescriptor),
}

impl FilterDescriptor {
    pub fn member_of(&self) -> Option<&str> {
        match self {
            FilterDescriptor::Condition(c) => c.member_of.as_deref(),
            FilterDescriptor::Group(g) => g.member_of.as_deref(),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse the nested `filter` parameter into flat descriptors keyed by id.
///
/// Accepted shapes per id:
/// - `filter[title]=Hello` shorthand condition on `title`
/// - `filter[id][condition][path|operator|value|memberOf]` explicit condition
/// - `filter[id][path|operator|value|group]` flat explicit condition
/// - `filter[id][group][conjunction|group|memberOf]` group
pub fn parse_filter(param: &JsonValue) -> Result<Vec<(String, FilterDescriptor)>> {
    let map = param.as_object().ok_or_else(|| {
        TesseraError::Parse("The filter parameter must be an array of conditions.".to_string())
    })?;

    let mut descriptors = Vec::with_capacity(map.len());
    for (id, entry) in map {
        let descriptor = match entry {
            JsonValue::Object(obj) => parse_entry(id, obj)?,
            JsonValue::Array(_) | JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) => {
                FilterDescriptor::Condition(ConditionDescriptor {
                    path: id.clone(),
                    operators: Vec::new(),
                    values: normalize_values(Some(entry)),
                    member_of: None,
                })
            }
            JsonValue::Null => return Err(missing_value(id)),
        };
        descriptors.push((id.clone(), descriptor));
    }
    Ok(descriptors)
}

fn parse_entry(id: &str, obj: &Map<String, JsonValue>) -> Result<FilterDescriptor> {
    if let Some(JsonValue::Object(group)) = obj.get("group") {
        let conjunction = match group.get("conjunction") {
            Some(JsonValue::String(s)) => s.parse()?,
            Some(_) => {
                return Err(TesseraError::Parse(format!(
                    "The conjunction of filter group `{}` must be a string.",
                    id
                )))
            }
            None => Conjunction::And,
        };
        let member_of = string_member(id, group, "memberOf")?.or(string_member(id, group, "group")?);
        return Ok(FilterDescriptor::Group(GroupDescriptor {
            conjunction,
            member_of,
        }));
    }

    let body = match obj.get("condition") {
        Some(JsonValue::Object(condition)) => condition,
        Some(_) => {
            return Err(TesseraError::Parse(format!(
                "The filter condition `{}` must be an object.",
                id
            )))
        }
        None => obj,
    };

    let path = match body.get("path") {
        Some(JsonValue::String(path)) => path.clone(),
        Some(_) => {
            return Err(TesseraError::Parse(format!(
                "The path of filter condition `{}` must be a string.",
                id
            )))
        }
        None => id.to_string(),
    };

    let operators = match body.get("operator") {
        None => Vec::new(),
        Some(JsonValue::String(op)) => vec![op.parse()?],
        Some(other) => normalize_values(Some(other))
            .iter()
            .map(|op| match op {
                JsonValue::String(op) => op.parse(),
                _ => Err(TesseraError::Parse(format!(
                    "The operator of filter condition `{}` must be a string.",
                    id
                ))),
            })
            .collect::<Result<Vec<Operator>>>()?,
    };

    let member_of = string_member(id, body, "memberOf")?.or(string_member(id, body, "group")?);

    Ok(FilterDescriptor::Condition(ConditionDescriptor {
        path,
        operators,
        values: normalize_values(body.get("value")),
        member_of,
    }))
}

fn string_member(id: &str, obj: &Map<String, JsonValue>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TesseraError::Parse(format!(
            "The `{}` member of filter `{}` must be a string.",
            key, id
        ))),
    }
}

/// Always produce an array. Objects keyed by position (`value[0]`, `value[1]`)
/// keep their numeric order.
fn normalize_values(value: Option<&JsonValue>) -> Vec<JsonValue> {
    match value {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items.clone(),
        Some(JsonValue::Object(obj)) => {
            let mut entries: Vec<(&String, &JsonValue)> = obj.iter().collect();
            entries.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));
            entries.into_iter().map(|(_, v)| v.clone()).collect()
        }
        Some(scalar) => vec![scalar.clone()],
    }
}

// =============================================================================
// Tree Nodes
// =============================================================================

/// One (operator, values) pair evaluated against a condition's field.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause<'a> {
    pub operator: Operator,
    pub values: &'a [JsonValue],
}

/// A reconciled condition placed in the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConditionNode {
    pub id: String,
    pub path: String,
    pub operators: Vec<Operator>,
    pub values: Vec<JsonValue>,
    pub member_of: Option<String>,
    /// Filled by `FilterGroupNode::resolve_paths`.
    pub resolved: Option<ResolvedPath>,
}

impl FilterConditionNode {
    pub fn from_descriptor(id: impl Into<String>, descriptor: &ConditionDescriptor) -> Result<Self> {
        let id = id.into();
        let (operators, values) = descriptor.reconcile(&id)?;
        Ok(Self {
            path: descriptor.path.clone(),
            operators,
            values,
            member_of: descriptor.member_of.clone(),
            resolved: None,
            id,
        })
    }

    /// Clauses that must all hold for the condition to match.
    pub fn clauses(&self) -> Vec<Clause<'_>> {
        match self.operators.as_slice() {
            [op] if op.is_multi_value() || op.is_unary() => vec![Clause {
                operator: *op,
                values: &self.values,
            }],
            ops => ops
                .iter()
                .zip(self.values.iter())
                .map(|(op, value)| Clause {
                    operator: *op,
                    values: std::slice::from_ref(value),
                })
                .collect(),
        }
    }
}

/// A boolean group of conditions and nested groups.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroupNode {
    pub id: String,
    pub conjunction: Conjunction,
    pub member_of: Option<String>,
    pub children: Vec<FilterNode>,
}

impl FilterGroupNode {
    pub fn new(id: impl Into<String>, conjunction: Conjunction, member_of: Option<String>) -> Self {
        Self {
            id: id.into(),
            conjunction,
            member_of,
            children: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first search for a group by id, this group included.
    pub fn find_group_mut(&mut self, id: &str) -> Option<&mut FilterGroupNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| match child {
            FilterNode::Group(group) => group.find_group_mut(id),
            FilterNode::Condition(_) => None,
        })
    }

    /// Every condition in the tree, depth first.
    pub fn conditions(&self) -> Vec<&FilterConditionNode> {
        let mut out = Vec::new();
        for child in &self.children {
            match child {
                FilterNode::Condition(condition) => out.push(condition),
                FilterNode::Group(group) => out.extend(group.conditions()),
            }
        }
        out
    }

    /// Order children by id at every level.
    pub fn sort_children(&mut self) {
        self.children.sort_by(|a, b| a.id().cmp(b.id()));
        for child in &mut self.children {
            if let FilterNode::Group(group) = child {
                group.sort_children();
            }
        }
    }

    /// Resolve every condition path against `root`.
    pub fn resolve_paths(
        &mut self,
        resolver: &FieldPathResolver<'_>,
        root: &Arc<ResourceDescriptor>,
    ) -> Result<()> {
        for child in &mut self.children {
            match child {
                FilterNode::Condition(condition) => {
                    condition.resolved = Some(resolver.resolve(root, &condition.path)?);
                }
                FilterNode::Group(group) => group.resolve_paths(resolver, root)?,
            }
        }
        Ok(())
    }
}

/// A node of the compiled predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Condition(FilterConditionNode),
    Group(FilterGroupNode),
}

impl FilterNode {
    pub fn id(&self) -> &str {
        match self {
            FilterNode::Condition(c) => &c.id,
            FilterNode::Group(g) => &g.id,
        }
    }

    pub fn member_of(&self) -> Option<&str> {
        match self {
            FilterNode::Condition(c) => c.member_of.as_deref(),
            FilterNode::Group(g) => g.member_of.as_deref(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(path: &str) -> ConditionDescriptor {
        ConditionDescriptor::new(path)
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("!=".parse::<Operator>().unwrap(), Operator::NotEq);
        assert_eq!("not in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("IS NULL".parse::<Operator>().unwrap(), Operator::IsNull);
        assert!("LIKE".parse::<Operator>().is_err());
        assert!(Operator::Between.is_multi_value());
        assert!(!Operator::Contains.is_multi_value());
    }

    #[test]
    fn test_default_operator_per_value() {
        let desc = condition("tags").value("a").value("b");
        let (ops, values) = desc.reconcile("c").unwrap();
        assert_eq!(ops, vec![Operator::Eq, Operator::Eq]);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_multi_value_operator_kept_alone() {
        let desc = condition("status")
            .operator(Operator::In)
            .value("draft")
            .value("review")
            .value("published");
        let (ops, values) = desc.reconcile("c").unwrap();
        assert_eq!(ops, vec![Operator::In]);
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_operators_padded_and_truncated() {
        let desc = condition("n").operator(Operator::Gt).value(1).value(5);
        let (ops, _) = desc.reconcile("c").unwrap();
        assert_eq!(ops, vec![Operator::Gt, Operator::Eq]);

        let desc = condition("n")
            .operator(Operator::Gt)
            .operator(Operator::Lt)
            .operator(Operator::NotEq)
            .value(1);
        let (ops, _) = desc.reconcile("c").unwrap();
        assert_eq!(ops, vec![Operator::Gt]);
    }

    #[test]
    fn test_invalid_operator_shapes() {
        let between = condition("n").operator(Operator::Between).value(1);
        assert!(between.reconcile("c").is_err());

        let late_in = condition("n").operator(Operator::Eq).operator(Operator::In).value(1).value(2);
        assert!(late_in.reconcile("c").is_err());

        let null_with_value = condition("n").operator(Operator::IsNull).value(1);
        assert!(null_with_value.reconcile("c").is_err());

        assert!(condition("n").reconcile("c").is_err());
        assert!(condition("n").operator(Operator::IsNotNull).reconcile("c").is_ok());
    }

    #[test]
    fn test_clauses() {
        let node = FilterConditionNode::from_descriptor(
            "c",
            &condition("n").operator(Operator::Gte).operator(Operator::Lte).value(1).value(9),
        )
        .unwrap();
        let clauses = node.clauses();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[1].operator, Operator::Lte);
        assert_eq!(clauses[1].values, &[json!(9)]);

        let node = FilterConditionNode::from_descriptor(
            "c",
            &condition("n").operator(Operator::Between).value(1).value(9),
        )
        .unwrap();
        assert_eq!(node.clauses().len(), 1);
        assert_eq!(node.clauses()[0].values.len(), 2);
    }

    #[test]
    fn test_parse_shorthand_and_explicit() {
        let param = json!({
            "title": "Hello",
            "recent": {
                "condition": {"path": "created", "operator": ">", "value": "2024-01-01", "memberOf": "g"}
            },
            "flat": {"path": "author.name", "value": ["a", "b"], "group": "g"},
            "g": {"group": {"conjunction": "OR"}}
        });
        let parsed = parse_filter(&param).unwrap();
        assert_eq!(parsed.len(), 4);

        let find = |id: &str| parsed.iter().find(|(k, _)| k == id).map(|(_, d)| d.clone()).unwrap();

        match find("title") {
            FilterDescriptor::Condition(c) => {
                assert_eq!(c.path, "title");
                assert_eq!(c.values, vec![json!("Hello")]);
                assert!(c.member_of.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        match find("recent") {
            FilterDescriptor::Condition(c) => {
                assert_eq!(c.operators, vec![Operator::Gt]);
                assert_eq!(c.member_of.as_deref(), Some("g"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(find("flat").member_of(), Some("g"));
        assert_eq!(
            find("g"),
            FilterDescriptor::Group(GroupDescriptor {
                conjunction: Conjunction::Or,
                member_of: None
            })
        );
    }

    #[test]
    fn test_parse_positional_values() {
        let param = json!({"range": {"path": "n", "operator": "BETWEEN", "value": {"1": 9, "0": 1}}});
        let parsed = parse_filter(&param).unwrap();
        match &parsed[0].1 {
            FilterDescriptor::Condition(c) => assert_eq!(c.values, vec![json!(1), json!(9)]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_object_filter_rejected() {
        assert!(parse_filter(&json!("title")).is_err());
        assert!(parse_filter(&json!({"g": {"group": {"conjunction": "XOR"}}})).is_err());
        assert!(parse_filter(&json!({"c": {"path": "n", "operator": "LIKE", "value": 1}})).is_err());
    }
}
