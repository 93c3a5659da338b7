//! Tessera Query Parameters
//!
//! Raw query strings are decoded with `url::form_urlencoded` and folded into
//! a bracket-nested JSON tree (`filter[a][value][]=x` becomes
//! `{"filter": {"a": {"value": ["x"]}}}`). The JSON:API parameters are then
//! compiled into a `QueryParams` value. Path resolution against resource
//! descriptors is a separate step because it needs the registry.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::filter::{parse_filter, Conjunction, FilterGroupNode};
use crate::include::IncludeTree;
use crate::page::OffsetPage;
use crate::path::FieldPathResolver;
use crate::sort::{parse_sort, resolve_sort, SortKey};
use crate::tree::{compile, ROOT_GROUP_ID};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};
use tessera_common::{ApiConfig, Result, TesseraError};
use tessera_resource::{DescriptorRegistry, ResourceDescriptor};

/// Parameter names this implementation understands.
const KNOWN_PARAMETERS: &[&str] = &["filter", "sort", "page", "include", "fields"];

/// All-lowercase names are reserved for JSON:API itself.
fn is_reserved_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z]+$").ok())
        .as_ref()
        .map(|pattern| pattern.is_match(name))
        .unwrap_or(false)
}

// =============================================================================
// Bracket Parsing
// =============================================================================

/// Decode a query string into a bracket-nested JSON object.
pub fn parse_query_tree(raw: &str) -> JsonValue {
    let mut root = JsonValue::Object(Map::new());
    for (key, value) in url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes()) {
        let segments = split_key(&key);
        insert(&mut root, &segments, JsonValue::String(value.into_owned()));
    }
    root
}

fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if !key.ends_with(']') {
        return vec![key.to_string()];
    }

    let mut segments = vec![key[..open].to_string()];
    let inner = &key[open + 1..key.len() - 1];
    segments.extend(inner.split("][").map(str::to_string));
    segments
}

fn insert(node: &mut JsonValue, segments: &[String], value: JsonValue) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if head.is_empty() {
        if !node.is_array() {
            *node = JsonValue::Array(Vec::new());
        }
        if let JsonValue::Array(items) = node {
            let mut slot = JsonValue::Null;
            insert(&mut slot, rest, value);
            items.push(slot);
        }
        return;
    }

    if !node.is_object() {
        *node = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(JsonValue::Null);
        insert(child, rest, value);
    }
}

// =============================================================================
// Sparse Fieldsets
// =============================================================================

/// Per-type attribute allow-lists from `fields[<type>]=a,b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseFieldsets {
    by_type: BTreeMap<String, BTreeSet<String>>,
}

impl SparseFieldsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, public_type: impl Into<String>, fields: &[&str]) -> Self {
        self.by_type.insert(
            public_type.into(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    fn parse(param: &JsonValue) -> Result<Self> {
        let obj = param.as_object().ok_or_else(|| {
            TesseraError::Parse("The fields parameter must be keyed by resource type.".to_string())
        })?;
        let mut by_type = BTreeMap::new();
        for (public_type, list) in obj {
            let list = list.as_str().ok_or_else(|| {
                TesseraError::Parse(format!(
                    "The fieldset for `{}` must be a comma-separated string.",
                    public_type
                ))
            })?;
            let fields = list
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            by_type.insert(public_type.clone(), fields);
        }
        Ok(Self { by_type })
    }

    /// Requested attribute set for a type, if one was supplied.
    pub fn get(&self, public_type: &str) -> Option<&BTreeSet<String>> {
        self.by_type.get(public_type)
    }

    /// Whether an attribute of `public_type` should be serialized.
    pub fn allows(&self, public_type: &str, public_field: &str) -> bool {
        self.get(public_type)
            .map(|set| set.contains(public_field))
            .unwrap_or(true)
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Compiled JSON:API query parameters of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub filter: FilterGroupNode,
    pub sort: Vec<SortKey>,
    pub page: OffsetPage,
    pub include: IncludeTree,
    pub fields: SparseFieldsets,
}

impl QueryParams {
    /// Defaults for a request without query parameters.
    pub fn empty(config: &ApiConfig) -> Self {
        Self {
            filter: FilterGroupNode::new(ROOT_GROUP_ID, Conjunction::And, None),
            sort: Vec::new(),
            page: OffsetPage::new(0, config.default_page_size, config.max_page_size),
            include: IncludeTree::new(),
            fields: SparseFieldsets::new(),
        }
    }

    /// Parse and compile a raw query string. Fails fast on syntax errors.
    pub fn parse(raw: Option<&str>, config: &ApiConfig) -> Result<Self> {
        let tree = parse_query_tree(raw.unwrap_or(""));
        let JsonValue::Object(params) = tree else {
            return Ok(Self::empty(config));
        };

        if let Some(name) = params
            .keys()
            .find(|k| is_reserved_name(k) && !KNOWN_PARAMETERS.contains(&k.as_str()))
        {
            return Err(TesseraError::Parse(format!(
                "The query parameter `{}` is reserved and not supported.",
                name
            )));
        }

        let filter = match params.get("filter") {
            Some(param) => compile(parse_filter(param)?)?,
            None => FilterGroupNode::new(ROOT_GROUP_ID, Conjunction::And, None),
        };

        let sort = match params.get("sort") {
            Some(JsonValue::String(raw)) => parse_sort(raw)?,
            Some(_) => {
                return Err(TesseraError::Parse(
                    "The sort parameter must be a comma-separated string.".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let page = OffsetPage::parse(params.get("page"), config.default_page_size, config.max_page_size)?;

        let include = match params.get("include") {
            Some(JsonValue::String(raw)) => IncludeTree::parse(raw)?,
            Some(_) => {
                return Err(TesseraError::Parse(
                    "The include parameter must be a comma-separated string.".to_string(),
                ))
            }
            None => IncludeTree::new(),
        };

        let fields = match params.get("fields") {
            Some(param) => SparseFieldsets::parse(param)?,
            None => SparseFieldsets::new(),
        };

        tracing::debug!(
            conditions = filter.conditions().len(),
            sort_keys = sort.len(),
            offset = page.offset,
            size = page.size,
            "parsed query parameters"
        );

        Ok(Self {
            filter,
            sort,
            page,
            include,
            fields,
        })
    }

    /// Resolve filter and sort paths and validate includes for `root`.
    pub fn resolve(&mut self, registry: &DescriptorRegistry, root: &Arc<ResourceDescriptor>) -> Result<()> {
        let resolver = FieldPathResolver::new(registry);
        self.filter.resolve_paths(&resolver, root)?;
        resolve_sort(&mut self.sort, &resolver, root)?;
        self.include.validate(registry, root)
    }
}

// =============================================================================
// Tests
// =============================================================================
