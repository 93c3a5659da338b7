//! Tessera Document Node
//!
//! The top-level artifact of assembly: primary data (a resource, `null`, a
//! collection, a relationship, or errors), links, meta and the merged
//! cacheability of everything below. `included` is not stored; the include
//! collector derives it from the tree when the document is rasterized.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::{ErrorObject, InlineError};
use crate::include::collect;
use crate::link::Link;
use crate::node::{rasterize_links, Rasterize, RelationshipNode, ResourceNode};
use serde_json::{json, Map, Value as JsonValue};
use tessera_common::{Cacheability, TesseraError};

/// JSON:API version advertised in every document.
pub const JSONAPI_VERSION: &str = "1.0";

/// Member of a collection: a resource or an error standing in for one.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Resource(ResourceNode),
    Error(InlineError),
}

impl Entry {
    pub fn cacheability(&self) -> &Cacheability {
        match self {
            Entry::Resource(r) => r.cacheability(),
            Entry::Error(e) => &e.cacheability,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceNode> {
        match self {
            Entry::Resource(r) => Some(r),
            Entry::Error(_) => None,
        }
    }
}

/// What the document's `data` (or `errors`) member holds.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryData {
    Resource(Box<ResourceNode>),
    /// `data: null`, e.g. an empty to-one related resource.
    Null,
    Collection(Vec<Entry>),
    Relationship(Box<RelationshipNode>),
    Errors(Vec<ErrorObject>),
}

/// A complete (or nested) JSON:API document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    pub data: PrimaryData,
    links: Vec<(String, Link)>,
    meta: Map<String, JsonValue>,
    cacheability: Cacheability,
}

impl DocumentNode {
    fn from_data(data: PrimaryData, own: Cacheability) -> Self {
        let cacheability = match &data {
            PrimaryData::Resource(r) => own.merge(r.cacheability()),
            PrimaryData::Collection(entries) => {
                entries.iter().fold(own, |acc, e| acc.merge(e.cacheability()))
            }
            PrimaryData::Relationship(r) => own.merge(r.cacheability()),
            PrimaryData::Null | PrimaryData::Errors(_) => own,
        };
        Self {
            data,
            links: Vec::new(),
            meta: Map::new(),
            cacheability,
        }
    }

    pub fn single(resource: ResourceNode) -> Self {
        Self::from_data(PrimaryData::Resource(Box::new(resource)), Cacheability::new())
    }

    pub fn null(cacheability: Cacheability) -> Self {
        Self::from_data(PrimaryData::Null, cacheability)
    }

    pub fn collection(entries: Vec<Entry>) -> Self {
        Self::from_data(PrimaryData::Collection(entries), Cacheability::new())
    }

    /// Relationship document; the relationship's own links move to the top.
    pub fn relationship(relationship: RelationshipNode) -> Self {
        let links = relationship.links.clone();
        let mut doc = Self::from_data(
            PrimaryData::Relationship(Box::new(relationship)),
            Cacheability::new(),
        );
        for (name, link) in links {
            doc = doc.with_link(name, link);
        }
        doc
    }

    pub fn errors(errors: Vec<ErrorObject>, cacheability: Cacheability) -> Self {
        Self::from_data(PrimaryData::Errors(errors), cacheability)
    }

    /// Error document for a request-level failure.
    pub fn from_error(error: &TesseraError) -> Self {
        let cacheability = match error {
            TesseraError::AccessDenied { cacheability, .. } => cacheability.clone(),
            _ => Cacheability::uncacheable(),
        };
        Self::errors(ErrorObject::from_error(error), cacheability)
    }

    pub fn with_link(mut self, name: impl Into<String>, link: Link) -> Self {
        self.cacheability = self.cacheability.merge(&link.cacheability);
        self.links.push((name.into(), link));
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Fold extra cacheability into the document, e.g. list tags of a query.
    pub fn with_cacheability(mut self, extra: &Cacheability) -> Self {
        self.cacheability = self.cacheability.merge(extra);
        self
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.data, PrimaryData::Collection(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.data, PrimaryData::Errors(_))
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|(n, _)| n == name).map(|(_, l)| l)
    }

    /// Resources of the primary data, in order.
    pub fn resources(&self) -> Vec<&ResourceNode> {
        match &self.data {
            PrimaryData::Resource(r) => vec![r.as_ref()],
            PrimaryData::Collection(entries) => entries.iter().filter_map(Entry::as_resource).collect(),
            _ => Vec::new(),
        }
    }

    /// Inline errors of the primary data.
    pub fn inline_errors(&self) -> Vec<&InlineError> {
        match &self.data {
            PrimaryData::Collection(entries) => entries
                .iter()
                .filter_map(|e| match e {
                    Entry::Error(err) => Some(err),
                    Entry::Resource(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Status an HTTP layer should answer with for this document.
    pub fn status_hint(&self) -> u16 {
        match &self.data {
            PrimaryData::Errors(errors) => errors.first().map(|e| e.status).unwrap_or(500),
            _ => 200,
        }
    }
}

impl Rasterize for DocumentNode {
    fn rasterize(&self) -> JsonValue {
        let mut obj = Map::new();
        obj.insert("jsonapi".to_string(), json!({ "version": JSONAPI_VERSION }));

        match &self.data {
            PrimaryData::Errors(errors) => {
                obj.insert(
                    "errors".to_string(),
                    JsonValue::Array(errors.iter().map(ErrorObject::rasterize).collect()),
                );
            }
            PrimaryData::Resource(r) => {
                obj.insert("data".to_string(), r.rasterize());
            }
            PrimaryData::Null => {
                obj.insert("data".to_string(), JsonValue::Null);
            }
            PrimaryData::Collection(entries) => {
                obj.insert(
                    "data".to_string(),
                    JsonValue::Array(
                        entries
                            .iter()
                            .filter_map(Entry::as_resource)
                            .map(ResourceNode::rasterize)
                            .collect(),
                    ),
                );
            }
            PrimaryData::Relationship(r) => {
                obj.insert("data".to_string(), r.field.rasterize());
            }
        }

        let collected = collect(self);
        if !collected.resources.is_empty() {
            obj.insert(
                "included".to_string(),
                JsonValue::Array(collected.resources.iter().map(|r| r.rasterize()).collect()),
            );
        }

        if !self.links.is_empty() {
            obj.insert(
                "links".to_string(),
                rasterize_links(self.links.iter().map(|(k, l)| (k.as_str(), l))),
            );
        }

        let mut meta = self.meta.clone();
        let inline: Vec<JsonValue> = self
            .inline_errors()
            .into_iter()
            .chain(collected.errors)
            .map(|e| e.error.rasterize())
            .collect();
        if !inline.is_empty() {
            meta.insert("errors".to_string(), JsonValue::Array(inline));
        }
        if !meta.is_empty() {
            obj.insert("meta".to_string(), JsonValue::Object(meta));
        }

        JsonValue::Object(obj)
    }

    fn cacheability(&self) -> &Cacheability {
        &self.cacheability
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Projection, ResourceIdentifier};
    use tessera_common::MaxAge;

    fn resource(id: &str, tag: &str) -> ResourceNode {
        ResourceNode::new(
            ResourceIdentifier::new("node--article", id),
            Projection::Full,
            Vec::new(),
            None,
            Cacheability::new().with_tag(tag),
        )
    }

    #[test]
    fn test_collection_document() {
        let denied = InlineError::new(
            ErrorObject::inaccessible(ResourceIdentifier::new("node--article", "a2"), None),
            Cacheability::new().with_context("user.roles").with_max_age(MaxAge::Seconds(60)),
        );
        let doc = DocumentNode::collection(vec![
            Entry::Resource(resource("a1", "node:a1")),
            Entry::Error(denied),
        ]);

        let json = doc.rasterize();
        assert_eq!(json["jsonapi"]["version"], "1.0");
        assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["meta"]["errors"][0]["status"], "403");
        assert!(json.get("included").is_none());

        let cache = doc.cacheability();
        assert!(cache.tags.contains("node:a1"));
        assert!(cache.contexts.contains("user.roles"));
        assert_eq!(cache.max_age, MaxAge::Seconds(60));
    }

    #[test]
    fn test_error_document() {
        let doc = DocumentNode::from_error(&TesseraError::NotFound("gone".to_string()));
        let json = doc.rasterize();
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["status"], "404");
        assert_eq!(doc.status_hint(), 404);
        assert!(!doc.cacheability().is_cacheable());
    }

    #[test]
    fn test_null_and_links() {
        let link = Link::new("http://x/jsonapi", Cacheability::new().with_context("url.site"));
        let doc = DocumentNode::null(Cacheability::new()).with_link("self", link);
        let json = doc.rasterize();
        assert_eq!(json["data"], JsonValue::Null);
        assert_eq!(json["links"]["self"]["href"], "http://x/jsonapi");
        assert!(doc.cacheability().contexts.contains("url.site"));
    }
}
