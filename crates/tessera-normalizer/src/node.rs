//! Tessera Value Nodes
//!
//! The closed set of node variants a document is assembled from. Nodes are
//! built once per request, carry their merged cacheability, and are only
//! turned into plain JSON when the whole tree is known.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::document::DocumentNode;
use crate::link::Link;
use serde_json::{json, Map, Value as JsonValue};
use tessera_common::Cacheability;

// =============================================================================
// Rasterize
// =============================================================================

/// Terminal conversion of a node into its wire representation.
pub trait Rasterize {
    fn rasterize(&self) -> JsonValue;

    /// Merged cacheability of the node and everything below it.
    fn cacheability(&self) -> &Cacheability;
}

/// Render a link map as `{"self": {"href": ...}}`.
pub fn rasterize_links<'a, I>(links: I) -> JsonValue
where
    I: IntoIterator<Item = (&'a str, &'a Link)>,
{
    let map: Map<String, JsonValue> = links
        .into_iter()
        .map(|(name, link)| (name.to_string(), json!({ "href": link.href })))
        .collect();
    JsonValue::Object(map)
}

// =============================================================================
// Resource Identifier
// =============================================================================

/// The `{type, id}` pair a relationship points at.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceIdentifier {
    pub resource_type: String,
    pub id: String,
    pub meta: Option<Map<String, JsonValue>>,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            meta: None,
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.resource_type, &self.id)
    }

    pub fn rasterize(&self) -> JsonValue {
        let mut obj = Map::new();
        obj.insert("type".to_string(), JsonValue::String(self.resource_type.clone()));
        obj.insert("id".to_string(), JsonValue::String(self.id.clone()));
        if let Some(meta) = &self.meta {
            obj.insert("meta".to_string(), JsonValue::Object(meta.clone()));
        }
        JsonValue::Object(obj)
    }
}

// =============================================================================
// Field Nodes
// =============================================================================

/// One value slot of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldItemNode {
    Value(JsonValue),
    Identifier(ResourceIdentifier),
}

impl FieldItemNode {
    fn rasterize(&self) -> JsonValue {
        match self {
            FieldItemNode::Value(v) => v.clone(),
            FieldItemNode::Identifier(ident) => ident.rasterize(),
        }
    }
}

/// Ordered values of one field plus its cacheability.
///
/// A single-valued field never holds more than one item.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub multiple: bool,
    items: Vec<FieldItemNode>,
    cacheability: Cacheability,
}

impl FieldNode {
    pub fn new(
        name: impl Into<String>,
        multiple: bool,
        mut items: Vec<FieldItemNode>,
        cacheability: Cacheability,
    ) -> Self {
        if !multiple {
            items.truncate(1);
        }
        Self {
            name: name.into(),
            multiple,
            items,
            cacheability,
        }
    }

    /// A field whose read was denied: no items, decision cacheability kept.
    pub fn denied(name: impl Into<String>, multiple: bool, cacheability: Cacheability) -> Self {
        Self::new(name, multiple, Vec::new(), cacheability)
    }

    pub fn items(&self) -> &[FieldItemNode] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &ResourceIdentifier> {
        self.items.iter().filter_map(|item| match item {
            FieldItemNode::Identifier(ident) => Some(ident),
            FieldItemNode::Value(_) => None,
        })
    }
}

impl Rasterize for FieldNode {
    /// Cardinality rule: one → value or `null`, many → array, never `null`.
    fn rasterize(&self) -> JsonValue {
        if self.multiple {
            JsonValue::Array(self.items.iter().map(FieldItemNode::rasterize).collect())
        } else {
            self.items
                .first()
                .map(FieldItemNode::rasterize)
                .unwrap_or(JsonValue::Null)
        }
    }

    fn cacheability(&self) -> &Cacheability {
        &self.cacheability
    }
}

/// A relationship field: identifiers, links and an optional nested document
/// holding the targets when the relationship was requested for inclusion.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipNode {
    pub field: FieldNode,
    pub links: Vec<(String, Link)>,
    pub included: Option<Box<DocumentNode>>,
    cacheability: Cacheability,
}

impl RelationshipNode {
    pub fn new(field: FieldNode, links: Vec<(String, Link)>, included: Option<DocumentNode>) -> Self {
        let mut cacheability = field.cacheability().clone();
        for (_, link) in &links {
            cacheability = cacheability.merge(&link.cacheability);
        }
        if let Some(doc) = &included {
            cacheability = cacheability.merge(doc.cacheability());
        }
        Self {
            field,
            links,
            included: included.map(Box::new),
            cacheability,
        }
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }
}

impl Rasterize for RelationshipNode {
    fn rasterize(&self) -> JsonValue {
        let mut obj = Map::new();
        obj.insert("data".to_string(), self.field.rasterize());
        if !self.links.is_empty() {
            obj.insert(
                "links".to_string(),
                rasterize_links(self.links.iter().map(|(k, l)| (k.as_str(), l))),
            );
        }
        JsonValue::Object(obj)
    }

    fn cacheability(&self) -> &Cacheability {
        &self.cacheability
    }
}

// =============================================================================
// Resource Node
// =============================================================================

/// A field of a resource, serialized under `attributes` or `relationships`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEntry {
    Attribute(FieldNode),
    Relationship(RelationshipNode),
}

impl FieldEntry {
    pub fn name(&self) -> &str {
        match self {
            FieldEntry::Attribute(f) => &f.name,
            FieldEntry::Relationship(r) => r.name(),
        }
    }

    pub fn cacheability(&self) -> &Cacheability {
        match self {
            FieldEntry::Attribute(f) => f.cacheability(),
            FieldEntry::Relationship(r) => r.cacheability(),
        }
    }
}

/// Whether a resource shows all fields or only its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Full,
    LabelOnly,
}

/// One serialized content item.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub identifier: ResourceIdentifier,
    pub projection: Projection,
    fields: Vec<FieldEntry>,
    self_link: Option<Link>,
    cacheability: Cacheability,
}

impl ResourceNode {
    /// Build a node; its cacheability is the fold of `own` with every child.
    pub fn new(
        identifier: ResourceIdentifier,
        projection: Projection,
        fields: Vec<FieldEntry>,
        self_link: Option<Link>,
        own: Cacheability,
    ) -> Self {
        let mut cacheability = own;
        for field in &fields {
            cacheability = cacheability.merge(field.cacheability());
        }
        if let Some(link) = &self_link {
            cacheability = cacheability.merge(&link.cacheability);
        }
        Self {
            identifier,
            projection,
            fields,
            self_link,
            cacheability,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.identifier.resource_type
    }

    pub fn id(&self) -> &str {
        &self.identifier.id
    }

    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    pub fn attribute(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find_map(|f| match f {
            FieldEntry::Attribute(a) if a.name == name => Some(a),
            _ => None,
        })
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipNode> {
        self.fields.iter().find_map(|f| match f {
            FieldEntry::Relationship(r) if r.name() == name => Some(r),
            _ => None,
        })
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipNode> {
        self.fields.iter().filter_map(|f| match f {
            FieldEntry::Relationship(r) => Some(r),
            FieldEntry::Attribute(_) => None,
        })
    }

    pub fn self_link(&self) -> Option<&Link> {
        self.self_link.as_ref()
    }
}

impl Rasterize for ResourceNode {
    fn rasterize(&self) -> JsonValue {
        let mut attributes = Map::new();
        let mut relationships = Map::new();
        for field in &self.fields {
            match field {
                FieldEntry::Attribute(a) => {
                    attributes.insert(a.name.clone(), a.rasterize());
                }
                FieldEntry::Relationship(r) => {
                    relationships.insert(r.name().to_string(), r.rasterize());
                }
            }
        }

        let mut obj = Map::new();
        obj.insert("type".to_string(), JsonValue::String(self.identifier.resource_type.clone()));
        obj.insert("id".to_string(), JsonValue::String(self.identifier.id.clone()));
        if !attributes.is_empty() {
            obj.insert("attributes".to_string(), JsonValue::Object(attributes));
        }
        if !relationships.is_empty() {
            obj.insert("relationships".to_string(), JsonValue::Object(relationships));
        }
        if let Some(link) = &self.self_link {
            obj.insert("links".to_string(), rasterize_links([("self", link)]));
        }
        if self.projection == Projection::LabelOnly {
            obj.insert("meta".to_string(), json!({ "projection": "label" }));
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
