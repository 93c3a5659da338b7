//! Tessera Content Items
//!
//! Stored content: one item per `(entity_type, id)`, holding ordered,
//! possibly multivalued field values keyed by internal field name.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::descriptor::ResourceDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

// =============================================================================
// Item Reference
// =============================================================================

/// Pointer from a reference field to another stored item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub entity_type: String,
    pub id: String,
}

impl ItemRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Field Item
// =============================================================================

/// One stored value slot of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldItem {
    Reference {
        target: ItemRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Map<String, JsonValue>>,
    },
    Value(JsonValue),
}

impl FieldItem {
    pub fn reference(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        FieldItem::Reference {
            target: ItemRef::new(entity_type, id),
            meta: None,
        }
    }

    pub fn as_value(&self) -> Option<&JsonValue> {
        match self {
            FieldItem::Value(v) => Some(v),
            FieldItem::Reference { .. } => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ItemRef> {
        match self {
            FieldItem::Reference { target, .. } => Some(target),
            FieldItem::Value(_) => None,
        }
    }
}

impl From<JsonValue> for FieldItem {
    fn from(value: JsonValue) -> Self {
        FieldItem::Value(value)
    }
}

// =============================================================================
// Content Item
// =============================================================================

/// A stored content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub entity_type: String,
    pub subtype: String,
    pub id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<FieldItem>>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub changed: DateTime<Utc>,
}

impl ContentItem {
    /// Create an empty item.
    pub fn new(
        entity_type: impl Into<String>,
        subtype: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_type: entity_type.into(),
            subtype: subtype.into(),
            id: id.into(),
            fields: BTreeMap::new(),
            created: now,
            changed: now,
        }
    }

    /// Append a scalar or complex value to a field.
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .push(FieldItem::Value(value.into()));
        self
    }

    /// Append a reference to a field.
    pub fn with_reference(
        mut self,
        field: impl Into<String>,
        entity_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .push(FieldItem::reference(entity_type, id));
        self
    }

    /// Stored values of a field, empty if never set.
    pub fn get(&self, field: &str) -> &[FieldItem] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_value(&self, field: &str) -> Option<&JsonValue> {
        self.get(field).iter().find_map(FieldItem::as_value)
    }

    pub fn references(&self, field: &str) -> Vec<&ItemRef> {
        self.get(field)
            .iter()
            .filter_map(FieldItem::as_reference)
            .collect()
    }

    /// Replace every value of a field.
    pub fn set(&mut self, field: impl Into<String>, items: Vec<FieldItem>) {
        self.fields.insert(field.into(), items);
        self.changed = Utc::now();
    }

    /// Label according to the descriptor's label field.
    pub fn label(&self, descriptor: &ResourceDescriptor) -> Option<String> {
        let field = descriptor.label_field()?;
        self.first_value(&field.name).map(|v| match v {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Published flag; items without a `status` field count as published.
    pub fn is_published(&self) -> bool {
        self.first_value("status")
            .and_then(JsonValue::as_bool)
            .unwrap_or(true)
    }

    /// Cache tag invalidated when this item changes.
    pub fn cache_tag(&self) -> String {
        format!("{}:{}", self.entity_type, self.id)
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(&self.entity_type, &self.id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDefinition, ResourceDefinition};
    use serde_json::json;

    #[test]
    fn test_item_values() {
        let item = ContentItem::new("node", "article", "a1")
            .with_value("title", "Hello")
            .with_value("tags_text", "x")
            .with_value("tags_text", "y")
            .with_reference("uid", "user", "u1");

        assert_eq!(item.first_value("title"), Some(&json!("Hello")));
        assert_eq!(item.get("tags_text").len(), 2);
        assert_eq!(item.references("uid"), vec![&ItemRef::new("user", "u1")]);
        assert!(item.get("missing").is_empty());
        assert_eq!(item.cache_tag(), "node:a1");
    }

    #[test]
    fn test_label() {
        let desc = ResourceDescriptor::from_definition(
            &ResourceDefinition::new("node", "article")
                .label("title")
                .field(FieldDefinition::attribute("title")),
        );
        let item = ContentItem::new("node", "article", "a1").with_value("title", "Hello");
        assert_eq!(item.label(&desc), Some("Hello".to_string()));
    }

    #[test]
    fn test_published_flag() {
        let item = ContentItem::new("node", "article", "a1");
        assert!(item.is_published());
        let item = item.with_value("status", false);
        assert!(!item.is_published());
    }

    #[test]
    fn test_field_item_serde() {
        let item: FieldItem = serde_json::from_value(json!({"target": {"entity_type": "user", "id": "u1"}})).unwrap();
        assert_eq!(item.as_reference(), Some(&ItemRef::new("user", "u1")));

        let item: FieldItem = serde_json::from_value(json!("plain")).unwrap();
        assert_eq!(item.as_value(), Some(&json!("plain")));
    }
}
