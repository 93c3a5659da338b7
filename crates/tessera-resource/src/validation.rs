//! Tessera Item Validation
//!
//! Constraint checks run before a write is persisted. Every violation is
//! collected so the client receives all of them in one response.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::descriptor::{Cardinality, ResourceDescriptor};
use crate::item::{ContentItem, FieldItem};
use serde_json::Value as JsonValue;
use tessera_common::Violation;

// =============================================================================
// Validation
// =============================================================================

/// Validate an item against its descriptor's field constraints.
pub fn validate_item(descriptor: &ResourceDescriptor, item: &ContentItem) -> Vec<Violation> {
    let mut violations = Vec::new();

    for field in descriptor.fields() {
        let values = item.get(&field.name);
        let present: Vec<&FieldItem> = values.iter().filter(|v| !is_empty_item(v)).collect();

        if field.required && present.is_empty() {
            violations.push(Violation::new(
                field.pointer(),
                format!("{}: This value should not be null.", field.public_name()),
            ));
        }

        if !field.cardinality.allows(present.len()) {
            violations.push(Violation::new(
                field.pointer(),
                format!(
                    "{}: This field cannot hold more than {} value(s).",
                    field.public_name(),
                    max_values(&field.cardinality)
                ),
            ));
        }

        if let Some(max) = field.max_length {
            for (delta, value) in present.iter().enumerate() {
                if let Some(JsonValue::String(s)) = value.as_value() {
                    if s.chars().count() > max {
                        violations.push(Violation::new(
                            pointer_for(field.pointer(), delta, field.cardinality.is_multiple()),
                            format!(
                                "{}: This value is too long. It should have {} characters or less.",
                                field.public_name(),
                                max
                            ),
                        ));
                    }
                }
            }
        }
    }

    violations
}

fn is_empty_item(item: &FieldItem) -> bool {
    match item {
        FieldItem::Value(JsonValue::Null) => true,
        FieldItem::Value(JsonValue::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn max_values(cardinality: &Cardinality) -> String {
    match cardinality {
        Cardinality::One => "1".to_string(),
        Cardinality::Limited(n) => n.to_string(),
        Cardinality::Unlimited => "unlimited".to_string(),
    }
}

fn pointer_for(base: String, delta: usize, multiple: bool) -> String {
    if multiple {
        format!("{}/{}", base, delta)
    } else {
        base
    }
}

// =============================================================================
// Tests
// =============================================================================
