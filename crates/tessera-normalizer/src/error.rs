//! Tessera Error Objects
//!
//! JSON:API error objects, both for request-level failures and for the
//! inline errors that replace inaccessible resources inside a document.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::node::ResourceIdentifier;
use serde_json::{json, Map, Value as JsonValue};
use tessera_common::{Cacheability, TesseraError};

/// Generic detail for errors whose cause must not leak.
const INTERNAL_DETAIL: &str = "An internal error occurred.";

/// One JSON:API error object.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    pub status: u16,
    pub title: String,
    pub detail: Option<String>,
    pub pointer: Option<String>,
    pub code: Option<String>,
    /// Resource an inline error stands in for.
    pub source_entity: Option<ResourceIdentifier>,
}

impl ErrorObject {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            detail: None,
            pointer: None,
            code: None,
            source_entity: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Inline 403 replacing a resource the account may not even label.
    pub fn inaccessible(source: ResourceIdentifier, reason: Option<&str>) -> Self {
        let detail = match reason {
            Some(reason) => format!(
                "The current user is not allowed to view {} '{}'. {}",
                source.resource_type, source.id, reason
            ),
            None => format!(
                "The current user is not allowed to view {} '{}'.",
                source.resource_type, source.id
            ),
        };
        let mut error = Self::new(403, "Forbidden")
            .with_detail(detail)
            .with_pointer("/data");
        error.source_entity = Some(source);
        error
    }

    /// Error objects for a request-level failure. Validation failures yield
    /// one object per violation.
    pub fn from_error(error: &TesseraError) -> Vec<ErrorObject> {
        let status = error.status_code();
        let title = error.title();

        match error {
            TesseraError::Validation(violations) => violations
                .iter()
                .map(|v| {
                    ErrorObject::new(status, title)
                        .with_detail(v.detail.clone())
                        .with_pointer(v.pointer.clone())
                })
                .collect(),
            TesseraError::AccessDenied { detail, pointer, .. } => vec![ErrorObject::new(status, title)
                .with_detail(detail.clone())
                .with_pointer(pointer.clone())],
            _ if error.is_user_error() => {
                let mut object = ErrorObject::new(status, title);
                object.detail = error.public_detail();
                vec![object]
            }
            _ => vec![ErrorObject::new(status, title).with_detail(INTERNAL_DETAIL)],
        }
    }

    pub fn rasterize(&self) -> JsonValue {
        let mut obj = Map::new();
        obj.insert("status".to_string(), JsonValue::String(self.status.to_string()));
        obj.insert("title".to_string(), JsonValue::String(self.title.clone()));
        if let Some(detail) = &self.detail {
            obj.insert("detail".to_string(), JsonValue::String(detail.clone()));
        }
        if let Some(pointer) = &self.pointer {
            obj.insert("source".to_string(), json!({ "pointer": pointer }));
        }
        if let Some(code) = &self.code {
            obj.insert("code".to_string(), JsonValue::String(code.clone()));
        }
        if let Some(source) = &self.source_entity {
            obj.insert("meta".to_string(), json!({ "entity": source.rasterize() }));
        }
        JsonValue::Object(obj)
    }
}

/// An error standing in for a resource inside a document.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineError {
    pub error: ErrorObject,
    pub cacheability: Cacheability,
}

impl InlineError {
    pub fn new(error: ErrorObject, cacheability: Cacheability) -> Self {
        Self { error, cacheability }
    }

    pub fn source_key(&self) -> Option<(&str, &str)> {
        self.error.source_entity.as_ref().map(ResourceIdentifier::key)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Violation;

    #[test]
    fn test_validation_yields_one_object_per_violation() {
        let err = TesseraError::Validation(vec![
            Violation::new("/data/attributes/title", "title: This value should not be null."),
            Violation::new("/data/attributes/body", "body: This value is too long."),
        ]);
        let objects = ErrorObject::from_error(&err);
        assert_eq!(objects.len(), 2);
        assert!(objects.iter().all(|o| o.status == 422));
        assert_eq!(objects[1].pointer.as_deref(), Some("/data/attributes/body"));
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let err = TesseraError::Internal("db password is hunter2".to_string());
        let objects = ErrorObject::from_error(&err);
        assert_eq!(objects[0].status, 500);
        assert_eq!(objects[0].detail.as_deref(), Some(INTERNAL_DETAIL));
    }

    #[test]
    fn test_rasterize_inline_error() {
        let error = ErrorObject::inaccessible(ResourceIdentifier::new("node--article", "a9"), None);
        let json = error.rasterize();
        assert_eq!(json["status"], "403");
        assert_eq!(json["source"]["pointer"], "/data");
        assert_eq!(json["meta"]["entity"]["id"], "a9");
    }

    #[test]
    fn test_parse_error_detail() {
        let err = TesseraError::Parse("The operator `LIKE` is not supported.".to_string());
        let objects = ErrorObject::from_error(&err);
        assert_eq!(objects[0].status, 400);
        assert!(objects[0].detail.as_deref().unwrap_or("").contains("LIKE"));
    }
}
