//! Tessera Denormalizer
//!
//! Turns incoming JSON:API documents into content items. Parsing problems
//! fail fast, access problems fail the request with 403, and constraint
//! violations are collected so the client receives all of them at once.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_common::{Result, TesseraError, Violation};
use tessera_resource::{
    validate_item, AccessPolicy, Account, ContentItem, ContentStore, DescriptorRegistry,
    FieldDefinition, FieldItem, ItemRef, Operation, ResourceDescriptor,
};
use uuid::Uuid;

// =============================================================================
// Parsed Document
// =============================================================================

/// Resource object of a write request, with fields mapped to internal names.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceObject {
    pub resource_type: String,
    pub id: Option<String>,
    /// Submitted values keyed by internal field name.
    pub values: BTreeMap<String, Vec<FieldItem>>,
}

/// Extract the `data` member of a request document.
fn primary_data(body: &JsonValue) -> Result<&JsonValue> {
    body.as_object()
        .and_then(|obj| obj.get("data"))
        .ok_or_else(|| TesseraError::Parse("The request document must contain a `data` member.".to_string()))
}

fn as_string<'v>(value: Option<&'v JsonValue>, what: &str) -> Result<Option<&'v str>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(TesseraError::Parse(format!("The `{}` member must be a string.", what))),
    }
}

/// Turn one resource identifier object into a reference and check its target.
fn parse_identifier(
    registry: &DescriptorRegistry,
    store: &dyn ContentStore,
    field: &FieldDefinition,
    delta: Option<usize>,
    raw: &JsonValue,
    violations: &mut Vec<Violation>,
) -> Result<Option<FieldItem>> {
    let obj = raw.as_object().ok_or_else(|| {
        TesseraError::Parse(format!(
            "The `{}` relationship must contain resource identifier objects.",
            field.public_name()
        ))
    })?;
    let target_type = as_string(obj.get("type"), "type")?.ok_or_else(|| {
        TesseraError::Parse("A resource identifier object must contain `type`.".to_string())
    })?;
    let target_id = as_string(obj.get("id"), "id")?.ok_or_else(|| {
        TesseraError::Parse("A resource identifier object must contain `id`.".to_string())
    })?;

    let pointer = match delta {
        Some(delta) => format!("{}/data/{}", field.pointer(), delta),
        None => format!("{}/data", field.pointer()),
    };

    if !field.targets.iter().any(|t| t == target_type) {
        violations.push(Violation::new(
            pointer,
            format!(
                "{}: The type `{}` is not a valid target for this relationship.",
                field.public_name(),
                target_type
            ),
        ));
        return Ok(None);
    }
    let Some(target_descriptor) = registry.by_public_type(target_type) else {
        violations.push(Violation::new(
            pointer,
            format!("{}: The type `{}` is not exposed.", field.public_name(), target_type),
        ));
        return Ok(None);
    };
    match store.load(target_descriptor.entity_type(), target_id)? {
        Some(target) if target.subtype == target_descriptor.subtype() => {}
        _ => {
            violations.push(Violation::new(
                pointer,
                format!(
                    "{}: The referenced {} '{}' does not exist.",
                    field.public_name(),
                    target_type,
                    target_id
                ),
            ));
            return Ok(None);
        }
    }

    let meta = obj.get("meta").and_then(JsonValue::as_object).cloned();
    Ok(Some(FieldItem::Reference {
        target: ItemRef::new(target_descriptor.entity_type(), target_id),
        meta,
    }))
}

/// Parse relationship `data`, enforcing its shape against the field's cardinality.
pub(crate) fn parse_linkage(
    registry: &DescriptorRegistry,
    store: &dyn ContentStore,
    field: &FieldDefinition,
    data: &JsonValue,
    violations: &mut Vec<Violation>,
) -> Result<Vec<FieldItem>> {
    let multiple = field.cardinality.is_multiple();
    match data {
        JsonValue::Array(items) if multiple => {
            let mut parsed = Vec::with_capacity(items.len());
            for (delta, raw) in items.iter().enumerate() {
                if let Some(item) = parse_identifier(registry, store, field, Some(delta), raw, violations)? {
                    parsed.push(item);
                }
            }
            Ok(parsed)
        }
        JsonValue::Null if !multiple => Ok(Vec::new()),
        JsonValue::Object(_) if !multiple => Ok(parse_identifier(registry, store, field, None, data, violations)?
            .into_iter()
            .collect()),
        _ => Err(TesseraError::Parse(format!(
            "The `{}` relationship expects {}.",
            field.public_name(),
            if multiple {
                "an array of resource identifier objects"
            } else {
                "a resource identifier object or null"
            }
        ))),
    }
}

fn attribute_values(field: &FieldDefinition, value: &JsonValue) -> Vec<FieldItem> {
    match value {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(items) if field.cardinality.is_multiple() => {
            items.iter().cloned().map(FieldItem::Value).collect()
        }
        other => vec![FieldItem::Value(other.clone())],
    }
}

// =============================================================================
// Denormalizer
// =============================================================================

/// Applies write requests for one account.
pub struct Denormalizer<'a> {
    registry: &'a DescriptorRegistry,
    store: &'a dyn ContentStore,
    policy: &'a dyn AccessPolicy,
    account: &'a Account,
}

impl<'a> Denormalizer<'a> {
    pub fn new(
        registry: &'a DescriptorRegistry,
        store: &'a dyn ContentStore,
        policy: &'a dyn AccessPolicy,
        account: &'a Account,
    ) -> Self {
        Self {
            registry,
            store,
            policy,
            account,
        }
    }

    pub(crate) fn registry(&self) -> &'a DescriptorRegistry {
        self.registry
    }

    pub(crate) fn store(&self) -> &'a dyn ContentStore {
        self.store
    }

    pub(crate) fn policy(&self) -> &'a dyn AccessPolicy {
        self.policy
    }

    pub(crate) fn account(&self) -> &'a Account {
        self.account
    }

    /// Parse a request document for `descriptor`.
    ///
    /// Constraint problems found while parsing linkage are pushed onto
    /// `violations`; structural problems fail immediately.
    pub fn parse(
        &self,
        descriptor: &ResourceDescriptor,
        body: &JsonValue,
        violations: &mut Vec<Violation>,
    ) -> Result<ResourceObject> {
        let data = primary_data(body)?
            .as_object()
            .ok_or_else(|| TesseraError::Parse("The `data` member must be a resource object.".to_string()))?;

        let resource_type = as_string(data.get("type"), "type")?
            .ok_or_else(|| TesseraError::Parse("The resource object must contain `type`.".to_string()))?;
        if resource_type != descriptor.public_type() {
            return Err(TesseraError::Conflict(format!(
                "The type `{}` does not match the collection type `{}`.",
                resource_type,
                descriptor.public_type()
            )));
        }
        let id = as_string(data.get("id"), "id")?.map(str::to_string);

        let mut values = BTreeMap::new();
        for (name, value) in members(data, "attributes")? {
            let field = self.known_field(descriptor, name, false)?;
            values.insert(field.name.clone(), attribute_values(field, value));
        }
        for (name, value) in members(data, "relationships")? {
            let field = self.known_field(descriptor, name, true)?;
            let linkage = value.as_object().and_then(|obj| obj.get("data")).ok_or_else(|| {
                TesseraError::Parse(format!("The `{}` relationship must contain a `data` member.", name))
            })?;
            let parsed = parse_linkage(self.registry, self.store, field, linkage, violations)?;
            values.insert(field.name.clone(), parsed);
        }

        Ok(ResourceObject {
            resource_type: resource_type.to_string(),
            id,
            values,
        })
    }

    fn known_field<'d>(
        &self,
        descriptor: &'d ResourceDescriptor,
        public_name: &str,
        relationship: bool,
    ) -> Result<&'d FieldDefinition> {
        match descriptor.field_by_public(public_name) {
            Some(field) if field.is_relationship() == relationship => Ok(field),
            Some(_) => Err(TesseraError::Parse(format!(
                "The field `{}` must be submitted under `{}`.",
                public_name,
                if relationship { "attributes" } else { "relationships" }
            ))),
            None => Err(TesseraError::Parse(format!(
                "The field `{}` does not exist on {}.",
                public_name,
                descriptor.public_type()
            ))),
        }
    }

    /// Field edit access and read-only checks for every submitted field.
    fn check_fields(
        &self,
        descriptor: &ResourceDescriptor,
        object: &ResourceObject,
        existing: Option<&ContentItem>,
        operation: Operation,
        violations: &mut Vec<Violation>,
    ) -> Result<()> {
        for internal in object.values.keys() {
            let Some(field) = descriptor.field(internal) else {
                continue;
            };
            let access = self
                .policy
                .field_access(self.account, descriptor, field, existing, operation);
            if access.is_denied() {
                return Err(TesseraError::AccessDenied {
                    detail: access
                        .reason()
                        .unwrap_or("The current user is not allowed to edit this field.")
                        .to_string(),
                    pointer: field.pointer(),
                    cacheability: access.cacheability().clone(),
                });
            }
            if field.read_only {
                let unchanged = existing
                    .map(|item| item.get(&field.name) == object.values[internal].as_slice())
                    .unwrap_or(false);
                if !unchanged {
                    violations.push(Violation::new(
                        field.pointer(),
                        format!("{}: This field is read-only.", field.public_name()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn ensure_mutable(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        if descriptor.is_mutable() {
            Ok(())
        } else {
            Err(TesseraError::MethodNotAllowed(format!(
                "{} resources cannot be modified.",
                descriptor.public_type()
            )))
        }
    }

    // ==========================================================================
    // Writes
    // ==========================================================================

    /// `POST /<type>`: create and persist a new item.
    pub fn create(&self, descriptor: &Arc<ResourceDescriptor>, body: &JsonValue) -> Result<ContentItem> {
        self.ensure_mutable(descriptor)?;
        let access = self.policy.create_access(self.account, descriptor);
        if access.is_denied() {
            return Err(TesseraError::access_denied(
                access.reason().unwrap_or("The current user is not allowed to create this resource."),
                access.cacheability().clone(),
            ));
        }

        let mut violations = Vec::new();
        let object = self.parse(descriptor, body, &mut violations)?;
        let id = match &object.id {
            Some(id) => {
                if self.store.load(descriptor.entity_type(), id)?.is_some() {
                    return Err(TesseraError::Conflict(format!(
                        "{} '{}' already exists.",
                        descriptor.public_type(),
                        id
                    )));
                }
                id.clone()
            }
            None => Uuid::new_v4().to_string(),
        };
        self.check_fields(descriptor, &object, None, Operation::Create, &mut violations)?;

        let mut item = ContentItem::new(descriptor.entity_type(), descriptor.subtype(), id);
        for (name, values) in object.values {
            item.set(name, values);
        }
        self.finish(descriptor, &item, violations)?;

        self.store.create(item.clone())?;
        tracing::debug!(resource_type = %descriptor.public_type(), id = %item.id, "created resource");
        Ok(item)
    }

    /// `PATCH /<type>/<id>`: change only the submitted fields.
    pub fn update(
        &self,
        descriptor: &Arc<ResourceDescriptor>,
        existing: &ContentItem,
        body: &JsonValue,
    ) -> Result<ContentItem> {
        self.ensure_mutable(descriptor)?;
        self.check_item(descriptor, existing, Operation::Update)?;

        let mut violations = Vec::new();
        let object = self.parse(descriptor, body, &mut violations)?;
        match object.id.as_deref() {
            Some(id) if id == existing.id => {}
            Some(id) => {
                return Err(TesseraError::Conflict(format!(
                    "The resource id `{}` does not match the URL id `{}`.",
                    id, existing.id
                )))
            }
            None => {
                return Err(TesseraError::Parse(
                    "The resource object must contain `id` when updating.".to_string(),
                ))
            }
        }
        self.check_fields(descriptor, &object, Some(existing), Operation::Update, &mut violations)?;

        let mut item = existing.clone();
        for (name, values) in object.values {
            item.set(name, values);
        }
        self.finish(descriptor, &item, violations)?;

        self.store.update(item.clone())?;
        tracing::debug!(resource_type = %descriptor.public_type(), id = %item.id, "updated resource");
        Ok(item)
    }

    /// `DELETE /<type>/<id>`.
    pub fn delete(&self, descriptor: &Arc<ResourceDescriptor>, existing: &ContentItem) -> Result<()> {
        self.ensure_mutable(descriptor)?;
        self.check_item(descriptor, existing, Operation::Delete)?;
        self.store.delete(&existing.entity_type, &existing.id)?;
        tracing::debug!(resource_type = %descriptor.public_type(), id = %existing.id, "deleted resource");
        Ok(())
    }

    pub(crate) fn check_item(
        &self,
        descriptor: &ResourceDescriptor,
        item: &ContentItem,
        operation: Operation,
    ) -> Result<()> {
        let access = self.policy.item_access(self.account, descriptor, item, operation);
        if access.is_denied() {
            return Err(TesseraError::access_denied(
                access
                    .reason()
                    .unwrap_or("The current user is not allowed to modify this resource."),
                access.cacheability().clone(),
            ));
        }
        Ok(())
    }

    /// Fold item-level constraint violations into those found while parsing.
    pub(crate) fn finish(
        &self,
        descriptor: &ResourceDescriptor,
        item: &ContentItem,
        mut violations: Vec<Violation>,
    ) -> Result<()> {
        for violation in validate_item(descriptor, item) {
            if !violations.contains(&violation) {
                violations.push(violation);
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            tracing::debug!(
                resource_type = %descriptor.public_type(),
                count = violations.len(),
                "write rejected by validation"
            );
            Err(TesseraError::Validation(violations))
        }
    }
}

fn members<'v>(data: &'v Map<String, JsonValue>, member: &str) -> Result<Vec<(&'v str, &'v JsonValue)>> {
    match data.get(member) {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Object(obj)) => Ok(obj.iter().map(|(k, v)| (k.as_str(), v)).collect()),
        Some(_) => Err(TesseraError::Parse(format!("The `{}` member must be an object.", member))),
    }
}

// =============================================================================
// Tests
// =============================================================================
