//! Tessera Resource Descriptors
//!
//! Static metadata per resource subtype: the public type name, the mapping
//! between internal field names and their public aliases, mutability and
//! locatability flags, and the resource types each relationship may target.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tessera_common::{Result, TesseraError};

/// Member names JSON:API reserves at the resource object level.
const RESERVED_MEMBER_NAMES: &[&str] = &["id", "type"];

fn default_true() -> bool {
    true
}

// =============================================================================
// Cardinality
// =============================================================================

/// How many values a field may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    One,
    Limited(usize),
    Unlimited,
}

impl Cardinality {
    /// Multi-valued fields always rasterize to arrays.
    pub fn is_multiple(&self) -> bool {
        !matches!(self, Cardinality::One)
    }

    /// Check whether `count` values fit this cardinality.
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Cardinality::One => count <= 1,
            Cardinality::Limited(max) => count <= *max,
            Cardinality::Unlimited => true,
        }
    }
}

// =============================================================================
// Field Definition
// =============================================================================

/// Whether a field is serialized under `attributes` or `relationships`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Attribute,
    Relationship,
}

/// One field of a resource subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Internal (storage) name.
    pub name: String,
    /// Public name override; the internal name is used when absent.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_true")]
    pub exposed: bool,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Public type names a relationship may reference.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub read_only: bool,
}

impl FieldDefinition {
    /// Create a single-valued attribute field.
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            exposed: true,
            kind: FieldKind::Attribute,
            cardinality: Cardinality::One,
            targets: Vec::new(),
            required: false,
            max_length: None,
            read_only: false,
        }
    }

    /// Create a single-valued relationship field.
    pub fn relationship<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: FieldKind::Relationship,
            targets: targets.into_iter().map(Into::into).collect(),
            ..Self::attribute(name)
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn multiple(mut self) -> Self {
        self.cardinality = Cardinality::Unlimited;
        self
    }

    pub fn limited(mut self, max: usize) -> Self {
        self.cardinality = Cardinality::Limited(max);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.exposed = false;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Name used on the wire.
    pub fn public_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_relationship(&self) -> bool {
        self.kind == FieldKind::Relationship
    }

    /// Document member that holds this field.
    pub fn member(&self) -> &'static str {
        match self.kind {
            FieldKind::Attribute => "attributes",
            FieldKind::Relationship => "relationships",
        }
    }

    /// JSON pointer of this field inside a request document.
    pub fn pointer(&self) -> String {
        format!("/data/{}/{}", self.member(), self.public_name())
    }
}

// =============================================================================
// Resource Definition
// =============================================================================

/// Declarative description of one resource subtype, as found in
/// configuration. Turned into a `ResourceDescriptor` by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub entity_type: String,
    pub subtype: String,
    #[serde(default)]
    pub public_type: Option<String>,
    /// Field rendered by label-only projections.
    #[serde(default)]
    pub label_field: Option<String>,
    #[serde(default = "default_true")]
    pub locatable: bool,
    #[serde(default = "default_true")]
    pub mutable: bool,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl ResourceDefinition {
    pub fn new(entity_type: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            subtype: subtype.into(),
            public_type: None,
            label_field: None,
            locatable: true,
            mutable: true,
            fields: Vec::new(),
        }
    }

    pub fn public_type_name(mut self, name: impl Into<String>) -> Self {
        self.public_type = Some(name.into());
        self
    }

    pub fn label(mut self, field: impl Into<String>) -> Self {
        self.label_field = Some(field.into());
        self
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn internal(mut self) -> Self {
        self.locatable = false;
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Public type name, `<entity_type>--<subtype>` unless overridden.
    pub fn resolved_public_type(&self) -> String {
        self.public_type
            .clone()
            .unwrap_or_else(|| format!("{}--{}", self.entity_type, self.subtype))
    }

    /// Check the definition is internally consistent.
    pub fn validate(&self) -> Result<()> {
        let public_type = self.resolved_public_type();
        if !is_member_name(&public_type) {
            return Err(TesseraError::Configuration(format!(
                "'{}' is not a valid resource type name",
                public_type
            )));
        }

        let mut internal = HashSet::new();
        let mut public = HashSet::new();
        for field in &self.fields {
            if !internal.insert(field.name.as_str()) {
                return Err(TesseraError::Configuration(format!(
                    "field '{}' is defined twice on {}",
                    field.name, public_type
                )));
            }
            if !field.exposed {
                continue;
            }
            let name = field.public_name();
            if RESERVED_MEMBER_NAMES.contains(&name) {
                return Err(TesseraError::Configuration(format!(
                    "field '{}' on {} needs an alias: '{}' is reserved",
                    field.name, public_type, name
                )));
            }
            if !is_member_name(name) || !public.insert(name) {
                return Err(TesseraError::Configuration(format!(
                    "public field name '{}' on {} is invalid or duplicated",
                    name, public_type
                )));
            }
            if field.is_relationship() && field.targets.is_empty() {
                return Err(TesseraError::Configuration(format!(
                    "relationship '{}' on {} has no target types",
                    field.name, public_type
                )));
            }
        }

        if let Some(label) = &self.label_field {
            if !self.fields.iter().any(|f| &f.name == label) {
                return Err(TesseraError::Configuration(format!(
                    "label field '{}' is not defined on {}",
                    label, public_type
                )));
            }
        }
        Ok(())
    }
}

/// JSON:API member name rule: globally allowed characters, no leading or
/// trailing `-`, `_` or space.
pub fn is_member_name(name: &str) -> bool {
    let edge_ok = |c: char| c.is_ascii_alphanumeric();
    match (name.chars().next(), name.chars().last()) {
        (Some(first), Some(last)) if edge_ok(first) && edge_ok(last) => name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        _ => false,
    }
}

// =============================================================================
// Resource Descriptor
// =============================================================================

/// Immutable metadata for one resource subtype.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    public_type: String,
    entity_type: String,
    subtype: String,
    label_field: Option<String>,
    locatable: bool,
    mutable: bool,
    fields: Vec<FieldDefinition>,
    by_internal: HashMap<String, usize>,
    by_public: HashMap<String, usize>,
}

impl ResourceDescriptor {
    /// Build a descriptor from a definition that passed `validate`.
    pub fn from_definition(definition: &ResourceDefinition) -> Self {
        let mut by_internal = HashMap::new();
        let mut by_public = HashMap::new();
        for (idx, field) in definition.fields.iter().enumerate() {
            by_internal.insert(field.name.clone(), idx);
            if field.exposed {
                by_public.insert(field.public_name().to_string(), idx);
            }
        }

        Self {
            public_type: definition.resolved_public_type(),
            entity_type: definition.entity_type.clone(),
            subtype: definition.subtype.clone(),
            label_field: definition.label_field.clone(),
            locatable: definition.locatable,
            mutable: definition.mutable,
            fields: definition.fields.clone(),
            by_internal,
            by_public,
        }
    }

    pub fn public_type(&self) -> &str {
        &self.public_type
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn label_field(&self) -> Option<&FieldDefinition> {
        self.label_field.as_deref().and_then(|name| self.field(name))
    }

    /// Whether the type has its own individual and collection routes.
    pub fn is_locatable(&self) -> bool {
        self.locatable
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Exposed fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.exposed)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields().filter(|f| !f.is_relationship())
    }

    pub fn relationships(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields().filter(|f| f.is_relationship())
    }

    /// Look up a field by internal name, exposed or not.
    pub fn field(&self, internal_name: &str) -> Option<&FieldDefinition> {
        self.by_internal.get(internal_name).map(|&idx| &self.fields[idx])
    }

    /// Look up an exposed field by its public name.
    pub fn field_by_public(&self, public_name: &str) -> Option<&FieldDefinition> {
        self.by_public.get(public_name).map(|&idx| &self.fields[idx])
    }

    pub fn public_name<'a>(&'a self, internal_name: &str) -> Option<&'a str> {
        self.field(internal_name)
            .filter(|f| f.exposed)
            .map(|f| f.public_name())
    }

    pub fn internal_name<'a>(&'a self, public_name: &str) -> Option<&'a str> {
        self.field_by_public(public_name).map(|f| f.name.as_str())
    }

    pub fn is_field_enabled(&self, internal_name: &str) -> bool {
        self.field(internal_name).map(|f| f.exposed).unwrap_or(false)
    }

    pub fn is_relationship(&self, public_name: &str) -> bool {
        self.field_by_public(public_name)
            .map(|f| f.is_relationship())
            .unwrap_or(false)
    }

    /// Public type names the given relationship may reference.
    pub fn relatable_types(&self, public_name: &str) -> &[String] {
        self.field_by_public(public_name)
            .filter(|f| f.is_relationship())
            .map(|f| f.targets.as_slice())
            .unwrap_or(&[])
    }

    /// Cache tag invalidated whenever any item of this subtype changes.
    pub fn list_cache_tag(&self) -> String {
        format!("{}_list", self.entity_type)
    }
}

// =============================================================================
// Tests
// =============================================================================
