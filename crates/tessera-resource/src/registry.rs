//! Tessera Descriptor Registry
//!
//! Process-wide cache of resource descriptors keyed by
//! `(entity_type, subtype)`. Definitions are validated up front; descriptors
//! are built on first lookup and never change afterwards, so concurrent
//! readers only ever contend on the first build of a key.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::descriptor::{ResourceDefinition, ResourceDescriptor};
use crate::item::ContentItem;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};

type DescriptorKey = (String, String);

// =============================================================================
// Descriptor Registry
// =============================================================================

/// Lazily built, memoized resource descriptors.
pub struct DescriptorRegistry {
    definitions: HashMap<DescriptorKey, ResourceDefinition>,
    public_index: HashMap<String, DescriptorKey>,
    cache: RwLock<HashMap<DescriptorKey, Arc<ResourceDescriptor>>>,
}

impl DescriptorRegistry {
    /// Create a registry from resource definitions.
    pub fn new(definitions: Vec<ResourceDefinition>) -> Result<Self> {
        let mut by_key = HashMap::new();
        let mut public_index = HashMap::new();

        for definition in definitions {
            definition.validate()?;
            let key = (definition.entity_type.clone(), definition.subtype.clone());
            let public_type = definition.resolved_public_type();

            if public_index.insert(public_type.clone(), key.clone()).is_some() {
                return Err(TesseraError::Configuration(format!(
                    "resource type '{}' is defined twice",
                    public_type
                )));
            }
            if by_key.insert(key, definition).is_some() {
                return Err(TesseraError::Configuration(format!(
                    "subtype behind '{}' is defined twice",
                    public_type
                )));
            }
        }

        // Relationship targets must name known resource types.
        for definition in by_key.values() {
            for field in definition.fields.iter().filter(|f| f.is_relationship()) {
                if let Some(unknown) = field.targets.iter().find(|t| !public_index.contains_key(*t)) {
                    return Err(TesseraError::Configuration(format!(
                        "relationship '{}' on {} targets unknown type '{}'",
                        field.name,
                        definition.resolved_public_type(),
                        unknown
                    )));
                }
            }
        }

        Ok(Self {
            definitions: by_key,
            public_index,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get the descriptor for a subtype, building it on first use.
    pub fn get(&self, entity_type: &str, subtype: &str) -> Option<Arc<ResourceDescriptor>> {
        let key = (entity_type.to_string(), subtype.to_string());
        if let Some(descriptor) = self.cache.read().get(&key) {
            return Some(Arc::clone(descriptor));
        }

        let definition = self.definitions.get(&key)?;
        let mut cache = self.cache.write();
        let descriptor = cache.entry(key).or_insert_with(|| {
            tracing::debug!(
                resource_type = %definition.resolved_public_type(),
                "building resource descriptor"
            );
            Arc::new(ResourceDescriptor::from_definition(definition))
        });
        Some(Arc::clone(descriptor))
    }

    /// Resolve a public type name such as `node--article`.
    pub fn by_public_type(&self, public_type: &str) -> Option<Arc<ResourceDescriptor>> {
        let (entity_type, subtype) = self.public_index.get(public_type)?;
        self.get(entity_type, subtype)
    }

    /// Descriptor describing a stored item.
    pub fn for_item(&self, item: &ContentItem) -> Option<Arc<ResourceDescriptor>> {
        self.get(&item.entity_type, &item.subtype)
    }

    /// Descriptors a relationship field may point at.
    pub fn relatable(
        &self,
        descriptor: &ResourceDescriptor,
        public_field: &str,
    ) -> Vec<Arc<ResourceDescriptor>> {
        descriptor
            .relatable_types(public_field)
            .iter()
            .filter_map(|t| self.by_public_type(t))
            .collect()
    }

    /// All public type names, sorted.
    pub fn public_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.public_index.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldDefinition;

    fn definitions() -> Vec<ResourceDefinition> {
        vec![
            ResourceDefinition::new("node", "article")
                .field(FieldDefinition::attribute("title"))
                .field(FieldDefinition::relationship("uid", ["user--user"])),
            ResourceDefinition::new("user", "user").field(FieldDefinition::attribute("name")),
        ]
    }

    #[test]
    fn test_lookup() {
        let registry = DescriptorRegistry::new(definitions()).unwrap();
        assert_eq!(registry.len(), 2);

        let article = registry.get("node", "article").unwrap();
        assert_eq!(article.public_type(), "node--article");

        let by_name = registry.by_public_type("user--user").unwrap();
        assert_eq!(by_name.entity_type(), "user");
        assert!(registry.by_public_type("node--page").is_none());
        assert_eq!(registry.public_types(), vec!["node--article", "user--user"]);
    }

    #[test]
    fn test_descriptors_are_memoized() {
        let registry = DescriptorRegistry::new(definitions()).unwrap();
        let first = registry.get("node", "article").unwrap();
        let second = registry.by_public_type("node--article").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_relatable() {
        let registry = DescriptorRegistry::new(definitions()).unwrap();
        let article = registry.get("node", "article").unwrap();
        let targets = registry.relatable(&article, "uid");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].public_type(), "user--user");
    }

    #[test]
    fn test_unknown_target_rejected() {
        let defs = vec![ResourceDefinition::new("node", "article")
            .field(FieldDefinition::relationship("uid", ["user--user"]))];
        assert!(DescriptorRegistry::new(defs).is_err());
    }

    #[test]
    fn test_duplicate_public_type_rejected() {
        let defs = vec![
            ResourceDefinition::new("node", "article").public_type_name("articles"),
            ResourceDefinition::new("node", "story").public_type_name("articles"),
        ];
        assert!(DescriptorRegistry::new(defs).is_err());
    }
}
