//! Tessera Document Builder
//!
//! Assembles value node trees from content items. Every collaborator the
//! recursion needs is carried by the builder itself, so nested documents
//! for included relationships are built by the same instance that built
//! their parent.
//!
//! Access decisions are taken while building and never raise:
//! - a denied field becomes an empty field node
//! - a denied item falls back to a label-only projection
//! - an item that cannot even be labelled becomes an inline error
//!
//! Only the sole top-level resource escalates to `TesseraError::AccessDenied`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::document::{DocumentNode, Entry};
use crate::error::{ErrorObject, InlineError};
use crate::link::LinkProvider;
use crate::node::{
    FieldEntry, FieldItemNode, FieldNode, Projection, RelationshipNode, ResourceIdentifier,
    ResourceNode,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_common::{Cacheability, Result, TesseraError};
use tessera_query::{IncludeTree, SparseFieldsets};
use tessera_resource::{
    AccessPolicy, AccessResult, Account, ContentItem, ContentStore, DescriptorRegistry,
    FieldDefinition, FieldItem, Operation, ResourceDescriptor,
};

type ItemDecisionKey = (String, String, Operation);
type FieldDecisionKey = (String, String, String, Operation);
type BuiltKey = (String, String, String);

/// What to assemble as primary data.
#[derive(Debug, Clone, Copy)]
pub enum Primary<'i> {
    Single(&'i ContentItem),
    Collection(&'i [ContentItem]),
}

// =============================================================================
// Document Builder
// =============================================================================

/// Builds the value node tree for one request.
pub struct DocumentBuilder<'a> {
    registry: &'a DescriptorRegistry,
    store: &'a dyn ContentStore,
    policy: &'a dyn AccessPolicy,
    links: &'a dyn LinkProvider,
    account: &'a Account,
    fields: &'a SparseFieldsets,
    item_decisions: RefCell<HashMap<ItemDecisionKey, AccessResult>>,
    field_decisions: RefCell<HashMap<FieldDecisionKey, AccessResult>>,
    built: RefCell<HashMap<BuiltKey, Entry>>,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(
        registry: &'a DescriptorRegistry,
        store: &'a dyn ContentStore,
        policy: &'a dyn AccessPolicy,
        links: &'a dyn LinkProvider,
        account: &'a Account,
        fields: &'a SparseFieldsets,
    ) -> Self {
        Self {
            registry,
            store,
            policy,
            links,
            account,
            fields,
            item_decisions: RefCell::new(HashMap::new()),
            field_decisions: RefCell::new(HashMap::new()),
            built: RefCell::new(HashMap::new()),
        }
    }

    // ==========================================================================
    // Primary Documents
    // ==========================================================================

    /// Assemble an individual or collection document.
    pub fn assemble(&self, primary: Primary<'_>, include: &IncludeTree) -> Result<DocumentNode> {
        match primary {
            Primary::Single(item) => match self.build_entry(item, include)? {
                Entry::Resource(resource) => {
                    tracing::debug!(
                        resource_type = %resource.resource_type(),
                        id = %resource.id(),
                        "assembled individual document"
                    );
                    Ok(DocumentNode::single(resource))
                }
                Entry::Error(inline) => Err(escalate(inline)),
            },
            Primary::Collection(items) => {
                let entries = items
                    .iter()
                    .map(|item| self.build_entry(item, include))
                    .collect::<Result<Vec<Entry>>>()?;
                let denied = entries.iter().filter(|e| matches!(e, Entry::Error(_))).count();
                tracing::debug!(members = entries.len(), denied, "assembled collection document");
                Ok(DocumentNode::collection(entries))
            }
        }
    }

    /// Document of the resources a relationship points at.
    pub fn related(&self, item: &ContentItem, public_field: &str, include: &IncludeTree) -> Result<DocumentNode> {
        let (descriptor, field, decisions) = self.readable_relationship(item, public_field)?;
        let stored = self.store.read_fields(item);
        let targets = self.resolve_targets(&descriptor, &field, stored_values(&stored, &field))?;

        let mut entries = Vec::with_capacity(targets.len());
        for (_, target) in &targets {
            entries.push(self.build_entry_memo(target, include)?);
        }

        let doc = if field.cardinality.is_multiple() {
            DocumentNode::collection(entries)
        } else {
            match entries.into_iter().next() {
                Some(Entry::Resource(resource)) => DocumentNode::single(resource),
                Some(Entry::Error(inline)) => return Err(escalate(inline)),
                None => DocumentNode::null(Cacheability::new()),
            }
        };

        Ok(doc
            .with_link(
                "self",
                self.links
                    .related(descriptor.public_type(), &item.id, field.public_name()),
            )
            .with_cacheability(&decisions))
    }

    /// Relationship document: identifiers only, plus inclusions when the
    /// relationship name heads an include path.
    pub fn relationship(
        &self,
        item: &ContentItem,
        public_field: &str,
        include: &IncludeTree,
    ) -> Result<DocumentNode> {
        let (descriptor, field, decisions) = self.readable_relationship(item, public_field)?;
        let stored = self.store.read_fields(item);
        let node = self.build_relationship(
            &descriptor,
            item,
            &field,
            stored_values(&stored, &field),
            include,
            decisions,
        )?;
        Ok(DocumentNode::relationship(node))
    }

    fn readable_relationship(
        &self,
        item: &ContentItem,
        public_field: &str,
    ) -> Result<(Arc<ResourceDescriptor>, FieldDefinition, Cacheability)> {
        let descriptor = self.descriptor_for(item)?;
        let view = self.item_access(&descriptor, item, Operation::View);
        if view.is_denied() {
            return Err(TesseraError::access_denied(
                view.reason().unwrap_or("The current user is not allowed to view this resource."),
                view.cacheability().clone(),
            ));
        }

        let field = descriptor
            .field_by_public(public_field)
            .filter(|f| f.is_relationship())
            .cloned()
            .ok_or_else(|| {
                TesseraError::NotFound(format!(
                    "The relationship `{}` does not exist on {}.",
                    public_field,
                    descriptor.public_type()
                ))
            })?;
        let access = self.field_access(&descriptor, &field, item);
        if access.is_denied() {
            return Err(TesseraError::AccessDenied {
                detail: access
                    .reason()
                    .unwrap_or("The current user is not allowed to view this relationship.")
                    .to_string(),
                pointer: field.pointer(),
                cacheability: access.cacheability().clone(),
            });
        }

        let decisions = view.cacheability().merge(access.cacheability());
        Ok((descriptor, field, decisions))
    }

    // ==========================================================================
    // Resources
    // ==========================================================================

    fn descriptor_for(&self, item: &ContentItem) -> Result<Arc<ResourceDescriptor>> {
        self.registry.for_item(item).ok_or_else(|| {
            TesseraError::Internal(format!(
                "no resource type is defined for {}--{}",
                item.entity_type, item.subtype
            ))
        })
    }

    fn build_entry_memo(&self, item: &ContentItem, include: &IncludeTree) -> Result<Entry> {
        let key = (item.entity_type.clone(), item.id.clone(), include.paths().join(","));
        if let Some(entry) = self.built.borrow().get(&key) {
            return Ok(entry.clone());
        }
        let entry = self.build_entry(item, include)?;
        self.built.borrow_mut().insert(key, entry.clone());
        Ok(entry)
    }

    fn build_entry(&self, item: &ContentItem, include: &IncludeTree) -> Result<Entry> {
        let descriptor = self.descriptor_for(item)?;
        let identifier = ResourceIdentifier::new(descriptor.public_type(), &item.id);

        let view = self.item_access(&descriptor, item, Operation::View);
        if view.is_allowed() {
            let resource = self.build_full(&descriptor, item, identifier, include, view.cacheability())?;
            return Ok(Entry::Resource(resource));
        }

        let label = self.item_access(&descriptor, item, Operation::ViewLabel);
        let decisions = view
            .cacheability()
            .merge(label.cacheability())
            .with_tag(item.cache_tag());

        if label.is_allowed() {
            tracing::debug!(
                resource_type = %descriptor.public_type(),
                id = %item.id,
                "view denied, rendering label-only projection"
            );
            return Ok(Entry::Resource(self.build_label_only(&descriptor, item, identifier, decisions)));
        }

        tracing::debug!(
            resource_type = %descriptor.public_type(),
            id = %item.id,
            "view and label denied, rendering inline error"
        );
        Ok(Entry::Error(InlineError::new(
            ErrorObject::inaccessible(identifier, view.reason()),
            decisions,
        )))
    }

    fn build_full(
        &self,
        descriptor: &Arc<ResourceDescriptor>,
        item: &ContentItem,
        identifier: ResourceIdentifier,
        include: &IncludeTree,
        decision: &Cacheability,
    ) -> Result<ResourceNode> {
        let stored = self.store.read_fields(item);
        let mut fields = Vec::new();

        for field in descriptor.fields() {
            let public = field.public_name();
            // Sparse fieldsets restrict attributes only.
            if !field.is_relationship() && !self.fields.allows(descriptor.public_type(), public) {
                continue;
            }

            let access = self.field_access(descriptor, field, item);
            if access.is_denied() {
                tracing::debug!(
                    resource_type = %descriptor.public_type(),
                    field = %public,
                    "field access denied, rendering empty field"
                );
                let empty = FieldNode::denied(public, field.cardinality.is_multiple(), access.cacheability().clone());
                let entry = if field.is_relationship() {
                    FieldEntry::Relationship(RelationshipNode::new(
                        empty,
                        self.relationship_links(descriptor, item, field),
                        None,
                    ))
                } else {
                    FieldEntry::Attribute(empty)
                };
                fields.push(entry);
                continue;
            }

            let values = stored_values(&stored, field);
            if field.is_relationship() {
                fields.push(FieldEntry::Relationship(self.build_relationship(
                    descriptor,
                    item,
                    field,
                    values,
                    include,
                    access.cacheability().clone(),
                )?));
            } else {
                let items = values
                    .iter()
                    .filter_map(FieldItem::as_value)
                    .map(|v| FieldItemNode::Value(v.clone()))
                    .collect();
                fields.push(FieldEntry::Attribute(FieldNode::new(
                    public,
                    field.cardinality.is_multiple(),
                    items,
                    access.cacheability().clone(),
                )));
            }
        }

        let self_link = descriptor
            .is_locatable()
            .then(|| self.links.resource(descriptor.public_type(), &item.id));
        let own = decision.clone().with_tag(item.cache_tag());
        Ok(ResourceNode::new(identifier, Projection::Full, fields, self_link, own))
    }

    fn build_label_only(
        &self,
        descriptor: &Arc<ResourceDescriptor>,
        item: &ContentItem,
        identifier: ResourceIdentifier,
        decisions: Cacheability,
    ) -> ResourceNode {
        let mut fields = Vec::new();
        if let Some(label_field) = descriptor.label_field() {
            let items = item
                .label(descriptor)
                .map(|label| vec![FieldItemNode::Value(label.into())])
                .unwrap_or_default();
            fields.push(FieldEntry::Attribute(FieldNode::new(
                label_field.public_name(),
                false,
                items,
                Cacheability::new(),
            )));
        }
        let self_link = descriptor
            .is_locatable()
            .then(|| self.links.resource(descriptor.public_type(), &item.id));
        ResourceNode::new(identifier, Projection::LabelOnly, fields, self_link, decisions)
    }

    // ==========================================================================
    // Relationships
    // ==========================================================================

    fn relationship_links(
        &self,
        descriptor: &ResourceDescriptor,
        item: &ContentItem,
        field: &FieldDefinition,
    ) -> Vec<(String, crate::link::Link)> {
        if !descriptor.is_locatable() {
            return Vec::new();
        }
        let public_type = descriptor.public_type();
        vec![
            (
                "self".to_string(),
                self.links.relationship(public_type, &item.id, field.public_name()),
            ),
            (
                "related".to_string(),
                self.links.related(public_type, &item.id, field.public_name()),
            ),
        ]
    }

    /// Load reference targets that exist and are of a relatable type.
    fn resolve_targets(
        &self,
        descriptor: &ResourceDescriptor,
        field: &FieldDefinition,
        values: &[FieldItem],
    ) -> Result<Vec<(ResourceIdentifier, ContentItem)>> {
        let mut targets = Vec::with_capacity(values.len());
        for value in values {
            let FieldItem::Reference { target, meta } = value else {
                continue;
            };
            let Some(loaded) = self.store.load(&target.entity_type, &target.id)? else {
                tracing::warn!(
                    resource_type = %descriptor.public_type(),
                    field = %field.public_name(),
                    target = %target.id,
                    "skipping dangling reference"
                );
                continue;
            };
            let Some(target_descriptor) = self.registry.for_item(&loaded) else {
                tracing::warn!(target = %target.id, "skipping reference to an unexposed type");
                continue;
            };
            if !field.targets.iter().any(|t| t == target_descriptor.public_type()) {
                tracing::warn!(
                    field = %field.public_name(),
                    target_type = %target_descriptor.public_type(),
                    "skipping reference to a type the field may not target"
                );
                continue;
            }
            let mut identifier = ResourceIdentifier::new(target_descriptor.public_type(), &loaded.id);
            identifier.meta = meta.clone();
            targets.push((identifier, loaded));
        }
        Ok(targets)
    }

    fn build_relationship(
        &self,
        descriptor: &Arc<ResourceDescriptor>,
        item: &ContentItem,
        field: &FieldDefinition,
        values: &[FieldItem],
        include: &IncludeTree,
        decision: Cacheability,
    ) -> Result<RelationshipNode> {
        let targets = self.resolve_targets(descriptor, field, values)?;
        let identifiers = targets
            .iter()
            .map(|(ident, _)| FieldItemNode::Identifier(ident.clone()))
            .collect();

        let nested = match include.get(field.public_name()) {
            Some(suffix) => {
                let mut entries = Vec::with_capacity(targets.len());
                for (_, target) in &targets {
                    entries.push(self.build_entry_memo(target, suffix)?);
                }
                Some(DocumentNode::collection(entries))
            }
            None => None,
        };

        Ok(RelationshipNode::new(
            FieldNode::new(
                field.public_name(),
                field.cardinality.is_multiple(),
                identifiers,
                decision,
            ),
            self.relationship_links(descriptor, item, field),
            nested,
        ))
    }

    // ==========================================================================
    // Access
    // ==========================================================================

    fn item_access(&self, descriptor: &ResourceDescriptor, item: &ContentItem, op: Operation) -> AccessResult {
        let key = (item.entity_type.clone(), item.id.clone(), op);
        if let Some(result) = self.item_decisions.borrow().get(&key) {
            return result.clone();
        }
        let result = self.policy.item_access(self.account, descriptor, item, op);
        self.item_decisions.borrow_mut().insert(key, result.clone());
        result
    }

    fn field_access(&self, descriptor: &ResourceDescriptor, field: &FieldDefinition, item: &ContentItem) -> AccessResult {
        let key = (
            item.entity_type.clone(),
            item.id.clone(),
            field.name.clone(),
            Operation::View,
        );
        if let Some(result) = self.field_decisions.borrow().get(&key) {
            return result.clone();
        }
        let result = self
            .policy
            .field_access(self.account, descriptor, field, Some(item), Operation::View);
        self.field_decisions.borrow_mut().insert(key, result.clone());
        result
    }
}

fn stored_values<'v>(
    stored: &'v std::collections::BTreeMap<String, Vec<FieldItem>>,
    field: &FieldDefinition,
) -> &'v [FieldItem] {
    stored.get(&field.name).map(Vec::as_slice).unwrap_or(&[])
}

fn escalate(inline: InlineError) -> TesseraError {
    TesseraError::AccessDenied {
        detail: inline
            .error
            .detail
            .unwrap_or_else(|| "The current user is not allowed to view this resource.".to_string()),
        pointer: "/data".to_string(),
        cacheability: inline.cacheability,
    }
}

/// Entry point document linking every locatable collection.
pub fn entry_point(registry: &DescriptorRegistry, links: &dyn LinkProvider) -> DocumentNode {
    let mut doc = DocumentNode::collection(Vec::new()).with_link("self", links.entry_point());
    for public_type in registry.public_types() {
        let locatable = registry
            .by_public_type(&public_type)
            .map(|d| d.is_locatable())
            .unwrap_or(false);
        if locatable {
            let link = links.collection(&public_type);
            doc = doc.with_link(public_type, link);
        }
    }
    doc
}

// =============================================================================
// Tests
// =============================================================================
