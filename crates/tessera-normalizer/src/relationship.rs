//! Tessera Relationship Mutation
//!
//! Applies `POST`, `PATCH` and `DELETE` against a relationship endpoint and
//! decides which status the response carries. A `204` means the relationship
//! now holds exactly what the client sent, so there is nothing to report
//! back; otherwise the server answers `200` with the full relationship.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::denormalize::{parse_linkage, Denormalizer};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tessera_common::{Result, TesseraError, Violation};
use tessera_resource::{ContentItem, FieldItem, ItemRef, Operation, ResourceDescriptor};

/// Mutation requested on a relationship endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipOp {
    /// `POST`: append targets not already present.
    Add,
    /// `PATCH`: replace the whole relationship.
    Replace,
    /// `DELETE`: remove the given targets.
    Remove,
}

/// Item after the mutation plus the response status.
#[derive(Debug, Clone)]
pub struct RelationshipOutcome {
    pub item: ContentItem,
    pub status: u16,
}

impl RelationshipOutcome {
    pub fn is_no_content(&self) -> bool {
        self.status == 204
    }
}

fn targets(items: &[FieldItem]) -> Vec<&ItemRef> {
    items.iter().filter_map(FieldItem::as_reference).collect()
}

/// Append every requested target that is not already present, keeping the
/// stored order. Duplicates inside the request collapse as well.
fn add_targets(existing: &[FieldItem], requested: &[FieldItem]) -> Vec<FieldItem> {
    let mut result = existing.to_vec();
    for item in requested {
        let Some(target) = item.as_reference() else {
            continue;
        };
        if !targets(&result).contains(&target) {
            result.push(item.clone());
        }
    }
    result
}

fn remove_targets(existing: &[FieldItem], requested: &[FieldItem]) -> Vec<FieldItem> {
    let removed = targets(requested);
    existing
        .iter()
        .filter(|item| match item.as_reference() {
            Some(target) => !removed.contains(&target),
            None => true,
        })
        .cloned()
        .collect()
}

/// Response status for a relationship mutation.
///
/// `DELETE` always answers `204`. `POST` and `PATCH` answer `204` only when
/// the resulting ordered target list equals the requested list; any other
/// result, including a reordering the server did not apply, answers `200`.
pub fn outcome_status(op: RelationshipOp, requested: &[FieldItem], result: &[FieldItem]) -> u16 {
    match op {
        RelationshipOp::Remove => 204,
        RelationshipOp::Add | RelationshipOp::Replace => {
            if targets(requested) == targets(result) {
                204
            } else {
                200
            }
        }
    }
}

impl<'a> Denormalizer<'a> {
    /// Mutate the relationship `public_field` of `existing` and persist it.
    pub fn mutate_relationship(
        &self,
        op: RelationshipOp,
        descriptor: &Arc<ResourceDescriptor>,
        existing: &ContentItem,
        public_field: &str,
        body: &JsonValue,
    ) -> Result<RelationshipOutcome> {
        let field = descriptor
            .field_by_public(public_field)
            .filter(|f| f.is_relationship())
            .ok_or_else(|| {
                TesseraError::NotFound(format!(
                    "The relationship `{}` does not exist on {}.",
                    public_field,
                    descriptor.public_type()
                ))
            })?;
        if !descriptor.is_mutable() {
            return Err(TesseraError::MethodNotAllowed(format!(
                "{} resources cannot be modified.",
                descriptor.public_type()
            )));
        }
        if op != RelationshipOp::Replace && !field.cardinality.is_multiple() {
            return Err(TesseraError::Parse(format!(
                "Targets can only be added to or removed from a to-many relationship; `{}` is to-one.",
                public_field
            )));
        }

        self.check_item(descriptor, existing, Operation::Update)?;
        let access = self
            .policy()
            .field_access(self.account(), descriptor, field, Some(existing), Operation::Update);
        if access.is_denied() {
            return Err(TesseraError::AccessDenied {
                detail: access
                    .reason()
                    .unwrap_or("The current user is not allowed to edit this relationship.")
                    .to_string(),
                pointer: "/data".to_string(),
                cacheability: access.cacheability().clone(),
            });
        }

        let data = body
            .as_object()
            .and_then(|obj| obj.get("data"))
            .ok_or_else(|| TesseraError::Parse("The request document must contain a `data` member.".to_string()))?;
        let mut violations = Vec::new();
        let requested = parse_linkage(self.registry(), self.store(), field, data, &mut violations)?;
        if field.read_only {
            violations.push(Violation::new(
                field.pointer(),
                format!("{}: This field is read-only.", field.public_name()),
            ));
        }

        let current = existing.get(&field.name);
        let result = match op {
            RelationshipOp::Add => add_targets(current, &requested),
            RelationshipOp::Replace => requested.clone(),
            RelationshipOp::Remove => remove_targets(current, &requested),
        };

        let mut item = existing.clone();
        item.set(field.name.clone(), result);
        self.finish(descriptor, &item, violations)?;
        self.store().update(item.clone())?;

        let status = outcome_status(op, &requested, item.get(&field.name));
        tracing::debug!(
            resource_type = %descriptor.public_type(),
            id = %item.id,
            field = %public_field,
            op = ?op,
            status,
            "mutated relationship"
        );
        Ok(RelationshipOutcome { item, status })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_resource::{
        Account, AllowAll, ContentStore, DescriptorRegistry, FieldDefinition, MemoryStore,
        ResourceDefinition,
    };

    struct Fixture {
        registry: DescriptorRegistry,
        store: MemoryStore,
        account: Account,
    }

    impl Fixture {
        fn new(tags: &[&str]) -> Self {
            let registry = DescriptorRegistry::new(vec![
                ResourceDefinition::new("node", "article")
                    .field(FieldDefinition::attribute("title"))
                    .field(FieldDefinition::relationship("uid", ["user--user"]).alias("author"))
                    .field(
                        FieldDefinition::relationship("field_tags", ["taxonomy_term--tags"])
                            .alias("tags")
                            .limited(3),
                    ),
                ResourceDefinition::new("user", "user"),
                ResourceDefinition::new("taxonomy_term", "tags"),
            ])
            .unwrap();

            let mut article = ContentItem::new("node", "article", "a1").with_reference("uid", "user", "u1");
            for tag in tags {
                article = article.with_reference("field_tags", "taxonomy_term", *tag);
            }
            let mut items = vec![ContentItem::new("user", "user", "u1"), ContentItem::new("user", "user", "u2")];
            for id in ["t1", "t2", "t3", "t4"] {
                items.push(ContentItem::new("taxonomy_term", "tags", id));
            }
            items.push(article);

            Self {
                registry,
                store: MemoryStore::with_items(items).unwrap(),
                account: Account::anonymous(),
            }
        }

        fn run(&self, op: RelationshipOp, field: &str, body: JsonValue) -> Result<RelationshipOutcome> {
            let writer = Denormalizer::new(&self.registry, &self.store, &AllowAll, &self.account);
            let descriptor = self.registry.by_public_type("node--article").unwrap();
            let existing = self.store.load("node", "a1").unwrap().unwrap();
            writer.mutate_relationship(op, &descriptor, &existing, field, &body)
        }

        fn tag_ids(&self) -> Vec<String> {
            let item = self.store.load("node", "a1").unwrap().unwrap();
            item.references("field_tags").iter().map(|r| r.id.clone()).collect()
        }
    }

    fn tags(ids: &[&str]) -> JsonValue {
        json!({"data": ids.iter().map(|id| json!({"type": "taxonomy_term--tags", "id": id})).collect::<Vec<_>>()})
    }

    #[test]
    fn test_add_to_empty_relationship_is_no_content() {
        let fx = Fixture::new(&[]);
        let outcome = fx.run(RelationshipOp::Add, "tags", tags(&["t1", "t2"])).unwrap();
        assert!(outcome.is_no_content());
        assert_eq!(fx.tag_ids(), vec!["t1", "t2"]);
    }

    #[test]
    fn test_add_never_duplicates() {
        let fx = Fixture::new(&["t1"]);
        let outcome = fx.run(RelationshipOp::Add, "tags", tags(&["t2", "t1", "t2"])).unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(fx.tag_ids(), vec!["t1", "t2"]);
    }

    #[test]
    fn test_reorder_without_addition_keeps_stored_order() {
        let fx = Fixture::new(&["t1", "t2"]);
        let outcome = fx.run(RelationshipOp::Add, "tags", tags(&["t2", "t1"])).unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(fx.tag_ids(), vec!["t1", "t2"]);
    }

    #[test]
    fn test_replace_and_remove() {
        let fx = Fixture::new(&["t1", "t2", "t3"]);
        let outcome = fx.run(RelationshipOp::Replace, "tags", tags(&["t3", "t1"])).unwrap();
        assert!(outcome.is_no_content());
        assert_eq!(fx.tag_ids(), vec!["t3", "t1"]);

        let outcome = fx.run(RelationshipOp::Remove, "tags", tags(&["t3", "t4"])).unwrap();
        assert!(outcome.is_no_content());
        assert_eq!(fx.tag_ids(), vec!["t1"]);
    }

    #[test]
    fn test_to_one_relationship_rules() {
        let fx = Fixture::new(&[]);
        let body = json!({"data": {"type": "user--user", "id": "u2"}});
        assert_eq!(fx.run(RelationshipOp::Add, "author", body.clone()).unwrap_err().status_code(), 400);

        let outcome = fx.run(RelationshipOp::Replace, "author", body).unwrap();
        assert!(outcome.is_no_content());
        assert_eq!(outcome.item.references("uid")[0].id, "u2");

        let outcome = fx.run(RelationshipOp::Replace, "author", json!({"data": null})).unwrap();
        assert!(outcome.item.references("uid").is_empty());
    }

    #[test]
    fn test_cardinality_and_unknown_field() {
        let fx = Fixture::new(&["t1", "t2", "t3"]);
        let err = fx.run(RelationshipOp::Add, "tags", tags(&["t4"])).unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert_eq!(fx.tag_ids(), vec!["t1", "t2", "t3"]);

        let err = fx.run(RelationshipOp::Add, "title", tags(&["t4"])).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
