//! Tessera Include Collector
//!
//! Flattens every nested document reachable through relationships into the
//! compound document's `included` member. Each `(type, id)` appears once,
//! in first-reached depth-first order. Resources already present in the
//! primary data are never repeated.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::document::{DocumentNode, Entry, PrimaryData};
use crate::error::InlineError;
use crate::node::{RelationshipNode, ResourceNode};
use std::collections::HashSet;

/// Output of the collector.
#[derive(Debug, Default)]
pub struct Collected<'a> {
    pub resources: Vec<&'a ResourceNode>,
    /// Inline errors found in nested documents.
    pub errors: Vec<&'a InlineError>,
}

struct Collector<'a> {
    seen: HashSet<(&'a str, &'a str)>,
    seen_errors: HashSet<(&'a str, &'a str)>,
    out: Collected<'a>,
}

impl<'a> Collector<'a> {
    fn visit_relationships(&mut self, resource: &'a ResourceNode) {
        for relationship in resource.relationships() {
            self.visit_relationship(relationship);
        }
    }

    fn visit_relationship(&mut self, relationship: &'a RelationshipNode) {
        let Some(nested) = relationship.included.as_deref() else {
            return;
        };
        let PrimaryData::Collection(entries) = &nested.data else {
            return;
        };
        for entry in entries {
            match entry {
                Entry::Resource(resource) => {
                    let key = (resource.resource_type(), resource.id());
                    if self.seen.insert(key) {
                        self.out.resources.push(resource);
                    }
                    // A duplicate may have been reached through a different
                    // include path, so its own inclusions are still walked.
                    self.visit_relationships(resource);
                }
                Entry::Error(error) => {
                    let fresh = match error.source_key() {
                        Some(key) => self.seen_errors.insert(key),
                        None => true,
                    };
                    if fresh {
                        self.out.errors.push(error);
                    }
                }
            }
        }
    }
}

/// Gather the deduplicated included resources of `root`.
pub fn collect(root: &DocumentNode) -> Collected<'_> {
    let mut collector = Collector {
        seen: HashSet::new(),
        seen_errors: HashSet::new(),
        out: Collected::default(),
    };

    let primary = root.resources();
    for resource in &primary {
        collector.seen.insert((resource.resource_type(), resource.id()));
    }
    for resource in primary {
        collector.visit_relationships(resource);
    }
    if let PrimaryData::Relationship(relationship) = &root.data {
        collector.visit_relationship(relationship);
    }

    collector.out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FieldEntry, FieldItemNode, FieldNode, Projection, ResourceIdentifier};
    use tessera_common::Cacheability;

    fn leaf(t: &str, id: &str) -> ResourceNode {
        with_relationships(t, id, Vec::new())
    }

    fn with_relationships(t: &str, id: &str, rels: Vec<RelationshipNode>) -> ResourceNode {
        ResourceNode::new(
            ResourceIdentifier::new(t, id),
            Projection::Full,
            rels.into_iter().map(FieldEntry::Relationship).collect(),
            None,
            Cacheability::new(),
        )
    }

    fn included(name: &str, targets: Vec<ResourceNode>) -> RelationshipNode {
        let items = targets
            .iter()
            .map(|t| FieldItemNode::Identifier(t.identifier.clone()))
            .collect();
        let nested = DocumentNode::collection(targets.into_iter().map(Entry::Resource).collect());
        RelationshipNode::new(
            FieldNode::new(name, true, items, Cacheability::new()),
            Vec::new(),
            Some(nested),
        )
    }

    fn keys(collected: &Collected<'_>) -> Vec<String> {
        collected
            .resources
            .iter()
            .map(|r| format!("{}:{}", r.resource_type(), r.id()))
            .collect()
    }

    #[test]
    fn test_shared_targets_deduplicated_in_first_seen_order() {
        // Three articles reach tags t1, t2, t1, t3, t2: five traversals, three targets.
        let doc = DocumentNode::collection(vec![
            Entry::Resource(with_relationships(
                "article",
                "a1",
                vec![included("tags", vec![leaf("tag", "t1"), leaf("tag", "t2")])],
            )),
            Entry::Resource(with_relationships(
                "article",
                "a2",
                vec![included("tags", vec![leaf("tag", "t1"), leaf("tag", "t3")])],
            )),
            Entry::Resource(with_relationships(
                "article",
                "a3",
                vec![included("tags", vec![leaf("tag", "t2")])],
            )),
        ]);

        let collected = collect(&doc);
        assert_eq!(keys(&collected), vec!["tag:t1", "tag:t2", "tag:t3"]);
    }

    #[test]
    fn test_deep_chains_are_flattened() {
        let role = leaf("role", "editor");
        let author = with_relationships("user", "u1", vec![included("roles", vec![role])]);
        let doc = DocumentNode::single(with_relationships(
            "article",
            "a1",
            vec![included("author", vec![author])],
        ));
        assert_eq!(keys(&collect(&doc)), vec!["user:u1", "role:editor"]);
    }

    #[test]
    fn test_duplicate_reached_by_other_path_still_walked() {
        let plain_author = leaf("user", "u1");
        let editor_with_roles =
            with_relationships("user", "u1", vec![included("roles", vec![leaf("role", "admin")])]);
        let doc = DocumentNode::single(with_relationships(
            "article",
            "a1",
            vec![
                included("author", vec![plain_author]),
                included("editor", vec![editor_with_roles]),
            ],
        ));
        assert_eq!(keys(&collect(&doc)), vec!["user:u1", "role:admin"]);
    }

    #[test]
    fn test_primary_resources_not_included() {
        let doc = DocumentNode::collection(vec![
            Entry::Resource(with_relationships(
                "article",
                "a1",
                vec![included("related", vec![leaf("article", "a2")])],
            )),
            Entry::Resource(leaf("article", "a2")),
        ]);
        assert!(collect(&doc).resources.is_empty());
    }
}
