//! Tessera Field Paths
//!
//! Resolves dotted public paths such as `author.profile.name` by walking
//! the relationship chain of each resource subtype. Every segment is
//! translated into the internal field name per candidate subtype, so the
//! query engine can traverse references without knowing public aliases.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tessera_resource::{DescriptorRegistry, ResourceDescriptor};

/// Final path segment that addresses the resource identifier.
pub const ID_SEGMENT: &str = "id";

// =============================================================================
// Resolved Path
// =============================================================================

/// What a resolved segment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Follow a reference field to its targets.
    Reference,
    /// Read the values of a field (final segment).
    Field,
    /// Read the identifier of the current item (final segment).
    Id,
}

/// One step of a resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub public: String,
    pub kind: SegmentKind,
    /// Internal field name keyed by the public type it applies to.
    pub internal: BTreeMap<String, String>,
}

impl PathSegment {
    /// Internal field name to use for an item of `public_type`.
    pub fn internal_for(&self, public_type: &str) -> Option<&str> {
        self.internal.get(public_type).map(String::as_str)
    }
}

/// A dotted public path translated into internal traversal steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub public: String,
    pub segments: Vec<PathSegment>,
}

impl ResolvedPath {
    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment.kind {
                SegmentKind::Reference => {
                    let name = segment.internal.values().next().cloned().unwrap_or_default();
                    format!("{}.entity", name)
                }
                SegmentKind::Field => segment.internal.values().next().cloned().unwrap_or_default(),
                SegmentKind::Id => ID_SEGMENT.to_string(),
            })
            .collect();
        f.write_str(&parts.join("."))
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves public paths against the descriptor registry.
pub struct FieldPathResolver<'a> {
    registry: &'a DescriptorRegistry,
}

impl<'a> FieldPathResolver<'a> {
    pub fn new(registry: &'a DescriptorRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `path` starting at `root`.
    pub fn resolve(&self, root: &Arc<ResourceDescriptor>, path: &str) -> Result<ResolvedPath> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(TesseraError::FieldResolution(format!(
                "The field path `{}` contains an empty segment.",
                path
            )));
        }

        let mut candidates = vec![Arc::clone(root)];
        let mut segments = Vec::with_capacity(parts.len());

        for (idx, part) in parts.iter().enumerate() {
            let last = idx + 1 == parts.len();

            if last && *part == ID_SEGMENT {
                segments.push(PathSegment {
                    public: part.to_string(),
                    kind: SegmentKind::Id,
                    internal: candidates
                        .iter()
                        .map(|d| (d.public_type().to_string(), ID_SEGMENT.to_string()))
                        .collect(),
                });
                break;
            }

            let matches: Vec<&Arc<ResourceDescriptor>> = candidates
                .iter()
                .filter(|d| d.field_by_public(part).is_some())
                .collect();
            if matches.is_empty() {
                let detail = if last {
                    format!(
                        "Invalid field path. The field `{}`, given in the path `{}`, does not exist.",
                        part, path
                    )
                } else {
                    format!(
                        "Invalid nested filtering. The field `{}`, given in the path `{}`, does not exist.",
                        part, path
                    )
                };
                return Err(TesseraError::FieldResolution(detail));
            }

            if last {
                segments.push(PathSegment {
                    public: part.to_string(),
                    kind: SegmentKind::Field,
                    internal: internal_names(&matches, part),
                });
                break;
            }

            let references: Vec<&Arc<ResourceDescriptor>> = matches
                .into_iter()
                .filter(|d| d.is_relationship(part))
                .collect();
            if references.is_empty() {
                return Err(TesseraError::FieldResolution(format!(
                    "Invalid nested filtering. The field `{}`, given in the path `{}`, is not a relationship field.",
                    part, path
                )));
            }

            segments.push(PathSegment {
                public: part.to_string(),
                kind: SegmentKind::Reference,
                internal: internal_names(&references, part),
            });

            let mut next: Vec<Arc<ResourceDescriptor>> = Vec::new();
            for descriptor in references {
                for target in self.registry.relatable(descriptor, part) {
                    if !next.iter().any(|d| d.public_type() == target.public_type()) {
                        next.push(target);
                    }
                }
            }
            candidates = next;
        }

        let resolved = ResolvedPath {
            public: path.to_string(),
            segments,
        };
        tracing::debug!(public = %path, internal = %resolved, "resolved field path");
        Ok(resolved)
    }
}

fn internal_names(descriptors: &[&Arc<ResourceDescriptor>], public: &str) -> BTreeMap<String, String> {
    descriptors
        .iter()
        .filter_map(|d| {
            d.internal_name(public)
                .map(|internal| (d.public_type().to_string(), internal.to_string()))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_resource::{FieldDefinition, ResourceDefinition};

    fn registry() -> DescriptorRegistry {
        DescriptorRegistry::new(vec![
            ResourceDefinition::new("node", "article")
                .field(FieldDefinition::attribute("title"))
                .field(FieldDefinition::relationship("uid", ["user--user"]).alias("author")),
            ResourceDefinition::new("user", "user")
                .field(FieldDefinition::attribute("name"))
                .field(FieldDefinition::relationship("field_profile", ["profile--main"]).alias("profile")),
            ResourceDefinition::new("profile", "main")
                .field(FieldDefinition::attribute("display_name").alias("name")),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_simple_attribute() {
        let registry = registry();
        let article = registry.by_public_type("node--article").unwrap();
        let resolved = FieldPathResolver::new(&registry).resolve(&article, "title").unwrap();

        assert_eq!(resolved.segments.len(), 1);
        assert_eq!(resolved.segments[0].kind, SegmentKind::Field);
        assert_eq!(resolved.segments[0].internal_for("node--article"), Some("title"));
    }

    #[test]
    fn test_resolve_nested_path() {
        let registry = registry();
        let article = registry.by_public_type("node--article").unwrap();
        let resolved = FieldPathResolver::new(&registry)
            .resolve(&article, "author.profile.name")
            .unwrap();

        let kinds: Vec<SegmentKind> = resolved.segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SegmentKind::Reference, SegmentKind::Reference, SegmentKind::Field]
        );
        assert_eq!(resolved.segments[0].internal_for("node--article"), Some("uid"));
        assert_eq!(resolved.segments[1].internal_for("user--user"), Some("field_profile"));
        assert_eq!(resolved.segments[2].internal_for("profile--main"), Some("display_name"));
        assert_eq!(resolved.to_string(), "uid.entity.field_profile.entity.display_name");
    }

    #[test]
    fn test_resolve_id_segment() {
        let registry = registry();
        let article = registry.by_public_type("node--article").unwrap();
        let resolved = FieldPathResolver::new(&registry).resolve(&article, "author.id").unwrap();
        assert_eq!(resolved.last().map(|s| s.kind), Some(SegmentKind::Id));
    }

    #[test]
    fn test_attribute_cannot_be_traversed() {
        let registry = registry();
        let article = registry.by_public_type("node--article").unwrap();
        let err = FieldPathResolver::new(&registry)
            .resolve(&article, "title.value")
            .unwrap_err();
        assert!(err.to_string().contains("is not a relationship field"));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_unknown_segment() {
        let registry = registry();
        let article = registry.by_public_type("node--article").unwrap();
        let resolver = FieldPathResolver::new(&registry);

        let err = resolver.resolve(&article, "author.missing").unwrap_err();
        assert!(err.to_string().contains("`missing`"));

        let err = resolver.resolve(&article, "nope.name").unwrap_err();
        assert!(err.to_string().contains("Invalid nested filtering"));

        assert!(resolver.resolve(&article, "author..name").is_err());
    }
}
