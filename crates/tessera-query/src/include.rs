//! Tessera Include Paths
//!
//! `include=author,tags.vocabulary` parsed into a tree keyed by the head
//! segment, so each level of document assembly can hand the remaining
//! suffix down to the next.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tessera_resource::{DescriptorRegistry, ResourceDescriptor};

/// Requested include paths, nested by segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list of dotted paths.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut tree = Self::new();
        for path in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            tree.insert(path)?;
        }
        Ok(tree)
    }

    fn insert(&mut self, path: &str) -> Result<()> {
        let mut node = self;
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(TesseraError::Parse(format!(
                    "The include path `{}` contains an empty segment.",
                    path
                )));
            }
            node = node.children.entry(segment.to_string()).or_default();
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Remaining paths below `head`, if `head` was requested.
    pub fn get(&self, head: &str) -> Option<&IncludeTree> {
        self.children.get(head)
    }

    pub fn heads(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Flattened dotted paths, leaves only.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (head, child) in &self.children {
            if child.is_empty() {
                out.push(head.clone());
            } else {
                out.extend(child.paths().into_iter().map(|p| format!("{}.{}", head, p)));
            }
        }
        out
    }

    /// Check every segment names a relationship on at least one of the
    /// candidate types reachable at that depth.
    pub fn validate(&self, registry: &DescriptorRegistry, root: &Arc<ResourceDescriptor>) -> Result<()> {
        self.validate_level(registry, &[Arc::clone(root)], "")
    }

    fn validate_level(
        &self,
        registry: &DescriptorRegistry,
        candidates: &[Arc<ResourceDescriptor>],
        prefix: &str,
    ) -> Result<()> {
        for (head, child) in &self.children {
            let path = if prefix.is_empty() {
                head.clone()
            } else {
                format!("{}.{}", prefix, head)
            };

            let owners: Vec<&Arc<ResourceDescriptor>> =
                candidates.iter().filter(|d| d.is_relationship(head)).collect();
            if owners.is_empty() {
                return Err(TesseraError::FieldResolution(format!(
                    "`{}` is not present on type `{}`. Invalid include path `{}`.",
                    head,
                    candidates
                        .iter()
                        .map(|d| d.public_type())
                        .collect::<Vec<_>>()
                        .join(", "),
                    path
                )));
            }

            if !child.is_empty() {
                let mut next: Vec<Arc<ResourceDescriptor>> = Vec::new();
                for owner in owners {
                    for target in registry.relatable(owner, head) {
                        if !next.iter().any(|d| d.public_type() == target.public_type()) {
                            next.push(target);
                        }
                    }
                }
                child.validate_level(registry, &next, &path)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
