//! Tessera Filter Tree Compiler
//!
//! Reassembles the flat, unordered filter map into a nested predicate tree.
//! A descriptor may name a parent group that has not been placed yet, so
//! nodes cycle through a work queue until their parent appears. A full pass
//! that places nothing means a cycle or a reference to a missing group.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::filter::{Conjunction, FilterConditionNode, FilterDescriptor, FilterGroupNode, FilterNode};
use std::collections::{HashSet, VecDeque};
use tessera_common::{Result, TesseraError};

/// Id of the implicit AND group every top-level node belongs to.
pub const ROOT_GROUP_ID: &str = "@root";

// =============================================================================
// Compiler
// =============================================================================

/// Compile filter descriptors into a predicate tree rooted at `@root`.
pub fn compile<I>(descriptors: I) -> Result<FilterGroupNode>
where
    I: IntoIterator<Item = (String, FilterDescriptor)>,
{
    let mut seen = HashSet::new();
    let mut condition_ids = HashSet::new();
    let mut worklist = VecDeque::new();

    for (id, descriptor) in descriptors {
        if id == ROOT_GROUP_ID || !seen.insert(id.clone()) {
            return Err(TesseraError::Parse(format!(
                "The filter id `{}` is reserved or used twice.",
                id
            )));
        }
        let node = match &descriptor {
            FilterDescriptor::Condition(condition) => {
                condition_ids.insert(id.clone());
                FilterNode::Condition(FilterConditionNode::from_descriptor(id, condition)?)
            }
            FilterDescriptor::Group(group) => FilterNode::Group(FilterGroupNode::new(
                id,
                group.conjunction,
                group.member_of.clone(),
            )),
        };
        worklist.push_back(node);
    }

    let mut root = FilterGroupNode::new(ROOT_GROUP_ID, Conjunction::And, None);
    let mut placed_groups: HashSet<String> = HashSet::from([ROOT_GROUP_ID.to_string()]);

    // A node can wait at most once per placement of another node.
    let total = worklist.len();
    let iteration_cap = total * (total + 1) + 1;
    let mut iterations = 0;
    let mut stalled = 0;

    while let Some(node) = worklist.pop_front() {
        iterations += 1;
        if iterations > iteration_cap {
            return Err(dangling(&node));
        }

        let parent = node.member_of().unwrap_or(ROOT_GROUP_ID).to_string();
        if condition_ids.contains(&parent) {
            return Err(TesseraError::Parse(format!(
                "The filter `{}` is a member of `{}`, which is a condition and not a group.",
                node.id(),
                parent
            )));
        }

        if placed_groups.contains(&parent) {
            if let FilterNode::Group(group) = &node {
                placed_groups.insert(group.id.clone());
            }
            match root.find_group_mut(&parent) {
                Some(group) => group.children.push(node),
                None => {
                    return Err(TesseraError::Internal(format!(
                        "placed filter group `{}` missing from tree",
                        parent
                    )))
                }
            }
            stalled = 0;
            continue;
        }

        stalled += 1;
        if stalled > worklist.len() {
            return Err(dangling(&node));
        }
        worklist.push_back(node);
    }

    root.sort_children();
    tracing::debug!(nodes = total, iterations, "compiled filter tree");
    Ok(root)
}

fn dangling(node: &FilterNode) -> TesseraError {
    tracing::warn!(filter = %node.id(), "dangling filter group reference");
    TesseraError::Parse(format!(
        "Invalid filter: dangling filter group reference `{}` in `{}`.",
        node.member_of().unwrap_or(ROOT_GROUP_ID),
        node.id()
    ))
}

// =============================================================================
// Tests
// =============================================================================
