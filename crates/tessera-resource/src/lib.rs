//! Tessera Resource - Content Model and Collaborators
//!
//! Static metadata describing every exposed resource subtype, the content
//! items those descriptors describe, and the narrow collaborator interfaces
//! the document core consumes: a content store and an access policy.
//!
//! Key Features:
//! - Immutable resource descriptors with internal/public field mapping
//! - Process-wide descriptor registry, built lazily and memoized
//! - In-memory content store with conflict and not-found semantics
//! - Role-based access policy with field-level rules
//! - Constraint validation that reports every violation at once
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod access;
pub mod descriptor;
pub mod item;
pub mod registry;
pub mod store;
pub mod validation;

pub use access::{
    AccessPolicy, AccessResult, Account, AllowAll, Operation, Permission, RoleDefinition,
    RolePolicy,
};
pub use descriptor::{
    Cardinality, FieldDefinition, FieldKind, ResourceDefinition, ResourceDescriptor,
};
pub use item::{ContentItem, FieldItem, ItemRef};
pub use registry::DescriptorRegistry;
pub use store::{ContentStore, MemoryStore};
pub use validation::validate_item;
