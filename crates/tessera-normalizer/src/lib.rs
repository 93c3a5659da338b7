//! Tessera Normalizer - Document Assembly
//!
//! Builds JSON:API documents as trees of immutable value nodes, each
//! carrying its own cacheability, and turns incoming documents back into
//! content items.
//!
//! Key Features:
//! - Closed set of node variants rasterized in one terminal pass
//! - Access decisions folded into the tree instead of failing the request
//! - Compound documents with deduplicated `included` resources
//! - Write parsing that reports every constraint violation at once
//! - Relationship mutations with explicit response status rules
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod builder;
pub mod denormalize;
pub mod document;
pub mod error;
pub mod include;
pub mod link;
pub mod node;
pub mod relationship;

pub use builder::{entry_point, DocumentBuilder, Primary};
pub use denormalize::{Denormalizer, ResourceObject};
pub use document::{DocumentNode, Entry, PrimaryData, JSONAPI_VERSION};
pub use error::{ErrorObject, InlineError};
pub use include::{collect, Collected};
pub use link::{Link, LinkProvider, UrlLinkProvider, SITE_CACHE_CONTEXT};
pub use node::{
    FieldEntry, FieldItemNode, FieldNode, Projection, Rasterize, RelationshipNode,
    ResourceIdentifier, ResourceNode,
};
pub use relationship::{outcome_status, RelationshipOp, RelationshipOutcome};
