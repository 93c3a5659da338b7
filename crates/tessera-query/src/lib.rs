//! Tessera Query - Query Parameter Compilers
//!
//! Turns client-supplied `filter`, `sort`, `page`, `include` and `fields`
//! query parameters into structures the query engine and the document
//! assembler consume.
//!
//! Key Features:
//! - Order-independent filter tree compiler with dangling-reference detection
//! - Dotted field path resolution across relationship chains
//! - Offset pagination that detects a next page without a count query
//! - Multi-key sort normalization
//! - In-memory query engine evaluating compiled predicate trees
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod engine;
pub mod filter;
pub mod include;
pub mod page;
pub mod params;
pub mod path;
pub mod sort;
pub mod tree;

pub use engine::{MemoryQuery, QueryEngine};
pub use filter::{
    Conjunction, ConditionDescriptor, FilterConditionNode, FilterDescriptor, FilterGroupNode,
    FilterNode, GroupDescriptor, Operator,
};
pub use include::IncludeTree;
pub use page::{OffsetPage, PageWindow};
pub use params::{QueryParams, SparseFieldsets};
pub use path::{FieldPathResolver, PathSegment, ResolvedPath, SegmentKind};
pub use sort::{Direction, SortKey};
pub use tree::compile;
