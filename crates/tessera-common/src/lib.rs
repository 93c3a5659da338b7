//! Tessera Common - Shared Types and Utilities
//!
//! Foundational types shared by every Tessera crate: the request-level
//! error taxonomy, the mergeable cacheability accumulator attached to
//! every value node, and the API configuration.
//!
//! Key Features:
//! - Unified error type with HTTP status classification
//! - Cacheability metadata with associative union/union/min merge
//! - Serde-backed API configuration with sensible defaults
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod cacheability;
pub mod config;
pub mod error;

pub use cacheability::{Cacheability, MaxAge};
pub use config::ApiConfig;
pub use error::{Result, TesseraError, Violation};
