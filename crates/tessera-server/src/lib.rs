//! Tessera Server - JSON:API Gateway
//!
//! HTTP surface for the Tessera document core. Serves collections,
//! individual resources, related resources and relationships, and accepts
//! writes against the same routes.
//!
//! Key Features:
//! - Routes nested under a configurable base path
//! - Cache-Control, X-Cache-Tags and X-Cache-Contexts from document cacheability
//! - Media type negotiation and request IDs as middleware
//! - Schema, roles and seed data loaded from TOML and JSON files
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use handlers::{ApiError, JsonApiResponse, JSONAPI_MEDIA_TYPE};
pub use router::create_router;
pub use state::{account_from_headers, AppState};
