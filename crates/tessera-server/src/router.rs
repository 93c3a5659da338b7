//! Tessera Router
//!
//! HTTP router configuration with middleware stack. Mounts the JSON:API
//! routes under the configured base path.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::handlers;
use crate::middleware;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// =============================================================================
// Router
// =============================================================================

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/", get(handlers::get_entry_point))
        .route(
            "/:resource_type",
            get(handlers::get_collection).post(handlers::create_resource),
        )
        .route(
            "/:resource_type/:id",
            get(handlers::get_individual)
                .patch(handlers::update_resource)
                .delete(handlers::delete_resource),
        )
        .route("/:resource_type/:id/:field", get(handlers::get_related))
        .route(
            "/:resource_type/:id/relationships/:field",
            get(handlers::get_relationship)
                .post(handlers::add_relationship)
                .patch(handlers::replace_relationship)
                .delete(handlers::remove_relationship),
        );

    let base_path = state.config.api.base_path.trim_end_matches('/').to_string();
    let router = Router::new().route("/health", get(handlers::health_check));
    let router = if base_path.is_empty() {
        router.merge(api_routes)
    } else {
        router.nest(&base_path, api_routes)
    };

    let mut router = router
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(middleware::media_type))
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(TraceLayer::new_for_http());

    if state.config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================
