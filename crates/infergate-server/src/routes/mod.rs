//! API route modules.

pub mod commands;
pub mod completions;
pub mod health;
pub mod memory;
pub mod preferences;
pub mod status;
pub mod tokens;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::middleware::{auth_middleware, track_requests};
use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health_check));

    // Protected routes (require auth)
    let protected_routes = Router::new()
        .merge(completions::router())
        .merge(commands::router())
        .merge(memory::router())
        .merge(preferences::router())
        .merge(status::router())
        .merge(tokens::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
