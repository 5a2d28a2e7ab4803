//! Request middleware.

mod auth;

pub use auth::{AuthContext, PRINCIPAL_HEADER, auth_middleware};

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::state::AppState;

/// Count requests in flight for the health endpoint
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    state.active_requests.fetch_add(1, Ordering::SeqCst);
    let response = next.run(request).await;
    state.active_requests.fetch_sub(1, Ordering::SeqCst);
    response
}
