//! Authentication middleware for infergate-server.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::AppState;

/// Header naming the principal a service-token request acts for
pub const PRINCIPAL_HEADER: &str = "X-Infergate-Principal";

/// Authentication context extracted from request
#[derive(Debug, Clone, PartialEq)]
pub enum AuthContext {
    /// Authenticated via the service token
    Service { principal_id: String },
    /// Authenticated via a principal token
    Principal { principal_id: String },
}

impl AuthContext {
    /// Get the principal ID from any auth context
    pub fn principal_id(&self) -> &str {
        match self {
            AuthContext::Service { principal_id } => principal_id,
            AuthContext::Principal { principal_id } => principal_id,
        }
    }
}

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (error, code) = match self {
            AuthError::MissingToken => ("Missing authentication token", "MISSING_TOKEN"),
            AuthError::InvalidToken => ("Invalid authentication token", "INVALID_TOKEN"),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        });

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Authentication middleware for axum
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    // Strip any "Bearer " prefix
    let token = match request.headers().get(header::AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?
            .trim_start_matches("Bearer ")
            .trim()
            .to_string(),
        None => return Err(AuthError::MissingToken),
    };
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    // Check against service token first
    let auth_context = if state.service_token.verify(&token) {
        let principal_id = request
            .headers()
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| state.engine.sessions().bootstrap_principal().to_string());

        AuthContext::Service { principal_id }
    } else if let Some(entry) = state.principal_tokens.validate(&token).await {
        if let Err(e) = state.engine.database().touch_principal_token(&entry.token_id) {
            warn!(token_id = %entry.token_id, error = %e, "Failed to record token use");
        }
        debug!(token = %entry.name, principal = %entry.principal_id, "Principal token accepted");
        AuthContext::Principal {
            principal_id: entry.principal_id,
        }
    } else {
        debug!("Rejected request with unknown credential");
        return Err(AuthError::InvalidToken);
    };

    state.engine.sessions().ensure(auth_context.principal_id()).await;

    // Add auth context to request extensions
    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}
