//! Principal token management routes.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use infergate_core::auth::IssuedKey;
use infergate_core::db::{NewPrincipalToken, PrincipalToken};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthContext;
use crate::state::{AppState, TokenEntry};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tokens", get(list_tokens).post(create_token))
        .route("/tokens/{id}", delete(revoke_token))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Token list item (hides the hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenListItem {
    pub id: String,
    pub principal_id: String,
    pub name: String,
    pub key_prefix: String,
    pub last_used_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl From<PrincipalToken> for TokenListItem {
    fn from(token: PrincipalToken) -> Self {
        Self {
            id: token.id,
            principal_id: token.principal_id,
            name: token.name,
            key_prefix: token.key_prefix,
            last_used_at: token.last_used_at,
            expires_at: token.expires_at,
            created_at: token.created_at,
        }
    }
}

/// Request to create a new token
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    /// Unix millis
    pub expires_at: Option<i64>,
}

/// Returned once at creation; the raw key is not recoverable afterwards
#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    #[serde(flatten)]
    pub token: TokenListItem,
    pub raw_key: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// List tokens for the authenticated principal
async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TokenListItem>>> {
    let tokens = state
        .engine
        .database()
        .list_principal_tokens(Some(auth.principal_id()))?;
    Ok(Json(tokens.into_iter().map(Into::into).collect()))
}

/// Issue a new token for the authenticated principal
async fn create_token(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateTokenRequest>,
) -> ApiResult<(StatusCode, Json<CreateTokenResponse>)> {
    let principal_id = auth.principal_id();
    let key = IssuedKey::generate();

    let token = state.engine.database().create_principal_token(&NewPrincipalToken {
        principal_id: principal_id.to_string(),
        name: input.name,
        key_prefix: key.prefix.clone(),
        key_hash: key.hash.clone(),
        expires_at: input.expires_at,
    })?;

    // Add to in-memory registry for immediate validation
    state
        .principal_tokens
        .add(
            key.hash,
            TokenEntry {
                token_id: token.id.clone(),
                principal_id: token.principal_id.clone(),
                name: token.name.clone(),
                expires_at: token.expires_at,
            },
        )
        .await;

    info!(
        token_id = %token.id,
        prefix = %token.key_prefix,
        principal = %principal_id,
        "Created principal token"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            token: token.into(),
            raw_key: key.raw,
        }),
    ))
}

/// Revoke (delete) a token owned by the authenticated principal
async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let principal_id = auth.principal_id();
    let deleted = state
        .engine
        .database()
        .revoke_principal_token(&id, principal_id)?;

    if deleted {
        state.principal_tokens.remove(&id).await;
        info!(token_id = %id, principal = %principal_id, "Revoked principal token");
        Ok(StatusCode::NO_CONTENT)
    } else {
        warn!(token_id = %id, principal = %principal_id, "Token not found or not owned");
        Ok(StatusCode::NOT_FOUND)
    }
}
