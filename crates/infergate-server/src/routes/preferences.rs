//! Per-principal preference routes.

use axum::{
    Extension, Json, Router,
    extract::State,
    routing::get,
};
use infergate_core::context::Preferences;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::middleware::AuthContext;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/preferences", get(get_preferences).post(update_preferences))
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub principal_id: String,
    pub preferences: Preferences,
}

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<PreferencesResponse>> {
    let preferences = state.engine.contexts().preferences(auth.principal_id())?;
    Ok(Json(PreferencesResponse {
        principal_id: auth.principal_id().to_string(),
        preferences,
    }))
}

/// Overlay the submitted keys onto the stored mapping
async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(updates): Json<Preferences>,
) -> ApiResult<Json<PreferencesResponse>> {
    let preferences = state
        .engine
        .contexts()
        .update_preferences(auth.principal_id(), updates)?;
    Ok(Json(PreferencesResponse {
        principal_id: auth.principal_id().to_string(),
        preferences,
    }))
}
