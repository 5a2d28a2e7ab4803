//! Context memory routes.
//!
//! - GET /memory/{context_id} - Read a context (empty if never written)
//! - POST /memory/{context_id} - Merge memory entries and preference updates
//! - DELETE /memory/{context_id} - Clear a context

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use infergate_core::context::{Context, ContextPatch, Preferences};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiResult;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Create memory router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/memory/{context_id}",
        get(get_memory).post(update_memory).delete(clear_memory),
    )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    pub context_id: String,
    pub memory: Vec<Value>,
    pub preferences: Preferences,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Context> for MemoryResponse {
    fn from(context: Context) -> Self {
        Self {
            context_id: context.context_id,
            memory: context.memory,
            preferences: context.preferences,
            created: context.created_at,
            updated: context.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemoryAck {
    pub status: &'static str,
    pub context_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_entries: Option<usize>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_memory(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(context_id): Path<String>,
) -> ApiResult<Json<MemoryResponse>> {
    let context = state.engine.contexts().get(&context_id, auth.principal_id())?;
    Ok(Json(context.into()))
}

async fn update_memory(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(context_id): Path<String>,
    Json(patch): Json<ContextPatch>,
) -> ApiResult<Json<MemoryAck>> {
    let principal_id = auth.principal_id();
    let context = state.engine.contexts().merge(&context_id, principal_id, patch)?;
    state.engine.sessions().attach_context(principal_id, &context_id).await;

    Ok(Json(MemoryAck {
        status: "updated",
        context_id,
        memory_entries: Some(context.memory.len()),
    }))
}

async fn clear_memory(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(context_id): Path<String>,
) -> ApiResult<Json<MemoryAck>> {
    let principal_id = auth.principal_id();
    state.engine.contexts().clear(&context_id, principal_id)?;
    state.engine.sessions().detach_context(principal_id, &context_id).await;

    info!(context_id = %context_id, principal = %principal_id, "Context cleared");

    Ok(Json(MemoryAck {
        status: "cleared",
        context_id,
        memory_entries: None,
    }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{TestApp, json_body};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_unwritten_context_reads_empty() {
        let app = TestApp::new();
        let body = json_body(app.send(Method::GET, "/api/v1/memory/fresh", None).await).await;

        assert_eq!(body["context_id"], "fresh");
        assert_eq!(body["memory"], json!([]));
        assert_eq!(body["preferences"], json!({}));
        assert_eq!(body["created"], body["updated"]);
    }

    #[tokio::test]
    async fn test_merge_appends_and_overlays() {
        let app = TestApp::new();
        app.send(
            Method::POST,
            "/api/v1/memory/c1",
            Some(json!({"memory": ["m1", "m2"], "preferences": {"a": 1, "b": 2}})),
        )
        .await;
        let ack = json_body(
            app.send(
                Method::POST,
                "/api/v1/memory/c1",
                Some(json!({"memory": ["m3"], "preferences": {"a": 3}})),
            )
            .await,
        )
        .await;
        assert_eq!(ack["status"], "updated");
        assert_eq!(ack["memory_entries"], 3);

        let body = json_body(app.send(Method::GET, "/api/v1/memory/c1", None).await).await;
        assert_eq!(body["memory"], json!(["m1", "m2", "m3"]));
        assert_eq!(body["preferences"], json!({"a": 3, "b": 2}));
    }

    #[tokio::test]
    async fn test_contexts_are_scoped_per_principal() {
        let app = TestApp::new();
        let token = app.token.clone();
        app.send_as(
            Method::POST,
            "/api/v1/memory/shared",
            Some(json!({"memory": ["secret"]})),
            &token,
            Some("alice"),
        )
        .await;

        let bob = json_body(
            app.send_as(Method::GET, "/api/v1/memory/shared", None, &token, Some("bob"))
                .await,
        )
        .await;
        assert_eq!(bob["memory"], json!([]));
    }

    #[tokio::test]
    async fn test_clear_then_read_is_empty() {
        let app = TestApp::new();
        app.send(Method::POST, "/api/v1/memory/c1", Some(json!({"memory": ["m1"]})))
            .await;

        let response = app.send(Method::DELETE, "/api/v1/memory/c1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "cleared");

        let body = json_body(app.send(Method::GET, "/api/v1/memory/c1", None).await).await;
        assert_eq!(body["memory"], json!([]));

        // Clearing twice is fine
        let again = app.send(Method::DELETE, "/api/v1/memory/c1", None).await;
        assert_eq!(again.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_concurrent_merges_lose_nothing() {
        let app = TestApp::new();
        let writes = (0..20).map(|i| {
            app.send(
                Method::POST,
                "/api/v1/memory/busy",
                Some(json!({"memory": [i], "preferences": {format!("k{i}"): i}})),
            )
        });
        for response in futures::future::join_all(writes).await {
            assert_eq!(response.status(), StatusCode::OK);
        }

        let body = json_body(app.send(Method::GET, "/api/v1/memory/busy", None).await).await;
        let mut memory: Vec<i64> = body["memory"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        memory.sort_unstable();
        assert_eq!(memory, (0..20).collect::<Vec<_>>());
        assert_eq!(body["preferences"].as_object().unwrap().len(), 20);
    }
}
