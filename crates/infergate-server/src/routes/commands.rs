//! Command execution, ledger audit and training routes.
//!
//! - POST /command - Execute a command and record it in the ledger
//! - GET /executions - The caller's ledger records, newest first
//! - POST /train - Forward a training batch to the backend

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use infergate_core::ledger::ExecutionRecord;
use infergate_core::orchestrator::CommandRequest;
use infergate_core::training::SampleInput;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Default and maximum page size for ledger listings
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/command", post(execute_command))
        .route("/executions", get(list_executions))
        .route("/train", post(train))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub status: &'static str,
    pub command_id: String,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionListResponse {
    pub total: u64,
    pub executions: Vec<ExecutionRecord>,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub status: &'static str,
    pub samples_trained: usize,
    pub improvement: f64,
    pub model_version: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn execute_command(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let outcome = state
        .engine
        .orchestrator()
        .execute_command(auth.principal_id(), request)
        .await?;

    Ok(Json(CommandResponse {
        status: "executed",
        command_id: outcome.command_id,
        result: outcome.output,
        timestamp: outcome.timestamp,
    }))
}

async fn list_executions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListExecutionsQuery>,
) -> ApiResult<Json<ExecutionListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let ledger = state.engine.ledger();
    let principal_id = auth.principal_id();

    Ok(Json(ExecutionListResponse {
        total: ledger.count_for(principal_id)?,
        executions: ledger.list_for(principal_id, limit)?,
    }))
}

async fn train(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(samples): Json<Vec<SampleInput>>,
) -> ApiResult<Json<TrainResponse>> {
    let report = state
        .engine
        .orchestrator()
        .train(auth.principal_id(), samples)
        .await?;

    Ok(Json(TrainResponse {
        status: "training_complete",
        samples_trained: report.sample_count,
        improvement: report.improvement,
        model_version: report.version,
    }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{TestApp, json_body};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_command_is_recorded() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/api/v1/command",
                Some(json!({"command": "ping", "parameters": {"host": "db"}})),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "executed");
        assert_eq!(body["command_id"], "cmd_df911f01");
        assert!(body["result"].is_string());

        let listing = json_body(app.send(Method::GET, "/api/v1/executions", None).await).await;
        assert_eq!(listing["total"], 1);
        let record = &listing["executions"][0];
        assert_eq!(record["command_id"], "cmd_df911f01");
        assert_eq!(record["principal_id"], "owner");
        assert_eq!(record["parameters"], json!({"host": "db"}));
        assert_eq!(record["compliance_score"], 1.0);
    }

    #[tokio::test]
    async fn test_executions_limit() {
        let app = TestApp::new();
        for command in ["a", "b", "c"] {
            app.send(Method::POST, "/api/v1/command", Some(json!({"command": command})))
                .await;
        }

        let listing = json_body(app.send(Method::GET, "/api/v1/executions?limit=2", None).await).await;
        assert_eq!(listing["total"], 3);
        let commands: Vec<_> = listing["executions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["command"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(commands, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_executions_are_scoped_to_caller() {
        let app = TestApp::new();
        let created = json_body(
            app.send(Method::POST, "/api/v1/tokens", Some(json!({"name": "owner-cli"})))
                .await,
        )
        .await;
        let owner_key = created["raw_key"].as_str().unwrap().to_string();

        let token = app.token.clone();
        app.send_as(
            Method::POST,
            "/api/v1/command",
            Some(json!({"command": "rotate secrets", "parameters": {"vault": "prod"}})),
            &token,
            Some("mallory"),
        )
        .await;
        app.send(Method::POST, "/api/v1/command", Some(json!({"command": "ping"})))
            .await;

        let listing = json_body(
            app.send_as(Method::GET, "/api/v1/executions", None, &owner_key, None)
                .await,
        )
        .await;
        assert_eq!(listing["total"], 1);
        assert_eq!(listing["executions"][0]["command"], "ping");

        let other = json_body(
            app.send_as(Method::GET, "/api/v1/executions", None, &token, Some("mallory"))
                .await,
        )
        .await;
        assert_eq!(other["total"], 1);
        assert_eq!(other["executions"][0]["command"], "rotate secrets");
    }

    #[tokio::test]
    async fn test_null_parameters_are_accepted() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/api/v1/command",
                Some(json!({"command": "ping", "parameters": null})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_train_reports_batch() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/api/v1/train",
                Some(json!([
                    {"input_text": "q1", "output_text": "a1"},
                    {"input_text": "q2", "output_text": "a2", "compliance_score": 0.5}
                ])),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "training_complete");
        assert_eq!(body["samples_trained"], 2);
        assert_eq!(body["model_version"], "1.0.1");
        assert_eq!(app.state.engine.corpus().len(), 2);
    }
}
