//! Gateway status route.

use axum::{Json, Router, extract::State, routing::get};
use infergate_core::engine::StatusReport;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}

/// Session, memory and corpus counts plus the loaded model
async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusReport>> {
    Ok(Json(state.engine.status().await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{TestApp, json_body};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_status_counts() {
        let app = TestApp::new();
        app.send(Method::POST, "/api/v1/memory/c1", Some(json!({"memory": ["m"]})))
            .await;
        app.send(Method::POST, "/api/v1/command", Some(json!({"command": "ping"})))
            .await;
        let token = app.token.clone();
        app.send_as(Method::GET, "/api/v1/preferences", None, &token, Some("guest"))
            .await;

        let body = json_body(app.send(Method::GET, "/api/v1/status", None).await).await;
        // owner plus guest
        assert_eq!(body["sessions"], 2);
        assert_eq!(body["training_samples"], 0);
        assert_eq!(body["memory"]["contexts"], 1);
        assert_eq!(body["memory"]["executions"], 1);
        assert_eq!(body["model"]["name"], "echo");
        assert!(body["uptime_secs"].as_f64().unwrap() >= 0.0);
    }
}
