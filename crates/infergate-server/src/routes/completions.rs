//! Completion and chat routes.
//!
//! - POST /completions - Plain text completion
//! - POST /chat/completions - Chat over a message list
//!
//! Either accepts `stream: true` and answers with server-sent events instead:
//! one `data:` frame per chunk, then `data: [DONE]`.

use axum::{
    Extension, Json, Router,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::post,
};
use infergate_core::backend::Usage;
use infergate_core::orchestrator::{ChatRequest, CompletionRequest, StreamRequest, TokenChunks};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiResult;
use crate::middleware::AuthContext;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/completions", post(create_completion))
        .route("/chat/completions", post(create_chat_completion))
}

// ============================================================================
// Response Types
// ============================================================================

const FINISH_REASON: &str = "stop";

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct CompletionChoice {
    pub text: String,
    pub index: usize,
    pub logprobs: Option<()>,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

fn response_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_completion(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CompletionRequest>,
) -> ApiResult<Response> {
    let orchestrator = state.engine.orchestrator();

    if request.stream {
        let chunks = orchestrator
            .stream(auth.principal_id(), StreamRequest::Completion(request))
            .await?;
        return Ok(sse_response(chunks, "text", stream_delay(&state)));
    }

    let completion = orchestrator.complete(auth.principal_id(), request).await?;

    Ok(Json(CompletionResponse {
        id: response_id("cmpl"),
        object: "text_completion",
        created: chrono::Utc::now().timestamp(),
        model: state.engine.model().name,
        choices: vec![CompletionChoice {
            text: completion.text,
            index: 0,
            logprobs: None,
            finish_reason: FINISH_REASON,
        }],
        usage: completion.usage,
    })
    .into_response())
}

async fn create_chat_completion(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    let orchestrator = state.engine.orchestrator();

    if request.stream {
        let chunks = orchestrator
            .stream(auth.principal_id(), StreamRequest::Chat(request))
            .await?;
        return Ok(sse_response(chunks, "delta", stream_delay(&state)));
    }

    let reply = orchestrator.chat(auth.principal_id(), request).await?;

    Ok(Json(ChatCompletionResponse {
        id: response_id("chatcmpl"),
        object: "chat.completion",
        created: chrono::Utc::now().timestamp(),
        model: state.engine.model().name,
        choices: vec![ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant",
                content: reply.response,
            },
            finish_reason: FINISH_REASON,
        }],
        usage: reply.usage,
    })
    .into_response())
}

fn stream_delay(state: &AppState) -> Duration {
    Duration::from_millis(state.config.engine.stream_delay_ms)
}

/// Emit each chunk as `data: {"<field>": chunk}`, paced by `delay`.
///
/// A disconnected client drops the stream, which stops emission.
fn sse_response(chunks: TokenChunks, field: &'static str, delay: Duration) -> Response {
    let stream = async_stream::stream! {
        for chunk in chunks {
            yield Ok::<_, Infallible>(Event::default().data(json!({ field: chunk }).to_string()));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{TestApp, body_bytes, json_body};
    use axum::http::{Method, StatusCode, header};
    use infergate_core::orchestrator::TokenChunks;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_completion_envelope() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/api/v1/completions",
                Some(json!({"prompt": "hello world", "max_tokens": 10})),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["object"], "text_completion");
        assert_eq!(body["model"], "echo");
        assert_eq!(body["choices"][0]["text"], "hello world");
        assert_eq!(body["choices"][0]["index"], 0);
        assert!(body["choices"][0]["logprobs"].is_null());
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        assert_eq!(body["usage"]["total_tokens"], 4);
        assert!(body["id"].as_str().unwrap().starts_with("cmpl-"));
    }

    #[tokio::test]
    async fn test_chat_envelope() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/api/v1/chat/completions",
                Some(json!({"messages": [{"role": "user", "content": "hi there"}]})),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["role"], "assistant");
        assert_eq!(body["choices"][0]["message"]["content"], "hi there");
    }

    #[tokio::test]
    async fn test_streamed_completion_frames() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/api/v1/completions",
                Some(json!({"prompt": "alpha beta gamma", "stream": true})),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let frames: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .collect();
        assert_eq!(
            frames,
            vec![
                r#"{"text":"alpha "}"#,
                r#"{"text":"beta "}"#,
                r#"{"text":"gamma"}"#,
                "[DONE]",
            ]
        );
    }

    #[tokio::test]
    async fn test_sse_frames_rebuild_multiline_text() {
        let text = "line one\nline two\n\n- item";
        let response = super::sse_response(TokenChunks::new(text), "text", Duration::ZERO);

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let rebuilt: String = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .take_while(|data| *data != "[DONE]")
            .map(|data| {
                let frame: serde_json::Value = serde_json::from_str(data).unwrap();
                frame["text"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[tokio::test]
    async fn test_streamed_chat_uses_delta_field() {
        let app = TestApp::new();
        let response = app
            .send(
                Method::POST,
                "/api/v1/chat/completions",
                Some(json!({"messages": [{"role": "user", "content": "one two"}], "stream": true})),
            )
            .await;

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains(r#"data: {"delta":"one "}"#));
        assert!(body.contains(r#"data: {"delta":"two"}"#));
        assert!(body.trim_end().ends_with("data: [DONE]"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let app = TestApp::new();
        let response = app
            .send(Method::POST, "/api/v1/completions", Some(json!({"max_tokens": 5})))
            .await;
        assert!(response.status().is_client_error());
    }
}
