//! OpenAI-compatible text completion backend (`/v1/completions`).
//!
//! All wire types are private to this module. Prompt token counts for
//! clamping use the UTF-8 byte length, which never falls below what a
//! byte-level BPE tokenizer produces; the usage block the server returns is
//! what gets reported to callers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{BackendError, Generation, GenerationBackend, GenerationParams, ModelInfo, Usage};

/// Adapter for any HTTP endpoint implementing `/v1/completions`.
///
/// Covers llama.cpp server, vLLM, Ollama and hosted OpenAI-style APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    context_window: usize,
}

impl OpenAiCompatibleBackend {
    /// `timeout_secs` bounds each HTTP round-trip
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
        context_window: usize,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            context_window,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/completions", self.base_url)
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            version: "remote".to_string(),
            context_window: self.context_window,
        }
    }

    /// Upper bound: every token covers at least one byte
    fn count_tokens(&self, text: &str) -> usize {
        text.len()
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation, BackendError> {
        let payload = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        debug!(
            model = %self.model,
            max_tokens = params.max_tokens,
            prompt_len = prompt.len(),
            "sending completion request"
        );

        let mut req = self.client.post(self.endpoint()).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.base_url, error = %e, "completion request failed (transport)");
            BackendError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Response(format!("HTTP {status}: {body}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Response(format!("failed to parse response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| BackendError::Response("no choices in response".into()))?;

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_else(|| {
                Usage::new(self.count_tokens(prompt) as u32, self.count_tokens(&text) as u32)
            });

        Ok(Generation { text, usage })
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
