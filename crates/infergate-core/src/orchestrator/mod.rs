//! Request orchestration.
//!
//! The single place where an inbound request becomes backend calls plus any
//! ledger append. Completions and chat persist nothing on their own; callers
//! wanting memory merge it explicitly through the context store.
//!
//! Failure policy: backend errors surface as `GenerationFailed` and are never
//! retried; no ledger record is written for a command whose generation failed.

pub mod prompt;
pub mod stream;

pub use prompt::{ChatMessage, Role};
pub use stream::TokenChunks;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{GenerationBackend, GenerationParams, Usage};
use crate::error::Result;
use crate::ledger::{CommandIdScheme, ExecutionLedger, LedgerEntry};
use crate::session::SessionRegistry;
use crate::training::{SampleInput, TrainingCorpus, TrainingSample};

/// Completion budget used for every chat request
pub const CHAT_MAX_TOKENS: usize = 1000;
/// Temperature used for every chat request
pub const CHAT_TEMPERATURE: f32 = 0.7;
const COMMAND_MAX_TOKENS: usize = 500;
const COMMAND_TEMPERATURE: f32 = 0.3;

fn default_max_tokens() -> usize {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_priority() -> i64 {
    1
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Passed to the backend as-is; no range check
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub context_id: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature: default_temperature(),
            stream: false,
            context_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub context_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    /// Absent and `null` both mean no parameters
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

/// Either kind of streamable request
#[derive(Debug, Clone)]
pub enum StreamRequest {
    Completion(CompletionRequest),
    Chat(ChatRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub command_id: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
    /// Ledger sequence of the record written for this execution
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub sample_count: usize,
    pub improvement: f64,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    ledger: Arc<ExecutionLedger>,
    sessions: Arc<SessionRegistry>,
    corpus: Arc<TrainingCorpus>,
    command_ids: CommandIdScheme,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        ledger: Arc<ExecutionLedger>,
        sessions: Arc<SessionRegistry>,
        corpus: Arc<TrainingCorpus>,
        command_ids: CommandIdScheme,
    ) -> Self {
        Self {
            backend,
            ledger,
            sessions,
            corpus,
            command_ids,
        }
    }

    async fn register(&self, principal_id: &str, context_id: Option<&str>) {
        self.sessions.ensure(principal_id).await;
        if let Some(context_id) = context_id {
            self.sessions.attach_context(principal_id, context_id).await;
        }
    }

    /// Clamp `max_tokens` so prompt plus completion fit the context window
    fn clamp_max_tokens(&self, prompt: &str, requested: usize) -> usize {
        let budget = self
            .backend
            .context_window()
            .saturating_sub(self.backend.count_tokens(prompt));
        requested.min(budget)
    }

    /// Plain text completion.
    pub async fn complete(&self, principal_id: &str, request: CompletionRequest) -> Result<Completion> {
        self.register(principal_id, request.context_id.as_deref()).await;

        let max_tokens = self.clamp_max_tokens(&request.prompt, request.max_tokens);
        if max_tokens < request.max_tokens {
            debug!(
                requested = request.max_tokens,
                clamped = max_tokens,
                "max_tokens clamped to context window"
            );
        }

        let params = GenerationParams {
            max_tokens,
            temperature: request.temperature,
        };
        let generation = self
            .backend
            .generate(&request.prompt, &params)
            .await
            .inspect_err(|e| warn!(principal = %principal_id, error = %e, "Generation failed"))?;

        debug!(
            principal = %principal_id,
            prompt_tokens = generation.usage.prompt_tokens,
            completion_tokens = generation.usage.completion_tokens,
            "Completion generated"
        );

        Ok(Completion {
            text: generation.text,
            usage: generation.usage,
        })
    }

    /// Chat over a flattened transcript, with fixed sampling parameters.
    pub async fn chat(&self, principal_id: &str, request: ChatRequest) -> Result<ChatReply> {
        let completion = self
            .complete(
                principal_id,
                CompletionRequest {
                    prompt: prompt::transcript(&request.messages),
                    max_tokens: CHAT_MAX_TOKENS,
                    temperature: CHAT_TEMPERATURE,
                    stream: false,
                    context_id: request.context_id,
                },
            )
            .await?;

        Ok(ChatReply {
            response: completion.text,
            usage: completion.usage,
        })
    }

    /// Run a request to completion, then hand back its text as word chunks.
    ///
    /// The backend call has finished by the time this returns; dropping the
    /// chunks early only stops emission.
    pub async fn stream(&self, principal_id: &str, request: StreamRequest) -> Result<TokenChunks> {
        let text = match request {
            StreamRequest::Completion(req) => self.complete(principal_id, req).await?.text,
            StreamRequest::Chat(req) => self.chat(principal_id, req).await?.response,
        };
        Ok(TokenChunks::new(text))
    }

    /// Execute a command through the backend and record it in the ledger.
    ///
    /// The record is durable before this returns.
    pub async fn execute_command(&self, principal_id: &str, request: CommandRequest) -> Result<CommandOutcome> {
        self.register(principal_id, None).await;

        let command_id = self.command_ids.derive(&request.command);
        let prompt =
            prompt::command_prompt(&request.command, &request.parameters, principal_id, request.priority)?;

        let completion = self
            .complete(
                principal_id,
                CompletionRequest {
                    prompt,
                    max_tokens: COMMAND_MAX_TOKENS,
                    temperature: COMMAND_TEMPERATURE,
                    stream: false,
                    context_id: None,
                },
            )
            .await?;

        let record = self.ledger.append(LedgerEntry {
            command_id,
            command: request.command,
            parameters: Value::Object(request.parameters),
            principal_id: principal_id.to_string(),
            output: completion.text,
            timestamp: Utc::now(),
        })?;

        info!(
            command_id = %record.command_id,
            principal = %principal_id,
            priority = request.priority,
            "Command executed"
        );

        Ok(CommandOutcome {
            command_id: record.command_id,
            output: record.output,
            timestamp: record.timestamp,
            seq: record.seq,
        })
    }

    /// Normalize samples, forward them to the backend and keep them in the corpus.
    pub async fn train(&self, principal_id: &str, samples: Vec<SampleInput>) -> Result<TrainingReport> {
        self.register(principal_id, None).await;

        let timestamp = Utc::now();
        let batch: Vec<TrainingSample> = samples
            .into_iter()
            .map(|s| TrainingSample::normalize(s, principal_id, timestamp))
            .collect();

        info!(principal = %principal_id, samples = batch.len(), "Forwarding training batch");
        let outcome = self.backend.train(&batch).await?;

        let sample_count = batch.len();
        self.corpus.extend(batch);

        Ok(TrainingReport {
            sample_count,
            improvement: outcome.improvement,
            version: outcome.version,
            timestamp,
        })
    }
}
