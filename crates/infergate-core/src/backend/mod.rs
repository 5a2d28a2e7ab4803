//! Generation backend interface.
//!
//! The orchestrator never tokenizes, samples or trains on its own; it hands a
//! prompt to a [`GenerationBackend`] and takes back text plus usage. Two
//! adapters ship with the crate:
//!
//! - [`EchoBackend`]: deterministic and offline, for tests and dry runs
//! - `OpenAiCompatibleBackend` (feature `openai`): any server exposing
//!   `POST /v1/completions`

mod echo;
#[cfg(feature = "openai")]
mod openai;

pub use echo::EchoBackend;
#[cfg(feature = "openai")]
pub use openai::OpenAiCompatibleBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::training::TrainingSample;

/// Sampling parameters for one generation call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Token accounting as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
}

/// Result of forwarding a training batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub improvement: f64,
    pub version: String,
}

/// Static description of the loaded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub context_window: usize,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend returned an unusable response: {0}")]
    Response(String),
}

impl From<BackendError> for crate::error::Error {
    fn from(err: BackendError) -> Self {
        Self::GenerationFailed(err.to_string())
    }
}

/// Text generation capability consumed by the orchestrator.
///
/// One `generate` call is treated as exclusive and non-idempotent: callers
/// never retry it.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn info(&self) -> ModelInfo;

    /// Maximum prompt + completion length in tokens
    fn context_window(&self) -> usize {
        self.info().context_window
    }

    /// Token count of `text` as the backend would see it
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation, BackendError>;

    /// Forward a training batch. Backends without a training capability accept
    /// the batch and report no improvement.
    async fn train(&self, samples: &[TrainingSample]) -> Result<TrainingOutcome, BackendError> {
        let _ = samples;
        Ok(TrainingOutcome {
            improvement: 0.0,
            version: self.info().version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totals() {
        let usage = Usage::new(3, 4);
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn test_backend_error_maps_to_generation_failed() {
        let err: crate::Error = BackendError::Request("connection refused".into()).into();
        assert!(matches!(err, crate::Error::GenerationFailed(ref m) if m.contains("connection refused")));
    }
}
