//! Echo backend: replies with the tail of the prompt.
//! Used for tests and for running the gateway without a model server.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{BackendError, Generation, GenerationBackend, GenerationParams, ModelInfo, TrainingOutcome, Usage};
use crate::training::TrainingSample;

const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// Replies with the last non-empty prompt line, role marker stripped and cut
/// to `max_tokens` words. Tokens are whitespace-separated words.
#[derive(Debug)]
pub struct EchoBackend {
    context_window: usize,
    trained_batches: AtomicU64,
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}

impl EchoBackend {
    pub fn new(context_window: usize) -> Self {
        Self {
            context_window,
            trained_batches: AtomicU64::new(0),
        }
    }

    fn version(&self) -> String {
        format!("1.0.{}", self.trained_batches.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl GenerationBackend for EchoBackend {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "echo".to_string(),
            version: self.version(),
            context_window: self.context_window,
        }
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation, BackendError> {
        let line = prompt
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != "Assistant:")
            .last()
            .unwrap_or("");
        let line = line.split_once(": ").map_or(line, |(_, rest)| rest);

        let words: Vec<&str> = line.split_whitespace().take(params.max_tokens).collect();
        let usage = Usage::new(self.count_tokens(prompt) as u32, words.len() as u32);

        Ok(Generation {
            text: words.join(" "),
            usage,
        })
    }

    async fn train(&self, samples: &[TrainingSample]) -> Result<TrainingOutcome, BackendError> {
        if !samples.is_empty() {
            self.trained_batches.fetch_add(1, Ordering::SeqCst);
        }
        Ok(TrainingOutcome {
            improvement: 0.0,
            version: self.version(),
        })
    }
}
