//! Process-wide training corpus.
//!
//! Samples are normalized on the way in and only ever appended. The corpus is
//! never pruned, so it grows for the lifetime of the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Default score for samples that do not carry one
pub const DEFAULT_SAMPLE_SCORE: f64 = 1.0;

/// A training sample as submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInput {
    pub input_text: String,
    pub output_text: String,
    #[serde(default = "default_score")]
    pub compliance_score: f64,
}

fn default_score() -> f64 {
    DEFAULT_SAMPLE_SCORE
}

/// Normalized sample: the uniform shape forwarded to backends and kept in the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub input: String,
    pub output: String,
    pub compliance_score: f64,
    pub principal_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TrainingSample {
    pub fn normalize(input: SampleInput, principal_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            input: input.input_text,
            output: input.output_text,
            compliance_score: input.compliance_score,
            principal_id: principal_id.to_string(),
            timestamp,
        }
    }
}

#[derive(Debug, Default)]
pub struct TrainingCorpus {
    samples: RwLock<Vec<TrainingSample>>,
}

impl TrainingCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&self, batch: impl IntoIterator<Item = TrainingSample>) {
        let mut samples = self.samples.write().unwrap_or_else(|e| e.into_inner());
        samples.extend(batch);
    }

    pub fn len(&self) -> usize {
        self.samples.read().map(|s| s.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the corpus, oldest sample first
    pub fn snapshot(&self) -> Vec<TrainingSample> {
        self.samples.read().map(|s| s.clone()).unwrap_or_else(|e| e.into_inner().clone())
    }
}
