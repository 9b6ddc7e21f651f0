//! Generation parameters and the pending prompt slot

use serde::{Deserialize, Serialize};

/// Sampling and batching parameters forwarded to the worker (Value Object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Maximum number of tokens to predict.
    pub n_predict: i32,
    pub top_k: i32,
    pub top_p: f32,
    pub temperature: f32,
    /// Prompt batch size.
    pub n_batch: i32,
    pub repeat_penalty: f32,
    /// Look-back window for the repeat penalty, in tokens.
    pub repeat_penalty_tokens: i32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            n_predict: 4096,
            top_k: 40,
            top_p: 0.9,
            temperature: 0.7,
            n_batch: 128,
            repeat_penalty: 1.18,
            repeat_penalty_tokens: 64,
        }
    }
}

impl GenerationParams {
    pub fn with_n_predict(mut self, n: i32) -> Self {
        self.n_predict = n;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_k(mut self, top_k: i32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }
}

/// A prompt waiting for its retrieval step to finish (Value Object)
///
/// Exists only between submission and the moment the augmented prompt is
/// forwarded to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPrompt {
    pub prompt: String,
    pub template: String,
    pub params: GenerationParams,
}

impl PendingPrompt {
    pub fn new(
        prompt: impl Into<String>,
        template: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            template: template.into(),
            params,
        }
    }
}
