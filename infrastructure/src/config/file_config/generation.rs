//! Generation defaults from TOML (`[generation]` section)

use parley_domain::{GenerationParams, PromptTemplate};
use serde::{Deserialize, Serialize};

/// Raw generation configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGenerationConfig {
    pub n_predict: i32,
    pub top_k: i32,
    pub top_p: f32,
    pub temperature: f32,
    pub n_batch: i32,
    pub repeat_penalty: f32,
    pub repeat_penalty_tokens: i32,
    /// Prompt template; `%1` marks where the prompt goes
    pub prompt_template: String,
}

impl Default for FileGenerationConfig {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            n_predict: params.n_predict,
            top_k: params.top_k,
            top_p: params.top_p,
            temperature: params.temperature,
            n_batch: params.n_batch,
            repeat_penalty: params.repeat_penalty,
            repeat_penalty_tokens: params.repeat_penalty_tokens,
            prompt_template: PromptTemplate::default_template().to_string(),
        }
    }
}

impl FileGenerationConfig {
    pub fn to_params(&self) -> GenerationParams {
        GenerationParams {
            n_predict: self.n_predict,
            top_k: self.top_k,
            top_p: self.top_p,
            temperature: self.temperature,
            n_batch: self.n_batch,
            repeat_penalty: self.repeat_penalty,
            repeat_penalty_tokens: self.repeat_penalty_tokens,
        }
    }
}
