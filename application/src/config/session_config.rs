//! Session parameters: controller behavior and defaults.
//!
//! [`SessionConfig`] groups the static parameters the
//! [`SessionController`](crate::session::SessionController) needs: generation
//! defaults, the prompt template, the worker thread count and the format
//! version used when saving.

use parley_domain::{CURRENT_FORMAT_VERSION, GenerationParams, PromptTemplate};
use serde::{Deserialize, Serialize};

/// Default number of inference threads.
pub const DEFAULT_THREAD_COUNT: usize = 4;

/// Session controller parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Defaults used when a caller does not supply its own parameters.
    pub generation: GenerationParams,
    /// Default prompt template (`%1` is replaced with the prompt).
    pub prompt_template: String,
    /// Threads forwarded to the worker with every prompt.
    pub n_threads: usize,
    /// Format version written by [`save`](crate::session::SessionController::save).
    pub format_version: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            generation: GenerationParams::default(),
            prompt_template: PromptTemplate::default_template().to_string(),
            n_threads: DEFAULT_THREAD_COUNT,
            format_version: CURRENT_FORMAT_VERSION,
        }
    }
}

impl SessionConfig {
    // ==================== Builder Methods ====================

    pub fn with_generation(mut self, params: GenerationParams) -> Self {
        self.generation = params;
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    pub fn with_format_version(mut self, version: i32) -> Self {
        self.format_version = version;
        self
    }
}
