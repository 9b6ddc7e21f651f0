//! Worker configuration from TOML (`[worker]` section)

use parley_application::config::DEFAULT_THREAD_COUNT;
use serde::{Deserialize, Serialize};

/// Context window of the echo backend unless configured
pub const DEFAULT_CONTEXT_SIZE: usize = 2048;

/// Raw worker configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWorkerConfig {
    /// Inference threads per prompt
    pub threads: usize,
    /// Model loaded when none is named
    pub default_model: Option<String>,
    /// Model names the backend accepts (empty = any)
    pub models: Vec<String>,
    /// Context window size in tokens
    pub context_size: usize,
}

impl Default for FileWorkerConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREAD_COUNT,
            default_model: None,
            models: Vec::new(),
            context_size: DEFAULT_CONTEXT_SIZE,
        }
    }
}
