//! Prompt domain
//!
//! Generation parameters, the pending prompt slot, and the templates used to
//! talk to the worker.

mod params;
mod template;

pub use params::{GenerationParams, PendingPrompt};
pub use template::{CONTEXT_HEADER, PROMPT_PLACEHOLDER, PromptTemplate};
