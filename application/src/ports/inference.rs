//! Inference backend port
//!
//! The opaque model engine a local worker wraps. Backends are driven from
//! the worker thread only.

use parley_domain::GenerationParams;
use thiserror::Error;

/// Errors raised by an inference backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No model loaded")]
    NotLoaded,

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Context state rejected: {0}")]
    State(String),
}

/// A fully rendered prompt ready for prediction.
#[derive(Debug, Clone, Copy)]
pub struct PredictRequest<'a> {
    /// Prompt rendered into its template.
    pub text: &'a str,
    /// The user's prompt as typed.
    pub prompt: &'a str,
    pub params: &'a GenerationParams,
    pub n_threads: usize,
}

/// Progress reported by [`InferenceBackend::predict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictEvent<'a> {
    /// The prompt was ingested into the context.
    PromptProcessed { tokens: usize },
    /// One generated token.
    Token(&'a str),
    /// The context window is being rebuilt (`true`) or finished rebuilding.
    Recalculate(bool),
}

/// Opaque model engine.
pub trait InferenceBackend: Send {
    fn load(&mut self, model: &str) -> Result<(), BackendError>;

    fn unload(&mut self);

    fn is_loaded(&self) -> bool;

    /// Numeric tag identifying the model architecture, persisted with the
    /// context so it is never restored into a different architecture.
    fn model_type(&self) -> i32;

    /// Run a prediction. `on_event` returns `false` to stop early.
    fn predict(
        &mut self,
        request: PredictRequest<'_>,
        on_event: &mut dyn FnMut(PredictEvent<'_>) -> bool,
    ) -> Result<(), BackendError>;

    /// Tokens currently held in the context window.
    fn context_tokens(&self) -> &[i32];

    /// Drop the last `n_tokens` tokens from the context.
    fn rewind(&mut self, n_tokens: usize);

    fn reset_context(&mut self);

    /// Engine-specific state blob (e.g. the key/value cache).
    fn context_state(&self) -> Vec<u8>;

    fn restore_context(&mut self, tokens: Vec<i32>, state: &[u8]) -> Result<(), BackendError>;
}
