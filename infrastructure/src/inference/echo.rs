//! Deterministic echo engine.
//!
//! Answers every prompt with `You said: <prompt>`, one whitespace-delimited
//! token at a time. Tokens are stable hashes of their text, so context
//! accounting behaves like a real engine: the rendered prompt and every
//! generated token occupy context slots, and overflowing the window
//! triggers a recalculation that keeps the most recent half.

use parley_application::ports::inference::{
    BackendError, InferenceBackend, PredictEvent, PredictRequest,
};
use tracing::{debug, trace};

/// Architecture tag persisted with echo contexts.
pub const ECHO_MODEL_TYPE: i32 = 0x4543;

const DEFAULT_CONTEXT_SIZE: usize = 2048;
const STATE_MAGIC: &[u8; 4] = b"ECHO";

/// Deterministic [`InferenceBackend`] for the CLI and tests.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    /// Model names this backend accepts. Empty accepts any name.
    models: Vec<String>,
    loaded: Option<String>,
    context_size: usize,
    tokens: Vec<i32>,
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoBackend {
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            loaded: None,
            context_size: DEFAULT_CONTEXT_SIZE,
            tokens: Vec::new(),
        }
    }

    /// Only accept the given model names.
    pub fn with_models(mut self, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context_size(mut self, context_size: usize) -> Self {
        self.context_size = context_size.max(2);
        self
    }

    pub fn loaded_model(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    fn accepts(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    /// Push one token, rebuilding the window when it is full.
    fn push_token(
        &mut self,
        token: i32,
        on_event: &mut dyn FnMut(PredictEvent<'_>) -> bool,
    ) -> bool {
        let mut keep_going = true;
        if self.tokens.len() >= self.context_size {
            keep_going &= on_event(PredictEvent::Recalculate(true));
            let erase = self.tokens.len() - self.context_size / 2;
            self.tokens.drain(..erase);
            debug!("Echo context recalculated, dropped {} tokens", erase);
            keep_going &= on_event(PredictEvent::Recalculate(false));
        }
        self.tokens.push(token);
        keep_going
    }
}

/// FNV-1a over the token text, folded into a positive `i32`.
fn token_id(text: &str) -> i32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    (hash & 0x7fff_ffff) as i32
}

impl InferenceBackend for EchoBackend {
    fn load(&mut self, model: &str) -> Result<(), BackendError> {
        if !self.accepts(model) {
            return Err(BackendError::ModelNotFound(model.to_string()));
        }
        if self.loaded.as_deref() != Some(model) {
            self.tokens.clear();
        }
        self.loaded = Some(model.to_string());
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = None;
        self.tokens.clear();
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn model_type(&self) -> i32 {
        ECHO_MODEL_TYPE
    }

    fn predict(
        &mut self,
        request: PredictRequest<'_>,
        on_event: &mut dyn FnMut(PredictEvent<'_>) -> bool,
    ) -> Result<(), BackendError> {
        if self.loaded.is_none() {
            return Err(BackendError::NotLoaded);
        }

        let prompt_tokens: Vec<i32> = request.text.split_whitespace().map(token_id).collect();
        for token in &prompt_tokens {
            if !self.push_token(*token, on_event) {
                return Ok(());
            }
        }
        if !on_event(PredictEvent::PromptProcessed {
            tokens: prompt_tokens.len(),
        }) {
            return Ok(());
        }

        let reply = format!("You said: {}", request.prompt.trim());
        let limit = usize::try_from(request.params.n_predict).unwrap_or(0);
        for piece in reply.split_inclusive(' ').take(limit) {
            trace!("Echo token {:?}", piece);
            if !self.push_token(token_id(piece.trim_end()), on_event) {
                return Ok(());
            }
            if !on_event(PredictEvent::Token(piece)) {
                return Ok(());
            }
        }
        Ok(())
    }

    fn context_tokens(&self) -> &[i32] {
        &self.tokens
    }

    fn rewind(&mut self, n_tokens: usize) {
        let keep = self.tokens.len().saturating_sub(n_tokens);
        self.tokens.truncate(keep);
    }

    fn reset_context(&mut self) {
        self.tokens.clear();
    }

    fn context_state(&self) -> Vec<u8> {
        let mut state = STATE_MAGIC.to_vec();
        state.extend_from_slice(&(self.tokens.len() as u32).to_be_bytes());
        state
    }

    fn restore_context(&mut self, tokens: Vec<i32>, state: &[u8]) -> Result<(), BackendError> {
        if self.loaded.is_none() {
            return Err(BackendError::NotLoaded);
        }
        let Some((magic, count)) = state.split_first_chunk::<4>() else {
            return Err(BackendError::State("state blob too short".to_string()));
        };
        if magic != STATE_MAGIC {
            return Err(BackendError::State("not an echo state blob".to_string()));
        }
        let count = <[u8; 4]>::try_from(count)
            .map(u32::from_be_bytes)
            .map_err(|_| BackendError::State("malformed token count".to_string()))?;
        if count as usize != tokens.len() {
            return Err(BackendError::State(format!(
                "state covers {} tokens, context has {}",
                count,
                tokens.len()
            )));
        }
        self.tokens = tokens;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_domain::GenerationParams;

    fn run(backend: &mut EchoBackend, prompt: &str, params: &GenerationParams) -> Vec<String> {
        let mut pieces = Vec::new();
        backend
            .predict(
                PredictRequest {
                    text: prompt,
                    prompt,
                    params,
                    n_threads: 1,
                },
                &mut |event| {
                    if let PredictEvent::Token(t) = event {
                        pieces.push(t.to_string());
                    }
                    true
                },
            )
            .unwrap();
        pieces
    }

    #[test]
    fn echoes_the_prompt() {
        let mut backend = EchoBackend::new();
        backend.load("echo").unwrap();
        let pieces = run(&mut backend, "hello there", &GenerationParams::default());
        assert_eq!(pieces.concat(), "You said: hello there");
        // two prompt tokens plus four reply tokens
        assert_eq!(backend.context_tokens().len(), 6);
    }

    #[test]
    fn n_predict_limits_tokens() {
        let mut backend = EchoBackend::new();
        backend.load("echo").unwrap();
        let params = GenerationParams::default().with_n_predict(2);
        assert_eq!(run(&mut backend, "a b c", &params), vec!["You ", "said: "]);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let mut backend = EchoBackend::new().with_models(["small"]);
        assert_eq!(
            backend.load("large"),
            Err(BackendError::ModelNotFound("large".to_string()))
        );
        assert!(!backend.is_loaded());
        assert!(backend.load("small").is_ok());
    }

    #[test]
    fn predict_without_model_fails() {
        let mut backend = EchoBackend::new();
        let params = GenerationParams::default();
        let result = backend.predict(
            PredictRequest {
                text: "x",
                prompt: "x",
                params: &params,
                n_threads: 1,
            },
            &mut |_| true,
        );
        assert_eq!(result, Err(BackendError::NotLoaded));
    }

    #[test]
    fn overflow_reports_recalculation() {
        let mut backend = EchoBackend::new().with_context_size(4);
        backend.load("echo").unwrap();
        let params = GenerationParams::default();
        let mut recalcs = Vec::new();
        backend
            .predict(
                PredictRequest {
                    text: "one two three four five",
                    prompt: "five",
                    params: &params,
                    n_threads: 1,
                },
                &mut |event| {
                    if let PredictEvent::Recalculate(on) = event {
                        recalcs.push(on);
                    }
                    true
                },
            )
            .unwrap();
        assert!(recalcs.starts_with(&[true, false]));
        assert!(backend.context_tokens().len() <= 4);
    }

    #[test]
    fn state_restores_matching_tokens_only() {
        let mut backend = EchoBackend::new();
        backend.load("echo").unwrap();
        run(&mut backend, "remember me", &GenerationParams::default());
        let tokens = backend.context_tokens().to_vec();
        let state = backend.context_state();

        let mut other = EchoBackend::new();
        other.load("echo").unwrap();
        assert!(other.restore_context(vec![1], &state).is_err());
        other.restore_context(tokens.clone(), &state).unwrap();
        assert_eq!(other.context_tokens(), tokens.as_slice());
    }

    #[test]
    fn rewind_drops_trailing_tokens() {
        let mut backend = EchoBackend::new();
        backend.load("echo").unwrap();
        run(&mut backend, "a", &GenerationParams::default());
        let before = backend.context_tokens().len();
        backend.rewind(2);
        assert_eq!(backend.context_tokens().len(), before - 2);
        backend.rewind(100);
        assert!(backend.context_tokens().is_empty());
    }
}
