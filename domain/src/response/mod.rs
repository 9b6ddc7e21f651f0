//! Response lifecycle of one prompt → response cycle.
//!
//! ```text
//! Stopped ──submit──▶ RetrievingContext ──(dispatch)──▶ ProcessingContext | ProcessingPrompt
//!    ▲                                                        │ first token
//!    │                                                        ▼
//!    └───────────────── finish / stop ◀──────────── GeneratingResponse
//! ```
//!
//! `stop` is accepted from every state other than `Stopped`.

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Phase of the current response cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResponseState {
    #[default]
    Stopped,
    /// Waiting for local documents to be retrieved.
    RetrievingContext,
    /// The worker is ingesting retrieved context together with the prompt.
    ProcessingContext,
    /// The worker is ingesting the prompt.
    ProcessingPrompt,
    GeneratingResponse,
}

impl ResponseState {
    pub fn as_str(&self) -> &str {
        match self {
            ResponseState::Stopped => "stopped",
            ResponseState::RetrievingContext => "retrieving_context",
            ResponseState::ProcessingContext => "processing_context",
            ResponseState::ProcessingPrompt => "processing_prompt",
            ResponseState::GeneratingResponse => "generating_response",
        }
    }

    /// Status line shown while a response is in progress.
    pub fn describe(&self, collections: &[String]) -> String {
        match self {
            ResponseState::Stopped => "response stopped".to_string(),
            ResponseState::RetrievingContext => format!("retrieving {}", collections.join(", ")),
            ResponseState::ProcessingContext => format!("processing {}", collections.join(", ")),
            ResponseState::ProcessingPrompt => "processing".to_string(),
            ResponseState::GeneratingResponse => "generating response".to_string(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ResponseState::Stopped)
    }
}

impl std::fmt::Display for ResponseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transition guard around [`ResponseState`].
///
/// Methods returning `bool` report whether the state actually changed, so
/// callers only publish a notification for real transitions.
#[derive(Debug, Clone, Default)]
pub struct ResponseStateMachine {
    state: ResponseState,
}

impl ResponseStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn is_in_progress(&self) -> bool {
        !self.state.is_stopped()
    }

    /// A prompt was submitted.
    pub fn submit(&mut self) -> Result<(), DomainError> {
        if !self.state.is_stopped() {
            return Err(DomainError::InvalidTransition {
                from: self.state,
                event: "submit",
            });
        }
        self.state = ResponseState::RetrievingContext;
        Ok(())
    }

    /// The worker started ingesting the prompt.
    ///
    /// Ignored unless retrieval was the current phase.
    pub fn begin_processing(&mut self, has_context: bool) -> bool {
        if self.state != ResponseState::RetrievingContext {
            return false;
        }
        self.state = if has_context {
            ResponseState::ProcessingContext
        } else {
            ResponseState::ProcessingPrompt
        };
        true
    }

    /// The worker produced output. Idempotent once generating.
    pub fn first_token(&mut self) -> bool {
        match self.state {
            ResponseState::GeneratingResponse | ResponseState::Stopped => false,
            _ => {
                self.state = ResponseState::GeneratingResponse;
                true
            }
        }
    }

    /// The worker finished the response.
    pub fn finish(&mut self) -> bool {
        self.force_stopped()
    }

    /// The user interrupted the cycle.
    pub fn stop(&mut self) -> bool {
        self.force_stopped()
    }

    fn force_stopped(&mut self) -> bool {
        if self.state.is_stopped() {
            return false;
        }
        self.state = ResponseState::Stopped;
        true
    }
}
