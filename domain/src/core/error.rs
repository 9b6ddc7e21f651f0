//! Domain error types

use crate::response::ResponseState;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Cannot apply '{event}' while the response is {from}")]
    InvalidTransition {
        from: ResponseState,
        event: &'static str,
    },

    #[error("A prompt is already pending for this session")]
    PromptAlreadyPending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let error = DomainError::InvalidTransition {
            from: ResponseState::GeneratingResponse,
            event: "submit",
        };
        assert_eq!(
            error.to_string(),
            "Cannot apply 'submit' while the response is generating_response"
        );
    }
}
