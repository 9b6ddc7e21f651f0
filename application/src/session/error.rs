//! Session controller errors

use crate::ports::session_store::StoreError;
use crate::ports::worker::WorkerError;
use parley_domain::{CodecError, DomainError, SessionId};
use thiserror::Error;

/// Errors returned by [`SessionController`](super::SessionController) operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A prompt is already pending for this session")]
    PromptAlreadyPending,

    /// Retrieval delivery for another (or an outdated) session id. Never
    /// returned to callers; only traced.
    #[error("Retrieval result for {0} is not for this session")]
    StaleRetrieval(SessionId),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(#[source] WorkerError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] CodecError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl From<WorkerError> for SessionError {
    fn from(error: WorkerError) -> Self {
        SessionError::WorkerUnavailable(error)
    }
}
