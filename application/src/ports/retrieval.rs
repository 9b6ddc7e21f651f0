//! Retrieval client port
//!
//! Contract with the local-document retrieval subsystem. Requests are keyed
//! by session id only; replies come back through a [`RetrievalReply`] and
//! the session discards any reply that does not carry its current id.

use parley_domain::{RetrievalResult, SessionId};
use std::fmt;
use std::sync::Arc;

/// One retrieval request, issued once per submitted prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub session_id: SessionId,
    /// Enabled collections of the session, in insertion order.
    pub collections: Vec<String>,
    pub prompt: String,
}

/// Delivery path for retrieval results.
///
/// Cheap to clone and safe to call from any thread.
#[derive(Clone)]
pub struct RetrievalReply {
    deliver: Arc<dyn Fn(SessionId, RetrievalResult) + Send + Sync>,
}

impl RetrievalReply {
    pub fn new(deliver: impl Fn(SessionId, RetrievalResult) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn send(&self, session_id: SessionId, results: RetrievalResult) {
        (self.deliver)(session_id, results);
    }
}

impl fmt::Debug for RetrievalReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalReply").finish_non_exhaustive()
    }
}

/// Client of the retrieval subsystem.
///
/// `request` must not block; results may be delivered before it returns or
/// later from another thread.
pub trait RetrievalClient: Send + Sync {
    fn request(&self, request: RetrievalRequest, reply: RetrievalReply);
}

/// Client for sessions without local documents: always replies with no
/// results.
pub struct NoRetrieval;

impl RetrievalClient for NoRetrieval {
    fn request(&self, request: RetrievalRequest, reply: RetrievalReply) {
        reply.send(request.session_id, Vec::new());
    }
}
