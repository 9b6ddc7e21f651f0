//! Application layer for parley
//!
//! This crate contains the session controller, the worker host, port
//! definitions and application configuration. It depends only on the domain
//! layer.

pub mod config;
pub mod ports;
pub mod session;

// Re-export commonly used types
pub use config::SessionConfig;
pub use ports::{
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    inference::{BackendError, InferenceBackend, PredictEvent, PredictRequest},
    retrieval::{NoRetrieval, RetrievalClient, RetrievalReply, RetrievalRequest},
    session_event::{SessionEvent, SessionObservers},
    session_store::{NoSessionStore, SessionStore, StoreError, StoredSession},
    worker::{
        ChatWorker, GenerationControl, GenerationRequest, Ticket, WorkerError, WorkerEvent,
        WorkerEventSink,
    },
};
pub use session::{SessionController, SessionError, WorkerCommand, WorkerHandle};
