//! Infrastructure layer for parley
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: chat workers and the echo inference backend, keyword
//! retrieval, file-backed session storage, configuration loading and the
//! JSONL conversation logger.

pub mod config;
pub mod inference;
pub mod logging;
pub mod retrieval;
pub mod storage;
pub mod worker;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigValidationError, FileConfig, FileGenerationConfig, FileLoggingConfig,
    FilePersistenceConfig, FileRetrievalConfig, FileWorkerConfig,
};
pub use inference::EchoBackend;
pub use logging::JsonlConversationLogger;
pub use retrieval::KeywordRetrievalClient;
pub use storage::{FileSessionStore, read_session_file, write_session_file};
pub use worker::{LocalWorker, ServerWorker};
