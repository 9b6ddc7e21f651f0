//! Codec error types

use thiserror::Error;

/// Errors produced while encoding or decoding a persisted session.
///
/// Decoding failures never leave partially applied state behind: callers
/// only adopt a decoded snapshot once the whole stream has been consumed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported session format version: {0}")]
    UnsupportedVersion(i32),

    #[error("Unexpected end of stream at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("Corrupt session stream: {0}")]
    Corrupt(String),

    #[error("Saved model '{model}' cannot be restored from format version {version}")]
    IncompatibleLegacyModel { model: String, version: i32 },

    #[error("{0} is too large to encode")]
    TooLarge(&'static str),

    #[error("Worker state rejected: {0}")]
    WorkerState(String),
}
