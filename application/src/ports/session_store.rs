//! Session store port
//!
//! Persists encoded sessions keyed by session id.

use parley_domain::{CodecError, SessionId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a session store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a session file: {0}")]
    BadHeader(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("No saved session with id {0}")]
    NotFound(SessionId),

    #[error("Session id {0:?} cannot name a file")]
    InvalidId(SessionId),
}

/// A stored, still encoded session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    /// Format version the body was written with.
    pub version: i32,
    pub body: Vec<u8>,
}

/// Storage for encoded sessions.
pub trait SessionStore: Send + Sync {
    fn save(&self, id: &SessionId, version: i32, body: &[u8]) -> Result<(), StoreError>;

    fn load(&self, id: &SessionId) -> Result<StoredSession, StoreError>;

    /// Ids of all stored sessions.
    fn list(&self) -> Result<Vec<SessionId>, StoreError>;

    /// Remove the stored copy of `id`. Removing a missing session is not an
    /// error.
    fn remove(&self, id: &SessionId) -> Result<(), StoreError>;
}

/// Store that keeps nothing.
pub struct NoSessionStore;

impl SessionStore for NoSessionStore {
    fn save(&self, _id: &SessionId, _version: i32, _body: &[u8]) -> Result<(), StoreError> {
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<StoredSession, StoreError> {
        Err(StoreError::NotFound(id.clone()))
    }

    fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        Ok(Vec::new())
    }

    fn remove(&self, _id: &SessionId) -> Result<(), StoreError> {
        Ok(())
    }
}
