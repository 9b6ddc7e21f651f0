//! Domain layer for parley
//!
//! This crate contains the session entities, the response lifecycle, prompt
//! templating, citation rendering and the binary session format. It has no
//! dependencies on workers, storage backends or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Session
//!
//! A [`Session`] is one conversation: identity, names, enabled retrieval
//! collections and an ordered [`ChatModel`] of prompt/response [`Turn`]s.
//!
//! ## Response cycle
//!
//! Each submitted prompt walks the [`ResponseStateMachine`] from
//! `RetrievingContext` to `Stopped`. Results captured during retrieval are
//! rendered as [`Citations`] when the response ends.

pub mod core;
pub mod persistence;
pub mod prompt;
pub mod response;
pub mod retrieval;
pub mod session;

// Re-export commonly used types
pub use core::error::DomainError;
pub use persistence::{
    codec::{
        CURRENT_FORMAT_VERSION, MIN_FORMAT_VERSION, SessionSnapshot, check_version,
        decode_session, encode_session,
    },
    error::CodecError,
    stream::{DataReader, DataWriter},
};
pub use prompt::{CONTEXT_HEADER, GenerationParams, PROMPT_PLACEHOLDER, PendingPrompt, PromptTemplate};
pub use response::{ResponseState, ResponseStateMachine};
pub use retrieval::{ResultInfo, RetrievalResult, citations::Citations};
pub use session::{
    entities::{DEFAULT_SESSION_NAME, SERVER_SESSION_NAME, Session, SessionId},
    naming::{MAX_NAME_WORDS, derive_display_name},
    turn::{ChatModel, Turn, TurnRole},
};
