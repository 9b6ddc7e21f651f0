//! Chat session domain.
//!
//! - [`entities::Session`]: identity, naming, collections and turns of a session
//! - [`turn::ChatModel`]: the append-only turn sequence with an open trailing response
//! - [`naming`]: display names derived from generated titles

pub mod entities;
pub mod naming;
pub mod turn;
