//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod conversation_logger;
pub mod inference;
pub mod retrieval;
pub mod session_event;
pub mod session_store;
pub mod worker;
