//! Application-level configuration.
//!
//! - [`SessionConfig`]: controller defaults (generation, template, threads, format version)

pub mod session_config;

pub use session_config::{DEFAULT_THREAD_COUNT, SessionConfig};
