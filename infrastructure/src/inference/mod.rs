//! Inference backends

pub mod echo;

pub use echo::{ECHO_MODEL_TYPE, EchoBackend};
