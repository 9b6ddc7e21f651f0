//! Session control
//!
//! - [`SessionController`] - prompt cycle, model control, persistence
//! - [`worker_host`] - worker thread and the queued/blocking handle to it
//! - [`SessionError`] - controller errors

pub mod controller;
pub mod error;
pub mod worker_host;

pub use controller::SessionController;
pub use error::SessionError;
pub use worker_host::{RestoredWorker, WorkerCommand, WorkerHandle};
