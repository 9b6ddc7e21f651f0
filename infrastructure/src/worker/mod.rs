//! Chat worker implementations
//!
//! Both workers run on the worker thread owned by the application's worker
//! host and drive an [`InferenceBackend`](parley_application::InferenceBackend).

pub mod local;
pub mod server;

pub use local::LocalWorker;
pub use server::ServerWorker;
