//! Worker port
//!
//! Defines the capability an inference worker exposes to the session
//! controller. Workers run on their own thread (see
//! [`WorkerHandle`](crate::session::worker_host::WorkerHandle)); they talk
//! back to the session only through a [`WorkerEventSink`], which never
//! blocks, so a worker can never issue a blocking call into the session that
//! is waiting on it.

use parley_domain::{DataReader, DataWriter, GenerationParams};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Monotonically increasing identifier of one generation request.
pub type Ticket = u64;

/// Errors reported by workers and the worker host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Worker thread could not be started: {0}")]
    Spawn(String),

    #[error("Worker is no longer running")]
    Disconnected,

    #[error("Model could not be loaded: {0}")]
    Load(String),

    #[error("Worker state could not be serialized: {0}")]
    Serialize(String),

    #[error("Worker state could not be restored: {0}")]
    Deserialize(String),
}

/// Notifications a worker emits while handling commands.
///
/// Generation notifications carry the [`Ticket`] of the request they belong
/// to so the session can discard output of an interrupted generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    LoadStateChanged { loaded: bool },
    /// The worker started ingesting the prompt.
    ResponseStarted { ticket: Ticket },
    /// Full text of the response generated so far.
    ResponseProgress { ticket: Ticket, text: String },
    ResponseStopped { ticket: Ticket },
    RecalcChanged { recalc: bool },
    GeneratedNameChanged { name: String },
    ModelNameChanged { name: String },
    ModelLoadingError { message: String },
}

/// Non-blocking notification channel from a worker to its session.
#[derive(Clone)]
pub struct WorkerEventSink {
    deliver: Arc<dyn Fn(WorkerEvent) + Send + Sync>,
}

impl WorkerEventSink {
    pub fn new(deliver: impl Fn(WorkerEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// A sink that discards everything.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, event: WorkerEvent) {
        (self.deliver)(event);
    }
}

impl fmt::Debug for WorkerEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerEventSink").finish_non_exhaustive()
    }
}

/// One prompt forwarded to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub ticket: Ticket,
    pub prompt: String,
    /// Prompt template, already augmented with retrieved context.
    pub template: String,
    pub params: GenerationParams,
    pub n_threads: usize,
}

/// Interrupt flag shared between the session and the worker thread.
///
/// Interrupting ticket `n` interrupts every generation with a ticket `<= n`.
/// Raising the flag is idempotent and bypasses the command queue, so it
/// reaches a generation that is already running.
#[derive(Debug, Clone, Default)]
pub struct GenerationControl {
    interrupted_through: Arc<AtomicU64>,
}

impl GenerationControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt_through(&self, ticket: Ticket) {
        self.interrupted_through.fetch_max(ticket, Ordering::AcqRel);
    }

    pub fn is_interrupted(&self, ticket: Ticket) -> bool {
        ticket <= self.interrupted_through.load(Ordering::Acquire)
    }
}

/// An inference worker.
///
/// Every method runs on the worker thread. Methods that change observable
/// worker state report the change through `sink`.
pub trait ChatWorker: Send {
    fn is_loaded(&self) -> bool;

    /// Text of the response currently being (or last) generated.
    fn current_response_text(&self) -> String;

    /// Title generated for the session, empty until name generation ran.
    fn generated_name(&self) -> String;

    fn model_name(&self) -> String;

    /// Whether the worker is rebuilding its context window.
    fn is_recalc(&self) -> bool;

    /// Load `name`, or the configured default model when `None`.
    fn load_model(&mut self, name: Option<&str>, sink: &WorkerEventSink);

    /// Load or unload the current model.
    fn set_should_be_loaded(&mut self, loaded: bool, sink: &WorkerEventSink);

    /// Switch to another model, unloading the current one first.
    fn change_model(&mut self, name: &str, sink: &WorkerEventSink);

    /// Record the model name without loading it (used before a restore).
    fn set_model_name(&mut self, name: &str);

    /// Run one generation, polling `control` between tokens.
    fn generate(
        &mut self,
        request: GenerationRequest,
        control: &GenerationControl,
        sink: &WorkerEventSink,
    );

    /// Roll the context back so the last response can be generated again.
    fn regenerate_response(&mut self);

    /// Forget the current response text and token accounting.
    fn reset_response(&mut self);

    /// Drop the whole context window.
    fn reset_context(&mut self, sink: &WorkerEventSink);

    /// Ask the model to title the conversation.
    fn generate_name(&mut self, sink: &WorkerEventSink);

    fn serialize_state(&self, writer: &mut DataWriter, version: i32) -> Result<(), WorkerError>;

    /// Restore state written by [`serialize_state`](Self::serialize_state).
    ///
    /// Must consume the whole reader and leave the worker untouched on
    /// error.
    fn deserialize_state(
        &mut self,
        reader: &mut DataReader<'_>,
        version: i32,
    ) -> Result<(), WorkerError>;
}
