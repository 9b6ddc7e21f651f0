//! Session event types emitted by the SessionController
//!
//! These events form the output port from the session controller to whoever
//! presents the session. Two delivery paths exist:
//!
//! - **direct** observers are plain callbacks invoked inline, before the
//!   controller call that caused the event returns
//! - **queued** subscribers receive a copy over an unbounded channel

use parley_domain::{ResponseState, SessionId};
use tokio::sync::mpsc;

/// Events emitted by the SessionController
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    // === Identity ===
    IdChanged(SessionId),
    /// Display or user name changed. Carries the effective name.
    NameChanged(String),
    /// The turn sequence was replaced or cleared.
    ChatModelChanged,

    // === Response cycle ===
    ResponseInProgressChanged(bool),
    ResponseStateChanged(ResponseState),
    /// Text of the trailing response turn changed.
    ResponseChanged(String),

    // === Model ===
    ModelLoadedChanged(bool),
    ModelNameChanged(String),
    ModelListChanged,
    RecalcChanged(bool),
    ModelLoadingError(String),

    // === Retrieval scopes ===
    CollectionListChanged(Vec<String>),
}

/// Direct observer callback.
pub type DirectObserver = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Fan-out of session events to direct observers and queued subscribers.
#[derive(Default)]
pub struct SessionObservers {
    direct: Vec<DirectObserver>,
    queued: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl SessionObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, observer: DirectObserver) {
        self.direct.push(observer);
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queued.push(tx);
        rx
    }

    pub fn publish(&mut self, event: SessionEvent) {
        for observer in &self.direct {
            observer(&event);
        }
        // Subscribers that went away are pruned
        self.queued.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
