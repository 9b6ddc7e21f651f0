//! Session Controller
//!
//! Owns one [`Session`], its worker handle and the response state machine,
//! and applies every cross-thread delivery in the session's own task.
//!
//! # Delivery paths
//!
//! ```text
//!            post / call                     WorkerEvent
//! controller ───────────▶ worker host ──────────────────┐
//!     ▲                                                 ▼
//!     │  apply (process_next_event)                   inbox ◀── RetrievalReply
//!     └─────────────────────────────────────────────────┘
//! ```
//!
//! Nothing outside the controller mutates the session: worker notifications
//! and retrieval replies wait in the inbox until
//! [`process_next_event`](SessionController::process_next_event) or
//! [`drain_pending_events`](SessionController::drain_pending_events) applies
//! them.

use crate::config::SessionConfig;
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::retrieval::{RetrievalClient, RetrievalReply, RetrievalRequest};
use crate::ports::session_event::{SessionEvent, SessionObservers};
use crate::ports::session_store::{NoSessionStore, SessionStore};
use crate::ports::worker::{
    ChatWorker, GenerationRequest, Ticket, WorkerError, WorkerEvent, WorkerEventSink,
};
use crate::session::error::SessionError;
use crate::session::worker_host::{WorkerCommand, WorkerHandle};
use parley_domain::{
    ChatModel, Citations, CodecError, DomainError, GenerationParams, PendingPrompt,
    PromptTemplate, ResponseState, ResponseStateMachine, RetrievalResult, Session, SessionId,
    check_version, decode_session, derive_display_name, encode_session,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// A delivery waiting to be applied in the session context.
#[derive(Debug)]
enum Inbound {
    Worker(WorkerEvent),
    Retrieval {
        session_id: SessionId,
        results: RetrievalResult,
    },
}

/// Session controller
pub struct SessionController {
    session: Session,
    worker: WorkerHandle,
    retrieval: Arc<dyn RetrievalClient>,
    store: Arc<dyn SessionStore>,
    conversation_logger: Arc<dyn ConversationLogger>,
    config: SessionConfig,

    state: ResponseStateMachine,
    /// Single pending-prompt slot
    pending: Option<PendingPrompt>,
    /// Results captured for the current cycle
    results: RetrievalResult,
    /// Ticket of the generation the session is currently waiting on
    active_ticket: Option<Ticket>,
    last_ticket: Ticket,

    // Mirrors of worker state, updated from worker notifications
    model_loaded: bool,
    /// Load requests posted but not yet answered by a load-state change
    pending_loads: usize,
    recalc: bool,
    model_name: String,
    generated_name: String,

    observers: SessionObservers,
    /// Fires once when the worker confirms it unloaded
    unloaded_observer: Option<oneshot::Sender<()>>,

    inbox: mpsc::UnboundedReceiver<Inbound>,
    /// Weak so the inbox closes once the worker host is gone
    inbox_tx: mpsc::WeakUnboundedSender<Inbound>,
}

impl SessionController {
    /// Create a controller for `session`, moving `worker` onto its own
    /// thread.
    pub fn new<W>(
        session: Session,
        worker: W,
        retrieval: Arc<dyn RetrievalClient>,
        config: SessionConfig,
    ) -> Result<Self, SessionError>
    where
        W: ChatWorker + 'static,
    {
        let (tx, inbox) = mpsc::unbounded_channel();
        let inbox_tx = tx.downgrade();
        let sink = WorkerEventSink::new(move |event| {
            let _ = tx.send(Inbound::Worker(event));
        });
        let worker = WorkerHandle::spawn(worker, sink)?;
        let model_name = session.saved_model_name().to_string();

        debug!("Session {} created", session.id());
        Ok(Self {
            session,
            worker,
            retrieval,
            store: Arc::new(NoSessionStore),
            conversation_logger: Arc::new(NoConversationLogger),
            config,
            state: ResponseStateMachine::new(),
            pending: None,
            results: Vec::new(),
            active_ticket: None,
            last_ticket: 0,
            model_loaded: false,
            pending_loads: 0,
            recalc: false,
            model_name,
            generated_name: String::new(),
            observers: SessionObservers::new(),
            unloaded_observer: None,
            inbox,
            inbox_tx,
        })
    }

    /// Set the store used by [`save`](Self::save), [`restore`](Self::restore)
    /// and [`reset`](Self::reset).
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Set a conversation logger for structured event logging.
    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    // ==================== Observers ====================

    /// Register a direct observer, called inline for every event.
    pub fn observe(&mut self, observer: impl Fn(&SessionEvent) + Send + Sync + 'static) {
        self.observers.observe(Box::new(observer));
    }

    /// Subscribe to a queued copy of every event.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.observers.subscribe()
    }

    // ==================== Queries ====================

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn id(&self) -> &SessionId {
        self.session.id()
    }

    /// User name if set, otherwise the display name.
    pub fn name(&self) -> &str {
        self.session.name()
    }

    /// Set the user-assigned name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.session.set_user_name(name);
        let name = self.session.name().to_string();
        self.observers.publish(SessionEvent::NameChanged(name));
    }

    pub fn chat_model(&self) -> &ChatModel {
        self.session.chat()
    }

    pub fn response_state(&self) -> ResponseState {
        self.state.state()
    }

    pub fn response_state_description(&self) -> String {
        self.state.state().describe(self.session.collections())
    }

    pub fn response_in_progress(&self) -> bool {
        self.state.is_in_progress()
    }

    /// Text of the trailing response turn.
    pub fn response(&self) -> &str {
        self.session.chat().last().map(|t| t.value()).unwrap_or_default()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model_loaded
    }

    pub fn is_recalc(&self) -> bool {
        self.recalc
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn creation_date(&self) -> i64 {
        self.session.creation_date()
    }

    pub fn is_server(&self) -> bool {
        self.session.is_server()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ==================== Collections ====================

    pub fn collections(&self) -> &[String] {
        self.session.collections()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.session.has_collection(name)
    }

    pub fn add_collection(&mut self, name: impl Into<String>) {
        if self.session.add_collection(name) {
            self.publish_collections();
        }
    }

    pub fn remove_collection(&mut self, name: &str) {
        if self.session.remove_collection(name) {
            self.publish_collections();
        }
    }

    fn publish_collections(&mut self) {
        let collections = self.session.collections().to_vec();
        self.observers
            .publish(SessionEvent::CollectionListChanged(collections));
    }

    // ==================== Prompt cycle ====================

    /// Submit a prompt with the configured template and parameters.
    pub fn submit(&mut self, prompt: impl Into<String>) -> Result<(), SessionError> {
        let template = self.config.prompt_template.clone();
        let params = self.config.generation.clone();
        self.submit_prompt(prompt, template, params)
    }

    /// Start a response cycle.
    ///
    /// The state is `RetrievingContext` and direct observers have been
    /// notified by the time this returns. Fails without any state change
    /// when a prompt is already pending or a response is in flight; both
    /// report [`SessionError::PromptAlreadyPending`].
    pub fn submit_prompt(
        &mut self,
        prompt: impl Into<String>,
        template: impl Into<String>,
        params: GenerationParams,
    ) -> Result<(), SessionError> {
        if self.pending.is_some() || self.state.is_in_progress() {
            return Err(SessionError::PromptAlreadyPending);
        }
        let reply_tx = self
            .inbox_tx
            .upgrade()
            .ok_or(SessionError::WorkerUnavailable(WorkerError::Disconnected))?;
        self.state.submit()?;

        let pending = PendingPrompt::new(prompt, template, params);
        let request = RetrievalRequest {
            session_id: self.session.id().clone(),
            collections: self.session.collections().to_vec(),
            prompt: pending.prompt.clone(),
        };
        self.conversation_logger.log(ConversationEvent::new(
            "prompt_submitted",
            json!({
                "session_id": self.session.id().as_str(),
                "prompt": pending.prompt,
                "collections": request.collections,
            }),
        ));
        self.results.clear();
        self.pending = Some(pending);

        self.observers
            .publish(SessionEvent::ResponseInProgressChanged(true));
        self.observers
            .publish(SessionEvent::ResponseStateChanged(self.state.state()));

        debug!(
            "Session {}: requesting retrieval from {} collection(s)",
            self.session.id(),
            request.collections.len()
        );
        let reply = RetrievalReply::new(move |session_id, results| {
            let _ = reply_tx.send(Inbound::Retrieval {
                session_id,
                results,
            });
        });
        self.retrieval.request(request, reply);
        Ok(())
    }

    /// Apply a retrieval delivery.
    ///
    /// Deliveries for another session id, or arriving when no prompt is
    /// pending, are dropped.
    pub fn on_retrieval_completed(&mut self, session_id: SessionId, results: RetrievalResult) {
        if let Err(e) = self.dispatch_pending(session_id, results) {
            match e {
                SessionError::StaleRetrieval(_) => debug!("Dropping retrieval delivery: {}", e),
                _ => warn!("Prompt dispatch failed: {}", e),
            }
        }
    }

    fn dispatch_pending(
        &mut self,
        session_id: SessionId,
        results: RetrievalResult,
    ) -> Result<(), SessionError> {
        if &session_id != self.session.id() {
            return Err(SessionError::StaleRetrieval(session_id));
        }
        let Some(pending) = self.pending.take() else {
            return Err(SessionError::StaleRetrieval(session_id));
        };

        let template = PromptTemplate::augment_with_context(&pending.template, &results);
        self.results = results;
        self.last_ticket += 1;
        let ticket = self.last_ticket;
        self.active_ticket = Some(ticket);

        debug!(
            "Session {}: dispatching prompt as ticket {} with {} context result(s)",
            self.session.id(),
            ticket,
            self.results.len()
        );
        self.conversation_logger.log(ConversationEvent::new(
            "prompt_dispatched",
            json!({
                "session_id": self.session.id().as_str(),
                "ticket": ticket,
                "template": template,
                "context_results": self.results.len(),
            }),
        ));

        let request = GenerationRequest {
            ticket,
            prompt: pending.prompt,
            template,
            params: pending.params,
            n_threads: self.config.n_threads,
        };
        if let Err(e) = self.worker.post(WorkerCommand::Generate(request)) {
            self.finish_cycle(true);
            return Err(e.into());
        }
        Ok(())
    }

    /// Interrupt the current cycle.
    ///
    /// Never blocks. The trailing response keeps whatever text had been
    /// generated and is closed immediately; later worker output for the
    /// interrupted generation is ignored.
    pub fn stop_generating(&mut self) {
        if let Some(ticket) = self.active_ticket {
            self.worker.interrupt(ticket);
        }
        if !self.state.is_in_progress() {
            return;
        }
        if self.pending.take().is_some() {
            debug!("Session {}: discarding prompt awaiting retrieval", self.session.id());
        }
        self.finish_cycle(true);
    }

    /// Close the cycle: attach citations, close the trailing response and
    /// return to `Stopped`.
    fn finish_cycle(&mut self, stopped: bool) {
        let reached_worker = self.active_ticket.take().is_some();
        let response = self
            .session
            .chat()
            .open_response()
            .map(|t| t.value().to_string());

        if let Some(response) = response {
            let citations = Citations::build(&response, &self.results);
            self.conversation_logger.log(ConversationEvent::new(
                "response_finished",
                json!({
                    "session_id": self.session.id().as_str(),
                    "response": response,
                    "references": citations.references,
                    "stopped": stopped,
                }),
            ));
            self.session
                .chat_mut()
                .finalize_open_response(citations.references, citations.context, stopped);
            self.observers.publish(SessionEvent::ResponseChanged(response));
        }

        self.results.clear();
        self.pending = None;
        if self.state.finish() {
            self.observers
                .publish(SessionEvent::ResponseInProgressChanged(false));
            self.observers
                .publish(SessionEvent::ResponseStateChanged(ResponseState::Stopped));
        }

        if reached_worker && self.generated_name.is_empty() {
            debug!("Session {}: requesting a generated name", self.session.id());
            if let Err(e) = self.worker.post(WorkerCommand::GenerateName) {
                warn!("Name generation not requested: {}", e);
            }
        }
    }

    /// Roll the worker back and reopen the trailing response for another
    /// generation.
    pub async fn regenerate_response(&mut self) -> Result<(), SessionError> {
        self.ensure_stopped("regenerate")?;
        self.worker.call(WorkerCommand::RegenerateResponse).await?;
        if self.session.chat_mut().reopen_last_response() {
            self.observers
                .publish(SessionEvent::ResponseChanged(String::new()));
        }
        Ok(())
    }

    pub async fn reset_response(&mut self) -> Result<(), SessionError> {
        self.worker.call(WorkerCommand::ResetResponse).await?;
        Ok(())
    }

    pub async fn reset_context(&mut self) -> Result<(), SessionError> {
        self.worker.call(WorkerCommand::ResetContext).await?;
        Ok(())
    }

    /// Close the open response, append a prompt turn and an open response
    /// placeholder, then reset the worker's response.
    pub async fn new_prompt_response_pair(
        &mut self,
        prompt: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.append_pair(prompt.into());
        self.reset_response().await
    }

    /// Turn mutation of [`new_prompt_response_pair`](Self::new_prompt_response_pair)
    /// without the worker reset, for server-driven sessions.
    pub fn server_new_prompt_response_pair(&mut self, prompt: impl Into<String>) {
        self.append_pair(prompt.into());
    }

    fn append_pair(&mut self, prompt: String) {
        let chat = self.session.chat_mut();
        chat.close_current_response();
        chat.append_prompt(prompt.clone());
        chat.append_response(prompt);
    }

    fn ensure_stopped(&self, event: &'static str) -> Result<(), SessionError> {
        if self.state.is_in_progress() {
            return Err(DomainError::InvalidTransition {
                from: self.state.state(),
                event,
            }
            .into());
        }
        Ok(())
    }

    // ==================== Model ====================

    pub fn load_model(&mut self, name: impl Into<String>) -> Result<(), SessionError> {
        let name = name.into();
        info!("Session {}: loading model {}", self.session.id(), name);
        self.post_load(WorkerCommand::LoadModel(Some(name)))
    }

    pub fn load_default_model(&mut self) -> Result<(), SessionError> {
        info!("Session {}: loading default model", self.session.id());
        self.post_load(WorkerCommand::LoadModel(None))
    }

    /// Stop generating and ask the worker to unload.
    pub fn unload_model(&mut self) -> Result<(), SessionError> {
        self.stop_generating();
        self.worker.post(WorkerCommand::SetShouldBeLoaded(false))?;
        Ok(())
    }

    pub fn reload_model(&mut self) -> Result<(), SessionError> {
        self.post_load(WorkerCommand::SetShouldBeLoaded(true))
    }

    /// Switch models. Observable through load-state and model-name events.
    pub fn set_model_name(&mut self, name: impl Into<String>) -> Result<(), SessionError> {
        self.post_load(WorkerCommand::ChangeModel(name.into()))
    }

    fn post_load(&mut self, command: WorkerCommand) -> Result<(), SessionError> {
        self.worker.post(command)?;
        self.pending_loads += 1;
        Ok(())
    }

    /// Unload the model and drop the session once the worker confirms.
    ///
    /// Drops immediately when no model is loaded and no load is in flight.
    pub async fn unload_and_delete_later(mut self) {
        let id = self.session.id().clone();
        if !self.model_loaded && self.pending_loads == 0 {
            debug!("Session {}: no model loaded, dropping now", id);
            return;
        }

        let (tx, mut rx) = oneshot::channel();
        self.unloaded_observer = Some(tx);
        if let Err(e) = self.unload_model() {
            warn!("Session {}: unload failed, dropping now: {}", id, e);
            return;
        }

        while self.process_next_event().await {
            match rx.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => continue,
                _ => break,
            }
        }
        info!("Session {}: model unloaded, session dropped", id);
    }

    // ==================== Reset ====================

    /// Stop, forget the stored copy, drop the worker context and continue
    /// under a new id. Name and creation date are kept.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.stop_generating();
        if let Err(e) = self.store.remove(self.session.id()) {
            warn!("Session {}: stored copy not removed: {}", self.session.id(), e);
        }
        self.reset_context().await?;

        let old_id = self.session.id().clone();
        let id = self.session.regenerate_id().clone();
        info!("Session {} reset as {}", old_id, id);
        self.conversation_logger.log(ConversationEvent::new(
            "session_reset",
            json!({ "old_id": old_id.as_str(), "session_id": id.as_str() }),
        ));
        self.observers.publish(SessionEvent::IdChanged(id));

        self.session.chat_mut().clear();
        self.observers.publish(SessionEvent::ChatModelChanged);
        Ok(())
    }

    // ==================== Persistence ====================

    /// Encode the session together with the worker's state.
    pub async fn serialize(&self, version: i32) -> Result<Vec<u8>, SessionError> {
        check_version(version)?;
        let worker_state = self
            .worker
            .call(|reply| WorkerCommand::SerializeState { version, reply })
            .await?
            .map_err(|e| CodecError::WorkerState(e.to_string()))?;
        Ok(encode_session(&self.session, &worker_state, version)?)
    }

    /// Decode `bytes` and adopt them.
    ///
    /// All or nothing: the stream is decoded completely and the worker
    /// restores its state before the session changes. On error the session
    /// is untouched.
    pub async fn deserialize(&mut self, bytes: &[u8], version: i32) -> Result<(), SessionError> {
        self.ensure_stopped("restore")?;
        let snapshot = decode_session(bytes, version)?;

        let restored = self
            .worker
            .call(|reply| WorkerCommand::DeserializeState {
                model_name: snapshot.session.saved_model_name().to_string(),
                state: snapshot.worker_state,
                version,
                reply,
            })
            .await?
            .map_err(|e| CodecError::WorkerState(e.to_string()))?;

        self.session.adopt(snapshot.session);
        self.generated_name = restored.generated_name;
        self.model_name = self.session.saved_model_name().to_string();
        info!(
            "Session {} restored ({} turns, format version {})",
            self.session.id(),
            self.session.chat().len(),
            version
        );

        self.observers
            .publish(SessionEvent::IdChanged(self.session.id().clone()));
        self.observers
            .publish(SessionEvent::NameChanged(self.session.name().to_string()));
        if version > 2 {
            self.publish_collections();
        }
        self.observers.publish(SessionEvent::ChatModelChanged);
        Ok(())
    }

    /// Save through the session store at the configured format version.
    pub async fn save(&self) -> Result<(), SessionError> {
        let version = self.config.format_version;
        let body = self.serialize(version).await?;
        self.store.save(self.session.id(), version, &body)?;
        debug!("Session {} saved ({} bytes)", self.session.id(), body.len());
        Ok(())
    }

    /// Load `id` from the session store and adopt it.
    pub async fn restore(&mut self, id: &SessionId) -> Result<(), SessionError> {
        let stored = self.store.load(id)?;
        self.deserialize(&stored.body, stored.version).await
    }

    // ==================== Event pump ====================

    /// Wait for the next worker or retrieval delivery and apply it.
    ///
    /// Returns `false` once the worker is gone and nothing is left to apply.
    pub async fn process_next_event(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(inbound) => {
                self.apply(inbound);
                true
            }
            None => false,
        }
    }

    /// Apply every delivery already queued without waiting. Returns how many
    /// were applied.
    pub fn drain_pending_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(inbound) = self.inbox.try_recv() {
            self.apply(inbound);
            applied += 1;
        }
        applied
    }

    /// Process events until the current response cycle ends.
    pub async fn wait_for_response(&mut self) {
        while self.state.is_in_progress() {
            if !self.process_next_event().await {
                break;
            }
        }
    }

    fn apply(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Worker(event) => self.apply_worker_event(event),
            Inbound::Retrieval {
                session_id,
                results,
            } => self.on_retrieval_completed(session_id, results),
        }
    }

    fn is_active(&self, ticket: Ticket) -> bool {
        if self.active_ticket == Some(ticket) {
            return true;
        }
        debug!(
            "Session {}: ignoring output of inactive ticket {}",
            self.session.id(),
            ticket
        );
        false
    }

    fn apply_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::LoadStateChanged { loaded } => {
                self.model_loaded = loaded;
                self.pending_loads = self.pending_loads.saturating_sub(1);
                self.observers
                    .publish(SessionEvent::ModelLoadedChanged(loaded));
                if !loaded && let Some(observer) = self.unloaded_observer.take() {
                    let _ = observer.send(());
                }
            }
            WorkerEvent::ResponseStarted { ticket } => {
                if !self.is_active(ticket) {
                    return;
                }
                if self.state.begin_processing(!self.results.is_empty()) {
                    self.observers
                        .publish(SessionEvent::ResponseStateChanged(self.state.state()));
                }
            }
            WorkerEvent::ResponseProgress { ticket, text } => {
                if !self.is_active(ticket) {
                    return;
                }
                // State notification strictly before the content notification
                if self.state.first_token() {
                    self.observers.publish(SessionEvent::ResponseStateChanged(
                        ResponseState::GeneratingResponse,
                    ));
                }
                self.session.chat_mut().update_open_value(text.clone());
                self.observers.publish(SessionEvent::ResponseChanged(text));
            }
            WorkerEvent::ResponseStopped { ticket } => {
                if self.is_active(ticket) {
                    self.finish_cycle(false);
                }
            }
            WorkerEvent::RecalcChanged { recalc } => {
                self.recalc = recalc;
                self.observers.publish(SessionEvent::RecalcChanged(recalc));
            }
            WorkerEvent::GeneratedNameChanged { name } => {
                let display_name = derive_display_name(&name);
                debug!(
                    "Session {}: generated name {:?}",
                    self.session.id(),
                    display_name
                );
                self.generated_name = name;
                self.session.set_display_name(display_name);
                self.observers
                    .publish(SessionEvent::NameChanged(self.session.name().to_string()));
            }
            WorkerEvent::ModelNameChanged { name } => {
                self.conversation_logger.log(ConversationEvent::new(
                    "model_changed",
                    json!({ "session_id": self.session.id().as_str(), "model": name }),
                ));
                self.model_name = name.clone();
                self.session.set_saved_model_name(name.clone());
                self.observers.publish(SessionEvent::ModelNameChanged(name));
                self.observers.publish(SessionEvent::ModelListChanged);
            }
            WorkerEvent::ModelLoadingError { message } => {
                warn!("Session {}: model loading error: {}", self.session.id(), message);
                self.observers
                    .publish(SessionEvent::ModelLoadingError(message));
            }
        }
    }
}
