//! Worker host and the session-side handle to it.
//!
//! The host owns a [`ChatWorker`] on a dedicated OS thread and drains an
//! ordered command channel. The session talks to it through a
//! [`WorkerHandle`] using two of the three delivery disciplines:
//!
//! | Discipline | Method | Caller |
//! |------------|--------|--------|
//! | queued | [`WorkerHandle::post`] | returns immediately |
//! | blocking | [`WorkerHandle::call`] | suspended until the host replies |
//!
//! Interrupts skip the queue entirely (see [`WorkerHandle::interrupt`]).
//! Dropping the handle closes the channel; the host then finishes the
//! commands already queued, drops the worker and exits.

use crate::ports::worker::{
    ChatWorker, GenerationControl, GenerationRequest, Ticket, WorkerError, WorkerEventSink,
};
use parley_domain::{DataReader, DataWriter};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Commands understood by the worker host.
#[derive(Debug)]
pub enum WorkerCommand {
    // === Queued ===
    LoadModel(Option<String>),
    SetShouldBeLoaded(bool),
    ChangeModel(String),
    Generate(GenerationRequest),
    GenerateName,

    // === Blocking ===
    RegenerateResponse(oneshot::Sender<()>),
    ResetResponse(oneshot::Sender<()>),
    ResetContext(oneshot::Sender<()>),
    SerializeState {
        version: i32,
        reply: oneshot::Sender<Result<Vec<u8>, WorkerError>>,
    },
    /// Restore worker state. The model name is recorded first so the
    /// worker restores into the right model.
    DeserializeState {
        model_name: String,
        state: Vec<u8>,
        version: i32,
        reply: oneshot::Sender<Result<RestoredWorker, WorkerError>>,
    },
}

/// Worker-side values the session mirrors after a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredWorker {
    pub generated_name: String,
}

impl WorkerCommand {
    fn name(&self) -> &'static str {
        match self {
            WorkerCommand::LoadModel(_) => "load_model",
            WorkerCommand::SetShouldBeLoaded(_) => "set_should_be_loaded",
            WorkerCommand::ChangeModel(_) => "change_model",
            WorkerCommand::Generate(_) => "generate",
            WorkerCommand::GenerateName => "generate_name",
            WorkerCommand::RegenerateResponse(_) => "regenerate_response",
            WorkerCommand::ResetResponse(_) => "reset_response",
            WorkerCommand::ResetContext(_) => "reset_context",
            WorkerCommand::SerializeState { .. } => "serialize_state",
            WorkerCommand::DeserializeState { .. } => "deserialize_state",
        }
    }
}

/// Session-side handle to a worker running on its own thread.
#[derive(Debug)]
pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    control: GenerationControl,
}

impl WorkerHandle {
    /// Move `worker` onto a new thread and start its host loop.
    pub fn spawn<W>(worker: W, sink: WorkerEventSink) -> Result<Self, WorkerError>
    where
        W: ChatWorker + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = GenerationControl::new();
        let host_control = control.clone();

        thread::Builder::new()
            .name("parley-worker".to_string())
            .spawn(move || run_host(worker, rx, host_control, sink))
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        Ok(Self {
            commands: tx,
            control,
        })
    }

    /// Queue `command` and return without waiting.
    pub fn post(&self, command: WorkerCommand) -> Result<(), WorkerError> {
        trace!("Posting {} to worker", command.name());
        self.commands
            .send(command)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Queue a command built around a reply channel and wait for the reply.
    ///
    /// Commands queued earlier are handled first.
    pub async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> WorkerCommand,
    ) -> Result<T, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.post(build(tx))?;
        rx.await.map_err(|_| WorkerError::Disconnected)
    }

    /// Interrupt every generation up to and including `ticket`.
    pub fn interrupt(&self, ticket: Ticket) {
        debug!("Interrupting generations through ticket {}", ticket);
        self.control.interrupt_through(ticket);
    }

    /// Whether the host loop is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed()
    }
}

fn run_host<W: ChatWorker>(
    mut worker: W,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    control: GenerationControl,
    sink: WorkerEventSink,
) {
    debug!("Worker host started");
    while let Some(command) = commands.blocking_recv() {
        trace!("Worker handling {}", command.name());
        match command {
            WorkerCommand::LoadModel(name) => worker.load_model(name.as_deref(), &sink),
            WorkerCommand::SetShouldBeLoaded(loaded) => worker.set_should_be_loaded(loaded, &sink),
            WorkerCommand::ChangeModel(name) => worker.change_model(&name, &sink),
            WorkerCommand::Generate(request) => {
                if control.is_interrupted(request.ticket) {
                    debug!("Skipping interrupted generation {}", request.ticket);
                    continue;
                }
                worker.generate(request, &control, &sink);
            }
            WorkerCommand::GenerateName => worker.generate_name(&sink),
            WorkerCommand::RegenerateResponse(reply) => {
                worker.regenerate_response();
                let _ = reply.send(());
            }
            WorkerCommand::ResetResponse(reply) => {
                worker.reset_response();
                let _ = reply.send(());
            }
            WorkerCommand::ResetContext(reply) => {
                worker.reset_context(&sink);
                let _ = reply.send(());
            }
            WorkerCommand::SerializeState { version, reply } => {
                let mut writer = DataWriter::new();
                let result = worker
                    .serialize_state(&mut writer, version)
                    .map(|()| writer.into_bytes());
                let _ = reply.send(result);
            }
            WorkerCommand::DeserializeState {
                model_name,
                state,
                version,
                reply,
            } => {
                let previous_model = worker.model_name();
                worker.set_model_name(&model_name);
                let mut reader = DataReader::new(&state);
                let result = worker
                    .deserialize_state(&mut reader, version)
                    .map(|()| RestoredWorker {
                        generated_name: worker.generated_name(),
                    });
                if let Err(e) = &result {
                    warn!("Worker state rejected: {}", e);
                    worker.set_model_name(&previous_model);
                }
                let _ = reply.send(result);
            }
        }
    }
    debug!("Worker host exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::worker::WorkerEvent;
    use std::sync::{Arc, Mutex};

    /// Records every call in order.
    #[derive(Default)]
    struct RecordingWorker {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingWorker {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    impl ChatWorker for RecordingWorker {
        fn is_loaded(&self) -> bool {
            false
        }
        fn current_response_text(&self) -> String {
            String::new()
        }
        fn generated_name(&self) -> String {
            String::new()
        }
        fn model_name(&self) -> String {
            String::new()
        }
        fn is_recalc(&self) -> bool {
            false
        }
        fn load_model(&mut self, name: Option<&str>, sink: &WorkerEventSink) {
            self.record(format!("load:{}", name.unwrap_or("default")));
            sink.emit(WorkerEvent::LoadStateChanged { loaded: true });
        }
        fn set_should_be_loaded(&mut self, loaded: bool, _sink: &WorkerEventSink) {
            self.record(format!("should_be_loaded:{loaded}"));
        }
        fn change_model(&mut self, name: &str, _sink: &WorkerEventSink) {
            self.record(format!("change:{name}"));
        }
        fn set_model_name(&mut self, name: &str) {
            self.record(format!("model_name:{name}"));
        }
        fn generate(
            &mut self,
            request: GenerationRequest,
            _control: &GenerationControl,
            _sink: &WorkerEventSink,
        ) {
            self.record(format!("generate:{}", request.ticket));
        }
        fn regenerate_response(&mut self) {
            self.record("regenerate");
        }
        fn reset_response(&mut self) {
            self.record("reset_response");
        }
        fn reset_context(&mut self, _sink: &WorkerEventSink) {
            self.record("reset_context");
        }
        fn generate_name(&mut self, _sink: &WorkerEventSink) {
            self.record("generate_name");
        }
        fn serialize_state(&self, writer: &mut DataWriter, version: i32) -> Result<(), WorkerError> {
            writer.write_i32(version);
            Ok(())
        }
        fn deserialize_state(
            &mut self,
            reader: &mut DataReader<'_>,
            _version: i32,
        ) -> Result<(), WorkerError> {
            reader
                .read_i32()
                .map(|_| ())
                .map_err(|e| WorkerError::Deserialize(e.to_string()))
        }
    }

    fn request(ticket: Ticket) -> GenerationRequest {
        GenerationRequest {
            ticket,
            prompt: "p".into(),
            template: "%1".into(),
            params: Default::default(),
            n_threads: 1,
        }
    }

    #[tokio::test]
    async fn blocking_call_waits_for_queued_commands() {
        let worker = RecordingWorker::default();
        let calls = worker.calls.clone();
        let handle = WorkerHandle::spawn(worker, WorkerEventSink::discard()).unwrap();

        handle.post(WorkerCommand::LoadModel(Some("m".into()))).unwrap();
        handle.post(WorkerCommand::Generate(request(1))).unwrap();
        handle.call(WorkerCommand::ResetResponse).await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["load:m", "generate:1", "reset_response"]
        );
    }

    #[tokio::test]
    async fn interrupted_generation_is_skipped() {
        let worker = RecordingWorker::default();
        let calls = worker.calls.clone();
        let handle = WorkerHandle::spawn(worker, WorkerEventSink::discard()).unwrap();

        handle.interrupt(1);
        handle.post(WorkerCommand::Generate(request(1))).unwrap();
        handle.post(WorkerCommand::Generate(request(2))).unwrap();
        handle.call(WorkerCommand::RegenerateResponse).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["generate:2", "regenerate"]);
    }

    #[tokio::test]
    async fn serialize_and_restore_through_the_host() {
        let worker = RecordingWorker::default();
        let calls = worker.calls.clone();
        let handle = WorkerHandle::spawn(worker, WorkerEventSink::discard()).unwrap();

        let state = handle
            .call(|reply| WorkerCommand::SerializeState { version: 3, reply })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, vec![0, 0, 0, 3]);

        let restored = handle
            .call(|reply| WorkerCommand::DeserializeState {
                model_name: "m".into(),
                state: state.clone(),
                version: 3,
                reply,
            })
            .await
            .unwrap();
        assert!(restored.is_ok());
        assert_eq!(*calls.lock().unwrap(), vec!["model_name:m"]);

        let restored = handle
            .call(|reply| WorkerCommand::DeserializeState {
                model_name: "m".into(),
                state: vec![0, 0],
                version: 3,
                reply,
            })
            .await
            .unwrap();
        assert!(matches!(restored, Err(WorkerError::Deserialize(_))));
        // The rejected restore puts the previous model name back
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["model_name:m", "model_name:m", "model_name:"]
        );
    }

    #[tokio::test]
    async fn events_flow_through_the_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = WorkerEventSink::new(move |e| {
            let _ = tx.send(e);
        });
        let handle = WorkerHandle::spawn(RecordingWorker::default(), sink).unwrap();

        handle.post(WorkerCommand::LoadModel(None)).unwrap();
        assert_eq!(
            rx.recv().await,
            Some(WorkerEvent::LoadStateChanged { loaded: true })
        );
    }
}
