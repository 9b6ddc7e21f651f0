//! Local worker: drives an [`InferenceBackend`] on the worker thread.

use parley_application::ports::inference::{InferenceBackend, PredictEvent, PredictRequest};
use parley_application::ports::worker::{
    ChatWorker, GenerationControl, GenerationRequest, WorkerError, WorkerEvent, WorkerEventSink,
};
use parley_domain::{CodecError, DataReader, DataWriter, GenerationParams, PromptTemplate};
use tracing::{debug, info, warn};

/// Words kept from a generated session name.
const NAME_WORD_LIMIT: usize = 3;

/// Tokens budgeted for a name request.
const NAME_PREDICT_TOKENS: i32 = 32;

/// Template used for name requests.
const NAME_TEMPLATE: &str = "### Instruction:\n%1\n### Response:\n";

/// Context saved while no model is loaded, applied on the next load.
#[derive(Debug, Clone, PartialEq)]
struct SavedContext {
    /// `None` for states written before model tags were persisted.
    model_type: Option<i32>,
    tokens: Vec<i32>,
    state: Vec<u8>,
}

/// Worker state decoded from a saved session, applied only once complete.
struct DecodedState {
    response: String,
    generated_name: String,
    prompt_response_tokens: usize,
    context: SavedContext,
}

/// [`ChatWorker`] running a local model.
pub struct LocalWorker<B: InferenceBackend> {
    backend: B,
    model_name: String,
    default_model: Option<String>,
    response: String,
    generated_name: String,
    /// Tokens added to the context by the last prompt and its response.
    prompt_response_tokens: usize,
    recalc: bool,
    saved_context: Option<SavedContext>,
}

impl<B: InferenceBackend> LocalWorker<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            model_name: String::new(),
            default_model: None,
            response: String::new(),
            generated_name: String::new(),
            prompt_response_tokens: 0,
            recalc: false,
            saved_context: None,
        }
    }

    /// Model loaded by `load_model(None)`.
    pub fn with_default_model(mut self, name: impl Into<String>) -> Self {
        self.default_model = Some(name.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Tokens the last prompt and response added to the context.
    pub fn prompt_response_tokens(&self) -> usize {
        self.prompt_response_tokens
    }

    /// Snapshot the live context so it survives an unload.
    fn save_context(&mut self) {
        if !self.backend.is_loaded() {
            return;
        }
        self.saved_context = Some(SavedContext {
            model_type: Some(self.backend.model_type()),
            tokens: self.backend.context_tokens().to_vec(),
            state: self.backend.context_state(),
        });
    }

    /// Apply a saved context to the freshly loaded backend.
    fn restore_saved_context(&mut self) {
        let Some(saved) = self.saved_context.take() else {
            return;
        };
        if let Some(tag) = saved.model_type
            && tag != self.backend.model_type()
        {
            warn!(
                "Discarding saved context for model type {} (loaded type {})",
                tag,
                self.backend.model_type()
            );
            return;
        }
        if saved.tokens.is_empty() {
            return;
        }
        match self.backend.restore_context(saved.tokens, &saved.state) {
            Ok(()) => debug!(
                "Restored {} context tokens",
                self.backend.context_tokens().len()
            ),
            Err(e) => warn!("Saved context rejected by backend: {}", e),
        }
    }

    fn unload(&mut self, sink: &WorkerEventSink) {
        if self.backend.is_loaded() {
            self.save_context();
            self.backend.unload();
            info!("Unloaded model {}", self.model_name);
        }
        sink.emit(WorkerEvent::LoadStateChanged { loaded: false });
    }

    fn set_recalc(&mut self, recalc: bool, sink: &WorkerEventSink) {
        if self.recalc != recalc {
            self.recalc = recalc;
            sink.emit(WorkerEvent::RecalcChanged { recalc });
        }
    }

    fn context_snapshot(&self) -> SavedContext {
        if self.backend.is_loaded() {
            SavedContext {
                model_type: Some(self.backend.model_type()),
                tokens: self.backend.context_tokens().to_vec(),
                state: self.backend.context_state(),
            }
        } else {
            self.saved_context.clone().unwrap_or(SavedContext {
                model_type: Some(self.backend.model_type()),
                tokens: Vec::new(),
                state: Vec::new(),
            })
        }
    }

    fn decode_state(reader: &mut DataReader<'_>, version: i32) -> Result<DecodedState, CodecError> {
        let model_type = if version > 1 {
            Some(reader.read_i32()?)
        } else {
            None
        };
        let response = reader.read_string()?;
        let generated_name = reader.read_string()?;
        let prompt_response_tokens = usize::try_from(reader.read_i32()?)
            .map_err(|_| CodecError::Corrupt("negative token count".to_string()))?;
        let count = usize::try_from(reader.read_i32()?)
            .map_err(|_| CodecError::Corrupt("negative context size".to_string()))?;
        let mut tokens = Vec::with_capacity(count.min(reader.remaining() / 4));
        for _ in 0..count {
            tokens.push(reader.read_i32()?);
        }
        let state = reader.read_bytes()?;
        if !reader.is_at_end() {
            return Err(CodecError::Corrupt(format!(
                "{} trailing bytes after worker state",
                reader.remaining()
            )));
        }
        Ok(DecodedState {
            response,
            generated_name,
            prompt_response_tokens,
            context: SavedContext {
                model_type,
                tokens,
                state,
            },
        })
    }
}

impl<B: InferenceBackend> ChatWorker for LocalWorker<B> {
    fn is_loaded(&self) -> bool {
        self.backend.is_loaded()
    }

    fn current_response_text(&self) -> String {
        self.response.clone()
    }

    fn generated_name(&self) -> String {
        self.generated_name.clone()
    }

    fn model_name(&self) -> String {
        self.model_name.clone()
    }

    fn is_recalc(&self) -> bool {
        self.recalc
    }

    fn load_model(&mut self, name: Option<&str>, sink: &WorkerEventSink) {
        let Some(target) = name
            .map(str::to_string)
            .or_else(|| self.default_model.clone())
        else {
            sink.emit(WorkerEvent::ModelLoadingError {
                message: "No model selected and no default model configured".to_string(),
            });
            sink.emit(WorkerEvent::LoadStateChanged { loaded: false });
            return;
        };

        if self.backend.is_loaded() && self.model_name == target {
            sink.emit(WorkerEvent::LoadStateChanged { loaded: true });
            return;
        }
        if self.backend.is_loaded() {
            self.backend.unload();
            self.saved_context = None;
        }

        match self.backend.load(&target) {
            Ok(()) => {
                info!("Loaded model {}", target);
                if self.model_name != target {
                    // Saved context belongs to the previous model
                    self.saved_context = None;
                    self.model_name = target.clone();
                    sink.emit(WorkerEvent::ModelNameChanged { name: target });
                }
                self.restore_saved_context();
                sink.emit(WorkerEvent::LoadStateChanged { loaded: true });
            }
            Err(e) => {
                warn!("Could not load model {}: {}", target, e);
                sink.emit(WorkerEvent::ModelLoadingError {
                    message: format!("Could not load model {target}: {e}"),
                });
                sink.emit(WorkerEvent::LoadStateChanged { loaded: false });
            }
        }
    }

    fn set_should_be_loaded(&mut self, loaded: bool, sink: &WorkerEventSink) {
        if !loaded {
            self.unload(sink);
        } else if self.backend.is_loaded() {
            sink.emit(WorkerEvent::LoadStateChanged { loaded: true });
        } else {
            let name = (!self.model_name.is_empty()).then(|| self.model_name.clone());
            self.load_model(name.as_deref(), sink);
        }
    }

    fn change_model(&mut self, name: &str, sink: &WorkerEventSink) {
        if self.backend.is_loaded() && self.model_name == name {
            sink.emit(WorkerEvent::LoadStateChanged { loaded: true });
            return;
        }
        // A different model cannot continue the old context
        self.saved_context = None;
        self.prompt_response_tokens = 0;
        self.response.clear();
        self.load_model(Some(name), sink);
    }

    fn set_model_name(&mut self, name: &str) {
        self.model_name = name.to_string();
    }

    fn generate(
        &mut self,
        request: GenerationRequest,
        control: &GenerationControl,
        sink: &WorkerEventSink,
    ) {
        let ticket = request.ticket;
        if !self.backend.is_loaded() {
            warn!("Generation {} requested without a loaded model", ticket);
            sink.emit(WorkerEvent::ModelLoadingError {
                message: "No model loaded".to_string(),
            });
            sink.emit(WorkerEvent::ResponseStopped { ticket });
            return;
        }

        self.response.clear();
        self.prompt_response_tokens = 0;
        sink.emit(WorkerEvent::ResponseStarted { ticket });

        let text = PromptTemplate::render(&request.template, &request.prompt);
        let predict = PredictRequest {
            text: &text,
            prompt: &request.prompt,
            params: &request.params,
            n_threads: request.n_threads,
        };

        let response = &mut self.response;
        let counted = &mut self.prompt_response_tokens;
        let recalc = &mut self.recalc;
        let result = self.backend.predict(predict, &mut |event| {
            match event {
                PredictEvent::PromptProcessed { tokens } => *counted += tokens,
                PredictEvent::Token(piece) => {
                    *counted += 1;
                    response.push_str(piece);
                    sink.emit(WorkerEvent::ResponseProgress {
                        ticket,
                        text: response.clone(),
                    });
                }
                PredictEvent::Recalculate(on) => {
                    if *recalc != on {
                        *recalc = on;
                        sink.emit(WorkerEvent::RecalcChanged { recalc: on });
                    }
                }
            }
            !control.is_interrupted(ticket)
        });
        if let Err(e) = result {
            warn!("Generation {} failed: {}", ticket, e);
        }
        self.set_recalc(false, sink);

        let trimmed = self.response.trim();
        if trimmed.len() != self.response.len() {
            self.response = trimmed.to_string();
            sink.emit(WorkerEvent::ResponseProgress {
                ticket,
                text: self.response.clone(),
            });
        }
        debug!(
            "Generation {} finished with {} prompt/response tokens",
            ticket, self.prompt_response_tokens
        );
        sink.emit(WorkerEvent::ResponseStopped { ticket });
    }

    fn regenerate_response(&mut self) {
        self.backend.rewind(self.prompt_response_tokens);
        self.prompt_response_tokens = 0;
        self.response.clear();
    }

    fn reset_response(&mut self) {
        self.prompt_response_tokens = 0;
        self.response.clear();
    }

    fn reset_context(&mut self, sink: &WorkerEventSink) {
        self.regenerate_response();
        self.backend.reset_context();
        self.saved_context = None;
        self.set_recalc(false, sink);
    }

    fn generate_name(&mut self, sink: &WorkerEventSink) {
        if !self.backend.is_loaded() {
            debug!("Skipping name generation without a loaded model");
            return;
        }

        let prompt = PromptTemplate::name_request();
        let text = PromptTemplate::render(NAME_TEMPLATE, prompt);
        let params = GenerationParams::default().with_n_predict(NAME_PREDICT_TOKENS);
        let request = PredictRequest {
            text: &text,
            prompt,
            params: &params,
            n_threads: 1,
        };

        // The name exchange must not stay in the conversation context
        let context_len = self.backend.context_tokens().len();
        let mut name = String::new();
        let result = self.backend.predict(request, &mut |event| {
            if let PredictEvent::Token(piece) = event {
                name.push_str(piece);
                return name.split_whitespace().count() <= NAME_WORD_LIMIT;
            }
            true
        });
        let added = self.backend.context_tokens().len().saturating_sub(context_len);
        self.backend.rewind(added);
        if let Err(e) = result {
            warn!("Name generation failed: {}", e);
            return;
        }

        let name = name
            .split_whitespace()
            .take(NAME_WORD_LIMIT)
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() && name != self.generated_name {
            self.generated_name = name.clone();
            sink.emit(WorkerEvent::GeneratedNameChanged { name });
        }
    }

    fn serialize_state(&self, writer: &mut DataWriter, version: i32) -> Result<(), WorkerError> {
        let to_error = |e: CodecError| WorkerError::Serialize(e.to_string());
        let context = self.context_snapshot();
        if version > 1 {
            writer.write_i32(context.model_type.unwrap_or_else(|| self.backend.model_type()));
        }
        writer.write_string(&self.response).map_err(to_error)?;
        writer.write_string(&self.generated_name).map_err(to_error)?;
        let counted = i32::try_from(self.prompt_response_tokens)
            .map_err(|_| WorkerError::Serialize("token count overflow".to_string()))?;
        writer.write_i32(counted);
        let len = i32::try_from(context.tokens.len())
            .map_err(|_| WorkerError::Serialize("context too large".to_string()))?;
        writer.write_i32(len);
        for token in &context.tokens {
            writer.write_i32(*token);
        }
        writer.write_bytes(&context.state).map_err(to_error)?;
        Ok(())
    }

    fn deserialize_state(
        &mut self,
        reader: &mut DataReader<'_>,
        version: i32,
    ) -> Result<(), WorkerError> {
        let decoded = Self::decode_state(reader, version)
            .map_err(|e| WorkerError::Deserialize(e.to_string()))?;

        self.response = decoded.response;
        self.generated_name = decoded.generated_name;
        self.prompt_response_tokens = decoded.prompt_response_tokens;
        self.saved_context = Some(decoded.context);
        if self.backend.is_loaded() {
            self.backend.reset_context();
            self.restore_saved_context();
        }
        debug!("Worker state restored for model {}", self.model_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::EchoBackend;
    use std::sync::{Arc, Mutex};

    fn recording_sink() -> (WorkerEventSink, Arc<Mutex<Vec<WorkerEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            WorkerEventSink::new(move |e| events.lock().unwrap().push(e))
        };
        (sink, events)
    }

    fn request(ticket: u64, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            ticket,
            prompt: prompt.to_string(),
            template: PromptTemplate::default_template().to_string(),
            params: GenerationParams::default(),
            n_threads: 1,
        }
    }

    fn loaded_worker() -> LocalWorker<EchoBackend> {
        let mut worker = LocalWorker::new(EchoBackend::new());
        worker.load_model(Some("echo"), &WorkerEventSink::discard());
        worker
    }

    #[test]
    fn load_reports_name_and_state() {
        let (sink, events) = recording_sink();
        let mut worker = LocalWorker::new(EchoBackend::new());
        worker.load_model(Some("echo"), &sink);

        assert!(worker.is_loaded());
        assert_eq!(worker.model_name(), "echo");
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                WorkerEvent::ModelNameChanged {
                    name: "echo".into()
                },
                WorkerEvent::LoadStateChanged { loaded: true },
            ]
        );
    }

    #[test]
    fn load_without_default_reports_error() {
        let (sink, events) = recording_sink();
        let mut worker = LocalWorker::new(EchoBackend::new());
        worker.load_model(None, &sink);

        let events = events.lock().unwrap();
        assert!(matches!(events[0], WorkerEvent::ModelLoadingError { .. }));
        assert_eq!(events[1], WorkerEvent::LoadStateChanged { loaded: false });
    }

    #[test]
    fn default_model_is_used() {
        let mut worker = LocalWorker::new(EchoBackend::new()).with_default_model("fallback");
        worker.load_model(None, &WorkerEventSink::discard());
        assert_eq!(worker.model_name(), "fallback");
    }

    #[test]
    fn failed_load_keeps_worker_usable() {
        let (sink, events) = recording_sink();
        let mut worker = LocalWorker::new(EchoBackend::new().with_models(["echo"]));
        worker.load_model(Some("missing"), &sink);
        assert!(!worker.is_loaded());
        assert!(matches!(
            events.lock().unwrap()[0],
            WorkerEvent::ModelLoadingError { .. }
        ));

        worker.load_model(Some("echo"), &sink);
        assert!(worker.is_loaded());
    }

    #[test]
    fn generate_streams_full_text() {
        let (sink, events) = recording_sink();
        let mut worker = loaded_worker();
        worker.generate(request(1, "hi"), &GenerationControl::new(), &sink);

        assert_eq!(worker.current_response_text(), "You said: hi");
        let events = events.lock().unwrap();
        assert_eq!(events.first(), Some(&WorkerEvent::ResponseStarted { ticket: 1 }));
        assert_eq!(events.last(), Some(&WorkerEvent::ResponseStopped { ticket: 1 }));
        assert!(events.contains(&WorkerEvent::ResponseProgress {
            ticket: 1,
            text: "You said: hi".into()
        }));
    }

    #[test]
    fn interrupt_stops_after_current_token() {
        let control = GenerationControl::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            let control = control.clone();
            WorkerEventSink::new(move |e| {
                if matches!(e, WorkerEvent::ResponseProgress { .. }) {
                    control.interrupt_through(1);
                }
                events.lock().unwrap().push(e);
            })
        };
        let mut worker = loaded_worker();
        worker.generate(request(1, "a long prompt"), &control, &sink);

        assert_eq!(worker.current_response_text(), "You");
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&WorkerEvent::ResponseStopped { ticket: 1 })
        );
    }

    #[test]
    fn generate_without_model_stops_with_error() {
        let (sink, events) = recording_sink();
        let mut worker = LocalWorker::new(EchoBackend::new());
        worker.generate(request(4, "hi"), &GenerationControl::new(), &sink);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                WorkerEvent::ModelLoadingError {
                    message: "No model loaded".into()
                },
                WorkerEvent::ResponseStopped { ticket: 4 },
            ]
        );
    }

    #[test]
    fn regenerate_rewinds_last_exchange() {
        let mut worker = loaded_worker();
        let control = GenerationControl::new();
        let sink = WorkerEventSink::discard();
        worker.generate(request(1, "first"), &control, &sink);
        let after_first = worker.backend().context_tokens().len();
        worker.generate(request(2, "second"), &control, &sink);
        assert!(worker.prompt_response_tokens() > 0);

        worker.regenerate_response();
        assert_eq!(worker.backend().context_tokens().len(), after_first);
        assert_eq!(worker.current_response_text(), "");
        assert_eq!(worker.prompt_response_tokens(), 0);
    }

    #[test]
    fn reset_context_clears_tokens() {
        let mut worker = loaded_worker();
        let sink = WorkerEventSink::discard();
        worker.generate(request(1, "x"), &GenerationControl::new(), &sink);
        worker.reset_context(&sink);
        assert!(worker.backend().context_tokens().is_empty());
    }

    #[test]
    fn name_is_limited_and_leaves_context_alone() {
        let (sink, events) = recording_sink();
        let mut worker = loaded_worker();
        worker.generate(request(1, "x"), &GenerationControl::new(), &sink);
        let context_len = worker.backend().context_tokens().len();

        worker.generate_name(&sink);
        assert_eq!(worker.generated_name(), "You said: Describe");
        assert_eq!(worker.backend().context_tokens().len(), context_len);
        assert!(events.lock().unwrap().contains(&WorkerEvent::GeneratedNameChanged {
            name: "You said: Describe".into()
        }));
    }

    #[test]
    fn unload_always_reports_state() {
        let (sink, events) = recording_sink();
        let mut worker = LocalWorker::new(EchoBackend::new());
        worker.set_should_be_loaded(false, &sink);
        assert_eq!(
            *events.lock().unwrap(),
            vec![WorkerEvent::LoadStateChanged { loaded: false }]
        );
    }

    #[test]
    fn reload_restores_context() {
        let mut worker = loaded_worker();
        let sink = WorkerEventSink::discard();
        worker.generate(request(1, "keep this"), &GenerationControl::new(), &sink);
        let tokens = worker.backend().context_tokens().to_vec();

        worker.set_should_be_loaded(false, &sink);
        assert!(worker.backend().context_tokens().is_empty());
        worker.set_should_be_loaded(true, &sink);
        assert_eq!(worker.backend().context_tokens(), tokens.as_slice());
    }

    #[test]
    fn state_round_trips_into_unloaded_worker() {
        let mut worker = loaded_worker();
        let sink = WorkerEventSink::discard();
        worker.generate(request(1, "persist me"), &GenerationControl::new(), &sink);
        worker.generate_name(&sink);
        let tokens = worker.backend().context_tokens().to_vec();

        let mut writer = DataWriter::new();
        worker.serialize_state(&mut writer, 3).unwrap();
        let bytes = writer.into_bytes();

        let mut restored = LocalWorker::new(EchoBackend::new());
        restored.set_model_name("echo");
        restored
            .deserialize_state(&mut DataReader::new(&bytes), 3)
            .unwrap();
        assert_eq!(restored.current_response_text(), "You said: persist me");
        assert_eq!(restored.generated_name(), worker.generated_name());
        assert!(!restored.is_loaded());

        restored.set_should_be_loaded(true, &sink);
        assert_eq!(restored.backend().context_tokens(), tokens.as_slice());

        // a second serialization is byte-identical
        let mut again = DataWriter::new();
        restored.serialize_state(&mut again, 3).unwrap();
        assert_eq!(again.into_bytes(), bytes);
    }

    #[test]
    fn version_one_state_has_no_model_tag() {
        let worker = loaded_worker();
        let mut v1 = DataWriter::new();
        worker.serialize_state(&mut v1, 1).unwrap();
        let mut v2 = DataWriter::new();
        worker.serialize_state(&mut v2, 2).unwrap();
        assert_eq!(v2.len(), v1.len() + 4);

        let bytes = v1.into_bytes();
        let mut restored = LocalWorker::new(EchoBackend::new());
        assert!(
            restored
                .deserialize_state(&mut DataReader::new(&bytes), 1)
                .is_ok()
        );
    }

    #[test]
    fn rejected_state_leaves_worker_untouched() {
        let mut worker = loaded_worker();
        let sink = WorkerEventSink::discard();
        worker.generate(request(1, "original"), &GenerationControl::new(), &sink);

        let mut other = DataWriter::new();
        loaded_worker().serialize_state(&mut other, 3).unwrap();
        let mut bytes = other.into_bytes();
        bytes.push(0);

        let result = worker.deserialize_state(&mut DataReader::new(&bytes), 3);
        assert!(matches!(result, Err(WorkerError::Deserialize(_))));
        assert_eq!(worker.current_response_text(), "You said: original");

        bytes.truncate(bytes.len() - 3);
        let result = worker.deserialize_state(&mut DataReader::new(&bytes), 3);
        assert!(result.is_err());
        assert_eq!(worker.current_response_text(), "You said: original");
    }

    #[test]
    fn mismatched_model_type_is_discarded() {
        let mut writer = DataWriter::new();
        writer.write_i32(7);
        writer.write_string("").unwrap();
        writer.write_string("").unwrap();
        writer.write_i32(0);
        writer.write_i32(1);
        writer.write_i32(42);
        writer.write_bytes(b"junk").unwrap();
        let bytes = writer.into_bytes();

        let mut worker = LocalWorker::new(EchoBackend::new());
        worker.set_model_name("echo");
        worker
            .deserialize_state(&mut DataReader::new(&bytes), 2)
            .unwrap();
        worker.set_should_be_loaded(true, &WorkerEventSink::discard());
        assert!(worker.is_loaded());
        assert!(worker.backend().context_tokens().is_empty());
    }
}
