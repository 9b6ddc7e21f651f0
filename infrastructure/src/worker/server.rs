//! Worker for server-driven sessions.
//!
//! Server sessions answer independent API requests: every request starts
//! from an empty context and the session title is fixed, so no name is ever
//! generated.

use super::local::LocalWorker;
use parley_application::ports::inference::InferenceBackend;
use parley_application::ports::worker::{
    ChatWorker, GenerationControl, GenerationRequest, WorkerError, WorkerEventSink,
};
use parley_domain::{DataReader, DataWriter};
use tracing::trace;

/// [`ChatWorker`] for server sessions, built on [`LocalWorker`].
pub struct ServerWorker<B: InferenceBackend> {
    inner: LocalWorker<B>,
}

impl<B: InferenceBackend> ServerWorker<B> {
    pub fn new(backend: B) -> Self {
        Self {
            inner: LocalWorker::new(backend),
        }
    }

    pub fn with_default_model(self, name: impl Into<String>) -> Self {
        Self {
            inner: self.inner.with_default_model(name),
        }
    }

    pub fn backend(&self) -> &B {
        self.inner.backend()
    }
}

impl<B: InferenceBackend> ChatWorker for ServerWorker<B> {
    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn current_response_text(&self) -> String {
        self.inner.current_response_text()
    }

    fn generated_name(&self) -> String {
        String::new()
    }

    fn model_name(&self) -> String {
        self.inner.model_name()
    }

    fn is_recalc(&self) -> bool {
        self.inner.is_recalc()
    }

    fn load_model(&mut self, name: Option<&str>, sink: &WorkerEventSink) {
        self.inner.load_model(name, sink);
    }

    fn set_should_be_loaded(&mut self, loaded: bool, sink: &WorkerEventSink) {
        self.inner.set_should_be_loaded(loaded, sink);
    }

    fn change_model(&mut self, name: &str, sink: &WorkerEventSink) {
        self.inner.change_model(name, sink);
    }

    fn set_model_name(&mut self, name: &str) {
        self.inner.set_model_name(name);
    }

    fn generate(
        &mut self,
        request: GenerationRequest,
        control: &GenerationControl,
        sink: &WorkerEventSink,
    ) {
        trace!("Fresh context for server request {}", request.ticket);
        self.inner.reset_context(sink);
        self.inner.generate(request, control, sink);
    }

    fn regenerate_response(&mut self) {
        self.inner.regenerate_response();
    }

    fn reset_response(&mut self) {
        self.inner.reset_response();
    }

    fn reset_context(&mut self, sink: &WorkerEventSink) {
        self.inner.reset_context(sink);
    }

    fn generate_name(&mut self, _sink: &WorkerEventSink) {}

    fn serialize_state(&self, writer: &mut DataWriter, version: i32) -> Result<(), WorkerError> {
        self.inner.serialize_state(writer, version)
    }

    fn deserialize_state(
        &mut self,
        reader: &mut DataReader<'_>,
        version: i32,
    ) -> Result<(), WorkerError> {
        self.inner.deserialize_state(reader, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::EchoBackend;
    use parley_domain::{GenerationParams, PromptTemplate};
    use std::sync::{Arc, Mutex};

    fn request(ticket: u64, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            ticket,
            prompt: prompt.to_string(),
            template: PromptTemplate::default_template().to_string(),
            params: GenerationParams::default(),
            n_threads: 1,
        }
    }

    #[test]
    fn every_request_starts_fresh() {
        let mut worker = ServerWorker::new(EchoBackend::new());
        let sink = WorkerEventSink::discard();
        let control = GenerationControl::new();
        worker.load_model(Some("echo"), &sink);

        worker.generate(request(1, "first question"), &control, &sink);
        let first = worker.backend().context_tokens().len();
        worker.generate(request(2, "first question"), &control, &sink);
        assert_eq!(worker.backend().context_tokens().len(), first);
        assert_eq!(worker.current_response_text(), "You said: first question");
    }

    #[test]
    fn never_generates_a_name() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            WorkerEventSink::new(move |e| events.lock().unwrap().push(e))
        };
        let mut worker = ServerWorker::new(EchoBackend::new()).with_default_model("echo");
        worker.load_model(None, &sink);
        events.lock().unwrap().clear();

        worker.generate_name(&sink);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(worker.generated_name(), "");
    }
}
