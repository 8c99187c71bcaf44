use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub endpoint: String,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().trim_end_matches('/').to_string(),
        }
    }
}

/// Speaker role in the provider's turn vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnRole {
    User,
    Model,
}

/// One prior conversation turn, already flattened to plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ProviderTurn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A web source the provider consulted while grounding its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

impl Source {
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub model_id: String,
    pub prompt: String,
    pub history: Vec<ProviderTurn>,
    pub system_instruction: Option<String>,
    pub search_enabled: bool,
    pub thinking_budget: Option<u32>,
}

impl StreamRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            history: Vec::new(),
            system_instruction: None,
            search_enabled: false,
            thinking_budget: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ProviderTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }
}

pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("stream request prompt is empty after trimming"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("failed to build http client on `{stage}`, {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to send completion request on `{stage}`, {source}"))]
    HttpSend {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("provider returned status {status}: {body}"))]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("provider stream failed on `{stage}`, {source}"))]
    StreamTransport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode provider chunk on `{stage}`, {source}"))]
    ChunkDecode {
        stage: &'static str,
        source: serde_json::Error,
    },
}

/// Provider-agnostic streaming payload. `Done` and `Error` are terminal;
/// a well-behaved worker emits exactly one of them unless cancelled first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    Sources(Vec<Source>),
    Done,
    Error(String),
}

pub struct ProviderEventStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl ProviderEventStream {
    fn new(events: mpsc::UnboundedReceiver<StreamEvent>, cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn stream_generate(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle>;
}

/// Builds the channel trio shared by every adapter: an event sender for the
/// worker, the consumer-facing stream, and the cancel signal the worker
/// selects on. Also the seam test doubles use to script provider output.
pub fn make_event_stream() -> (
    mpsc::UnboundedSender<StreamEvent>,
    ProviderEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ProviderEventStream::new(event_rx, cancel_tx),
        cancel_rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_stream_preserves_worker_order() {
        let (event_tx, mut stream, _cancel_rx) = make_event_stream();

        event_tx
            .send(StreamEvent::TextDelta("hello".to_string()))
            .unwrap();
        event_tx
            .send(StreamEvent::Sources(vec![Source::new(
                "https://example.org/a",
                "Example A",
            )]))
            .unwrap();
        event_tx.send(StreamEvent::Done).unwrap();
        drop(event_tx);

        assert_eq!(
            stream.recv().await,
            Some(StreamEvent::TextDelta("hello".to_string()))
        );
        assert!(matches!(stream.recv().await, Some(StreamEvent::Sources(_))));
        assert_eq!(stream.recv().await, Some(StreamEvent::Done));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn cancel_fires_once() {
        let (_event_tx, mut stream, mut cancel_rx) = make_event_stream();

        assert!(stream.cancel());
        assert!(!stream.cancel());
        assert!(cancel_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropping_the_stream_signals_cancel() {
        let (_event_tx, stream, cancel_rx) = make_event_stream();

        drop(stream);
        assert!(cancel_rx.await.is_ok());
    }

    #[test]
    fn request_builders_set_optional_fields() {
        let request = StreamRequest::new("gemini-2.5-flash", "What is Rust?")
            .with_system_instruction("Answer precisely.")
            .with_history(vec![ProviderTurn::new(TurnRole::User, "hi")])
            .with_search(true)
            .with_thinking_budget(4096);

        assert_eq!(request.model_id, "gemini-2.5-flash");
        assert_eq!(request.system_instruction.as_deref(), Some("Answer precisely."));
        assert_eq!(request.history.len(), 1);
        assert!(request.search_enabled);
        assert_eq!(request.thinking_budget, Some(4096));
    }

    #[test]
    fn provider_config_normalizes_endpoint() {
        let config = ProviderConfig::new(" key ", " https://example.test/ ");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.endpoint, "https://example.test");
    }
}
