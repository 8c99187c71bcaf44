use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use veritas_llm::{LlmProvider, ProviderEventStream, ProviderTurn, StreamEvent, StreamRequest};

use crate::chat::{FailureKind, Message, STREAM_ERROR_NOTICE, Source, TurnEvent};
use crate::research::{MODEL_DEEP, MODEL_FAST, ResearchLevel, SYSTEM_INSTRUCTION};

/// Drives one streaming completion per call and re-expresses raw provider
/// output as transcript-level turn events.
pub struct CompletionOrchestrator {
    provider: Arc<dyn LlmProvider>,
    model_fast: String,
    model_deep: String,
}

impl CompletionOrchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model_fast: MODEL_FAST.to_string(),
            model_deep: MODEL_DEEP.to_string(),
        }
    }

    pub fn with_models(
        mut self,
        model_fast: impl Into<String>,
        model_deep: impl Into<String>,
    ) -> Self {
        self.model_fast = model_fast.into();
        self.model_deep = model_deep.into();
        self
    }

    /// Opens a completion stream for `prompt` against the session history.
    ///
    /// Never returns an error: setup failures surface through the stream as
    /// the fixed error notice followed by a single `Failed` event, the same
    /// shape every mid-stream failure takes.
    pub fn stream_completion(
        &self,
        prompt: &str,
        history: &[Message],
        level: ResearchLevel,
    ) -> TurnStream {
        let profile = level.profile_with_models(&self.model_fast, &self.model_deep);
        let mut request = StreamRequest::new(profile.model_id, prompt.trim())
            .with_system_instruction(SYSTEM_INSTRUCTION)
            .with_history(provider_turns(history))
            .with_search(profile.search_enabled);
        if let Some(budget) = profile.thinking_budget {
            request = request.with_thinking_budget(budget);
        }

        tracing::debug!(
            level = %level,
            model_id = %request.model_id,
            search_enabled = request.search_enabled,
            history_turns = request.history.len(),
            "opening completion stream"
        );

        match self.provider.stream_generate(request) {
            Ok(handle) => TurnStream::spawn(handle),
            Err(error) => {
                tracing::error!(
                    provider = %self.provider.name(),
                    error = %error,
                    "failed to open completion stream"
                );
                TurnStream::failed(error.to_string())
            }
        }
    }
}

/// Async event stream for one chat turn. Yields `TurnEvent`s until a terminal
/// event, after which `recv` returns `None`.
pub struct TurnStream {
    events: mpsc::UnboundedReceiver<TurnEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl TurnStream {
    fn spawn(handle: veritas_llm::ProviderStreamHandle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(handle.worker);
        tokio::spawn(drive(handle.stream, events_tx, cancel_rx));

        Self {
            events: events_rx,
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Builds an already-failed stream carrying the standard error sequence.
    fn failed(detail: String) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(TurnEvent::TextDelta(STREAM_ERROR_NOTICE.to_string()));
        let _ = events_tx.send(TurnEvent::Failed {
            kind: FailureKind::Upstream,
            detail,
        });

        Self {
            events: events_rx,
            cancel_tx: None,
        }
    }

    pub async fn recv(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TurnEvent> {
        self.events.try_recv().ok()
    }

    /// Requests cancellation of the in-flight turn. The stream still yields
    /// its terminal `Failed` event before ending.
    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

async fn drive(
    mut provider_stream: ProviderEventStream,
    events_tx: mpsc::UnboundedSender<TurnEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut text = String::new();
    let mut collected: Vec<Source> = Vec::new();

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                provider_stream.cancel();
                tracing::debug!("completion stream cancelled");
                let _ = events_tx.send(TurnEvent::Failed {
                    kind: FailureKind::Cancelled,
                    detail: "stream cancelled".to_string(),
                });
                return;
            }
            next_event = provider_stream.recv() => {
                match next_event {
                    Some(StreamEvent::TextDelta(delta)) => {
                        text.push_str(&delta);
                        if events_tx.send(TurnEvent::TextDelta(delta)).is_err() {
                            return;
                        }
                    }
                    Some(StreamEvent::Sources(batch)) => {
                        collected.extend(batch.iter().cloned());
                        if events_tx.send(TurnEvent::SourcesFound(batch)).is_err() {
                            return;
                        }
                    }
                    Some(StreamEvent::Done) => {
                        let _ = events_tx.send(TurnEvent::Completed {
                            text,
                            sources: dedup_sources(collected),
                        });
                        return;
                    }
                    Some(StreamEvent::Error(detail)) => {
                        let _ =
                            events_tx.send(TurnEvent::TextDelta(STREAM_ERROR_NOTICE.to_string()));
                        let _ = events_tx.send(TurnEvent::Failed {
                            kind: FailureKind::Upstream,
                            detail,
                        });
                        return;
                    }
                    None => {
                        tracing::warn!("provider stream ended before a terminal event");
                        let _ =
                            events_tx.send(TurnEvent::TextDelta(STREAM_ERROR_NOTICE.to_string()));
                        let _ = events_tx.send(TurnEvent::Failed {
                            kind: FailureKind::Upstream,
                            detail: "provider stream ended before a terminal event".to_string(),
                        });
                        return;
                    }
                }
            }
        }
    }
}

/// Removes duplicate sources by URI, keeping the first occurrence in arrival
/// order.
fn dedup_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for source in sources {
        if seen.insert(source.uri.clone()) {
            unique.push(source);
        }
    }
    unique
}

fn provider_turns(history: &[Message]) -> Vec<ProviderTurn> {
    history
        .iter()
        .filter(|message| !message.text.trim().is_empty())
        .map(|message| ProviderTurn::new(message.role.into(), message.text.clone()))
        .collect()
}
