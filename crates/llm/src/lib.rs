#![deny(unsafe_code)]

//! Streaming LLM provider layer.
//!
//! Exposes a provider-agnostic trait plus the Gemini adapter that speaks the
//! `streamGenerateContent` SSE protocol. Consumers receive events over a
//! channel-backed stream and can cancel the in-flight request at any point.

use std::sync::Arc;

mod gemini;
mod provider;

pub use gemini::{DEFAULT_GEMINI_ENDPOINT, GEMINI_PROVIDER_ID, GeminiProvider};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderResult,
    ProviderStreamHandle, ProviderTurn, ProviderWorker, Source, StreamEvent, StreamRequest,
    TurnRole, make_event_stream,
};

pub fn create_provider(config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    Ok(Arc::new(GeminiProvider::new(config)?))
}
