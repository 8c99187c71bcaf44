use futures::StreamExt;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::provider::{
    BuildHttpClientSnafu, ChunkDecodeSnafu, EmptyPromptSnafu, HttpSendSnafu, HttpStatusSnafu,
    LlmProvider, MissingApiKeySnafu, ProviderConfig, ProviderError, ProviderResult,
    ProviderStreamHandle, ProviderWorker, Source, StreamEvent, StreamRequest, TurnRole,
    make_event_stream,
};

pub const GEMINI_PROVIDER_ID: &str = "gemini";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

fn wire_role(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
struct WirePart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    google_search: WireGoogleSearch,
}

#[derive(Debug, Serialize)]
struct WireGoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    thinking_config: WireThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireThinkingConfig {
    thinking_budget: u32,
}

impl GenerateRequest {
    fn from_stream_request(request: &StreamRequest) -> Self {
        let mut contents: Vec<WireContent> = request
            .history
            .iter()
            .map(|turn| WireContent {
                role: Some(wire_role(turn.role)),
                parts: vec![WirePart {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        contents.push(WireContent {
            role: Some(wire_role(TurnRole::User)),
            parts: vec![WirePart {
                text: request.prompt.clone(),
            }],
        });

        let system_instruction =
            request
                .system_instruction
                .as_ref()
                .map(|instruction| WireContent {
                    role: None,
                    parts: vec![WirePart {
                        text: instruction.clone(),
                    }],
                });

        let tools = if request.search_enabled {
            vec![WireTool {
                google_search: WireGoogleSearch {},
            }]
        } else {
            Vec::new()
        };

        let generation_config = request
            .thinking_budget
            .map(|thinking_budget| WireGenerationConfig {
                thinking_config: WireThinkingConfig { thinking_budget },
            });

        Self {
            contents,
            system_instruction,
            tools,
            generation_config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<ChunkCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkCandidate {
    content: Option<ChunkContent>,
    grounding_metadata: Option<ChunkGroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChunkContent {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

#[derive(Debug, Deserialize)]
struct ChunkPart {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<ChunkGroundingSource>,
}

#[derive(Debug, Deserialize)]
struct ChunkGroundingSource {
    web: Option<ChunkWebSource>,
}

#[derive(Debug, Deserialize)]
struct ChunkWebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateChunk {
    fn delta_text(&self) -> String {
        let mut delta = String::new();
        let Some(content) = self.candidates.first().and_then(|c| c.content.as_ref()) else {
            return delta;
        };
        for part in &content.parts {
            // Thought parts carry interim reasoning, not answer text.
            if part.thought == Some(true) {
                continue;
            }
            if let Some(text) = &part.text {
                delta.push_str(text);
            }
        }
        delta
    }

    fn sources(&self) -> Vec<Source> {
        let Some(metadata) = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
        else {
            return Vec::new();
        };
        metadata
            .grounding_chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| match (&web.uri, &web.title) {
                (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                    Some(Source::new(uri.clone(), title.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Reassembles SSE `data:` payloads from a byte stream whose reads may split
/// lines anywhere. Splitting at `\n` is UTF-8 safe because continuation bytes
/// never equal 0x0A.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline_at) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line_bytes: Vec<u8> = self.pending.drain(..=newline_at).collect();
            if let Some(payload) = Self::data_payload(&line_bytes) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Drains the final line of a stream that ended without a trailing
    /// newline.
    fn finish(&mut self) -> Option<String> {
        let line_bytes = std::mem::take(&mut self.pending);
        Self::data_payload(&line_bytes)
    }

    fn data_payload(line_bytes: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line_bytes);
        let line = line.trim_end_matches(['\r', '\n']);
        let payload = line.strip_prefix("data:")?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        if payload.is_empty() {
            return None;
        }
        Some(payload.to_string())
    }
}

pub struct GeminiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "gemini-provider-new",
                provider_id: GEMINI_PROVIDER_ID,
            }
        );

        let mut config = config;
        if config.endpoint.is_empty() {
            config.endpoint = DEFAULT_GEMINI_ENDPOINT.to_string();
        }

        let client = reqwest::Client::builder().build().context(
            BuildHttpClientSnafu {
                stage: "build-http-client",
            },
        )?;

        Ok(Self { config, client })
    }

    fn request_url(config: &ProviderConfig, model_id: &str) -> String {
        format!(
            "{}/v1beta/models/{model_id}:streamGenerateContent?alt=sse",
            config.endpoint
        )
    }

    async fn open_stream(
        client: &reqwest::Client,
        config: &ProviderConfig,
        request: &StreamRequest,
    ) -> ProviderResult<reqwest::Response> {
        let url = Self::request_url(config, &request.model_id);
        let body = GenerateRequest::from_stream_request(request);

        let response = client
            .post(&url)
            .header("x-goog-api-key", config.api_key.as_str())
            .json(&body)
            .send()
            .await
            .context(HttpSendSnafu {
                stage: "send-generate-request",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return HttpStatusSnafu {
                stage: "generate-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(response)
    }

    fn emit_error_event(event_tx: &mpsc::UnboundedSender<StreamEvent>, error: ProviderError) {
        let _ = event_tx.send(StreamEvent::Error(error.to_string()));
    }

    fn forward_chunk(
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
        chunk: GenerateChunk,
    ) -> Result<(), ()> {
        let delta = chunk.delta_text();
        if !delta.is_empty() && event_tx.send(StreamEvent::TextDelta(delta)).is_err() {
            return Err(());
        }

        let sources = chunk.sources();
        if !sources.is_empty() && event_tx.send(StreamEvent::Sources(sources)).is_err() {
            return Err(());
        }

        Ok(())
    }

    fn decode_chunk(payload: &str) -> ProviderResult<GenerateChunk> {
        serde_json::from_str(payload).context(ChunkDecodeSnafu {
            stage: "decode-sse-payload",
        })
    }

    async fn run_stream_worker(
        client: reqwest::Client,
        config: ProviderConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let response = match Self::open_stream(&client, &config, &request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, error);
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut cancelled = false;
        let mut stream_failed = false;

        'drain: loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    // Dropping the body stream closes the connection.
                    tracing::debug!(model_id = %request.model_id, "provider stream cancelled");
                    break 'drain;
                }
                next_chunk = body.next() => {
                    match next_chunk {
                        Some(Ok(bytes)) => {
                            for payload in lines.push(&bytes) {
                                let chunk = match Self::decode_chunk(&payload) {
                                    Ok(chunk) => chunk,
                                    Err(error) => {
                                        stream_failed = true;
                                        tracing::warn!(
                                            model_id = %request.model_id,
                                            error = %error,
                                            "provider emitted an undecodable chunk"
                                        );
                                        Self::emit_error_event(&event_tx, error);
                                        break 'drain;
                                    }
                                };
                                if Self::forward_chunk(&event_tx, chunk).is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            let error = ProviderError::StreamTransport {
                                stage: "stream-chunk",
                                source,
                            };
                            tracing::warn!(
                                model_id = %request.model_id,
                                error = %error,
                                "provider stream interrupted"
                            );
                            Self::emit_error_event(&event_tx, error);
                            break 'drain;
                        }
                        None => break 'drain,
                    }
                }
            }
        }

        if cancelled || stream_failed {
            return;
        }

        // The final line may arrive without its terminating newline.
        if let Some(payload) = lines.finish() {
            match Self::decode_chunk(&payload) {
                Ok(chunk) => {
                    if Self::forward_chunk(&event_tx, chunk).is_err() {
                        return;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        model_id = %request.model_id,
                        error = %error,
                        "provider emitted an undecodable chunk"
                    );
                    Self::emit_error_event(&event_tx, error);
                    return;
                }
            }
        }

        let _ = event_tx.send(StreamEvent::Done);
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        GEMINI_PROVIDER_ID
    }

    fn stream_generate(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.prompt.trim().is_empty(),
            EmptyPromptSnafu {
                stage: "stream-generate",
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.client.clone(),
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}
