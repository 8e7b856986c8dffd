use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LlmError;
use crate::event::DONE_SENTINEL;
use crate::sse::SseDecoder;
use crate::ui::{done_frame, UiChunk};

/// Byte stream in the UI message stream format.
pub type UiByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Connection settings for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Structure for the OpenAI Chat API request
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// One streamed chunk of the OpenAI Chat API response
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.model.trim().is_empty() {
            return Err(LlmError::Config("model must not be empty".into()));
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Start a streamed completion and return it re-encoded as a UI message
    /// stream: `start`, `text-start`, `text-delta`*, `text-end`, `finish`,
    /// then the done sentinel.
    pub async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<UiByteStream, LlmError> {
        let system = self
            .config
            .system_prompt
            .as_ref()
            .map(|prompt| ChatMessage::new("system", prompt.clone()));
        let req_body = ChatRequest {
            model: &self.config.model,
            messages: system.iter().chain(messages.iter()).collect(),
            stream: true,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!("Using LLM endpoint: {}", url);

        let mut request = self.http.post(&url).json(&req_body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!(model = %self.config.model, "LLM stream opened");

        let message_id = format!("msg-{}", Uuid::new_v4());
        let upstream = response.bytes_stream();
        let stream = async_stream::stream! {
            let text_id = "0".to_string();
            yield Ok(UiChunk::Start { message_id }.to_frame());
            yield Ok(UiChunk::TextStart { id: text_id.clone() }.to_frame());

            let mut frames = SseDecoder::new();
            futures::pin_mut!(upstream);
            let mut finished = false;
            'read: while let Some(chunk) = upstream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("LLM stream interrupted: {e}");
                        yield Ok(UiChunk::Error { error_text: e.to_string() }.to_frame());
                        yield Err(LlmError::Transport(e));
                        return;
                    }
                };
                for data in frames.push(&chunk) {
                    if data.trim() == DONE_SENTINEL {
                        finished = true;
                        break 'read;
                    }
                    match serde_json::from_str::<ChatChunk>(&data) {
                        Ok(parsed) => {
                            for choice in parsed.choices {
                                if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                                    yield Ok(UiChunk::TextDelta { id: text_id.clone(), delta }.to_frame());
                                }
                                if let Some(reason) = choice.finish_reason {
                                    debug!(%reason, "LLM finished");
                                }
                            }
                        }
                        Err(e) => warn!("Skipping malformed LLM chunk: {e}"),
                    }
                }
            }
            if !finished {
                debug!("LLM stream closed without done sentinel");
            }

            yield Ok(UiChunk::TextEnd { id: text_id }.to_frame());
            yield Ok(UiChunk::Finish.to_frame());
            yield Ok(done_frame());
        };

        Ok(Box::pin(stream))
    }
}
