//! Remote speech synthesis.

use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::error::SynthesisError;

/// Stream of encoded audio bytes for one text unit. Single pass; dropping it
/// aborts the transfer.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes, SynthesisError>> + Send>>;

/// A piece of synthesized audio tagged with the unit it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub bytes: Bytes,
    pub sequence: u64,
}

/// Text-to-speech engine interface.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text` and return its audio as it arrives.
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SynthesisError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

/// Everything needed to reach the synthesis service. Values are used as
/// given; defaults belong to whoever builds this.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    pub voice_settings: VoiceSettings,
    pub timeout: Option<Duration>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// Client for an ElevenLabs-style streaming text-to-speech endpoint.
pub struct SpeechClient {
    http: reqwest::Client,
    config: SpeechConfig,
}

impl SpeechClient {
    pub fn new(config: SpeechConfig) -> Result<Self, SynthesisError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }
}

#[async_trait]
impl Synthesizer for SpeechClient {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let body = SpeechRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: &self.config.voice_settings,
        };
        let mut request = self
            .http
            .post(self.endpoint())
            .header("xi-api-key", &self.config.api_key)
            .header("accept", "audio/mpeg")
            .json(&body);
        if let Some(timeout) = self.config.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(chars = text.len(), voice = %self.config.voice_id, "speech stream opened");
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SynthesisError::Transport));
        Ok(Box::pin(stream))
    }
}
