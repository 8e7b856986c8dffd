//! Streaming chat endpoint.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::Response,
    Json,
};
use bytes::Bytes;
use futures_util::Stream;
use llm_core::{ChatMessage, LlmError, UiByteStream, UI_STREAM_HEADER, UI_STREAM_VERSION};
use serde::Deserialize;
use tracing::{error, info};
use tts_core::{PlaybackSink, RelayCoordinator, SpeechRelay};

use crate::error::ApiError;
use crate::validation::validate_chat_request;
use crate::{AppState, SpeechBackend};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

pub async fn chat_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    state.metrics.record_chat_request();
    let start_time = Instant::now();

    validate_chat_request(&req.messages)?;
    info!(
        "Chat request received: messages={}, model={}",
        req.messages.len(),
        state.llm.model()
    );

    let upstream = match state.llm.stream_chat(&req.messages).await {
        Ok(stream) => stream,
        Err(e) => {
            state.metrics.record_upstream_failure();
            return Err(e.into());
        }
    };
    state
        .metrics
        .record_latency(start_time.elapsed().as_millis() as u64);

    let body = match &state.speech {
        Some(speech) => Body::from_stream(start_speech(&state, speech, upstream)),
        None => Body::from_stream(upstream),
    };

    Response::builder()
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(UI_STREAM_HEADER, UI_STREAM_VERSION)
        .body(body)
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {e}")))
}

/// Spawn the relay for this response and return the tapped upstream.
fn start_speech(
    state: &AppState,
    speech: &SpeechBackend,
    upstream: UiByteStream,
) -> impl Stream<Item = Result<Bytes, LlmError>> + Send + 'static {
    let sink = PlaybackSink::new(speech.player.clone());
    let (handle, worker) =
        RelayCoordinator::spawn(speech.synth.clone(), sink, state.shutdown.child_token());
    state.metrics.record_relay_started();

    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        match worker.await {
            Ok(summary) => {
                info!(
                    units = summary.units_spoken,
                    failures = summary.synthesis_failures,
                    cancelled = summary.cancelled,
                    "Speech relay finished"
                );
                metrics.record_relay(&summary);
            }
            Err(e) => error!("Speech relay task failed: {e}"),
        }
    });

    SpeechRelay::new(handle).tap(upstream)
}
