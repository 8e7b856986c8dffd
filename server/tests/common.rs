//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Path,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use llm_core::{LlmClient, LlmConfig};
use serde_json::{json, Value};
use server::{metrics::RelayMetrics, AppState, SpeechBackend};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tts_core::{PlayerCommand, SpeechClient, SpeechConfig, VoiceSettings};

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_mock(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// One OpenAI-style streamed chunk per delta.
pub fn openai_frames(deltas: &[&str]) -> Vec<Bytes> {
    deltas
        .iter()
        .map(|d| {
            let chunk = json!({"choices": [{"delta": {"content": d}, "finish_reason": null}]});
            Bytes::from(format!("data: {chunk}\n\n"))
        })
        .collect()
}

fn sse_response(body: Body) -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/event-stream")], body)
}

/// Chat completions mock that streams `deltas` then the done sentinel.
pub async fn mock_llm(deltas: &'static [&'static str]) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(body): Json<Value>| async move {
            assert_eq!(body["stream"], true);
            let mut frames = openai_frames(deltas);
            frames.push(Bytes::from_static(b"data: [DONE]\n\n"));
            let chunks = stream::iter(frames.into_iter().map(Ok::<_, std::io::Error>));
            sse_response(Body::from_stream(chunks))
        }),
    );
    format!("{}/v1", spawn_mock(app).await)
}

/// Chat completions mock that sends `deltas` and then never finishes.
pub async fn stalling_llm(deltas: &'static [&'static str]) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || async move {
            let chunks = stream::iter(openai_frames(deltas).into_iter().map(Ok::<_, std::io::Error>))
                .chain(stream::pending());
            sse_response(Body::from_stream(chunks))
        }),
    );
    format!("{}/v1", spawn_mock(app).await)
}

pub async fn rejecting_llm() -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
    );
    format!("{}/v1", spawn_mock(app).await)
}

/// Synthesis mock whose "audio" for a text is the text followed by `|`.
pub async fn mock_tts() -> String {
    let app = Router::new().route(
        "/v1/text-to-speech/{voice}/stream",
        post(|Path(_voice): Path<String>, Json(body): Json<Value>| async move {
            let text = body["text"].as_str().unwrap_or_default().to_string();
            format!("{text}|")
        }),
    );
    spawn_mock(app).await
}

/// Synthesis mock that reports each request and never answers.
pub async fn hanging_tts() -> (String, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/v1/text-to-speech/{voice}/stream",
        post(move |Json(body): Json<Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body["text"].as_str().unwrap_or_default().to_string());
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }
        }),
    );
    (spawn_mock(app).await, rx)
}

pub fn speech_backend(tts_base: String, player: PlayerCommand) -> SpeechBackend {
    let client = SpeechClient::new(SpeechConfig {
        base_url: tts_base,
        api_key: "test-key".into(),
        voice_id: "test-voice".into(),
        model_id: "test-model".into(),
        voice_settings: VoiceSettings {
            stability: 0.5,
            similarity_boost: 0.75,
        },
        timeout: None,
    })
    .unwrap();
    SpeechBackend {
        synth: Arc::new(client),
        player,
    }
}

/// Create a test app instance
pub fn create_test_app(llm_base: String, speech: Option<SpeechBackend>) -> (Router, AppState) {
    let llm = LlmClient::new(LlmConfig {
        base_url: llm_base,
        api_key: Some("test-key-for-integration-tests".into()),
        model: "test-model".into(),
        system_prompt: None,
        max_tokens: None,
    })
    .expect("Failed to create LLM client for tests");

    let state = AppState {
        llm: Arc::new(llm),
        speech,
        metrics: RelayMetrics::new(),
        shutdown: CancellationToken::new(),
    };
    (server::create_router(state.clone()), state)
}

/// Body frames without the leading `start` frame, whose message id varies.
pub fn frames_after_start(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .split("\n\n")
        .filter(|f| !f.is_empty())
        .skip(1)
        .map(str::to_string)
        .collect()
}

/// Wait until `done` holds, polling every 20 ms for up to five seconds.
pub async fn eventually(mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
