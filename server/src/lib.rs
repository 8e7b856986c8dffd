pub mod chat;
pub mod config;
pub mod error;
pub mod metrics;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use llm_core::LlmClient;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tts_core::{PlayerCommand, SpeechClient, Synthesizer};

use crate::config::ServerConfig;
use crate::metrics::{MetricsResponse, RelayMetrics};

/// What a response needs to be spoken aloud.
#[derive(Clone)]
pub struct SpeechBackend {
    pub synth: Arc<dyn Synthesizer>,
    pub player: PlayerCommand,
}

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<LlmClient>,
    pub speech: Option<SpeechBackend>,
    pub metrics: RelayMetrics,
    /// Parent of every relay's cancellation; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let llm = Arc::new(LlmClient::new(config.llm.clone())?);

        let speech = match &config.speech {
            Some(settings) => {
                let client = SpeechClient::new(settings.client.clone())?;
                info!(
                    voice = %settings.client.voice_id,
                    player = %settings.player.program,
                    "Speech enabled"
                );
                Some(SpeechBackend {
                    synth: Arc::new(client),
                    player: settings.player.clone(),
                })
            }
            None => {
                info!("Speech disabled");
                None
            }
        };

        Ok(Self {
            llm,
            speech,
            metrics: RelayMetrics::new(),
            shutdown: CancellationToken::new(),
        })
    }
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.metrics.snapshot())
}

/// Request ID middleware for tracing
pub async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let Ok(value) = HeaderValue::from_str(&request_id) else {
        return next.run(request).await;
    };
    request.headers_mut().insert("x-request-id", value.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert("x-request-id", value);
    response
}

/// CORS from the configured origins, permissive when none are set.
pub fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let base = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("No usable CORS_ALLOWED_ORIGINS, allowing all origins");
        base.allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

/// All routes, served at the root and under `/api`.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/chat", post(chat::chat_endpoint))
        .route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
