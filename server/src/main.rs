use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer};
use tracing::{info, warn};

use server::config::ServerConfig;
use server::{cors_layer, create_router, AppState};

/// Chat bodies are bounded by validation; this only stops oversized uploads early.
const MAX_BODY_BYTES: usize = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting chat relay server...");

    let config = ServerConfig::from_env();
    if config.llm.api_key.is_none() {
        warn!("OPENAI_API_KEY not set, upstream requests are sent without credentials");
    }
    let state = AppState::from_config(&config)?;
    let shutdown = state.shutdown.clone();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, model={}",
        config.port, config.rate_limit_per_minute, config.llm.model
    );

    // Global limit: all clients share one bucket, which behaves the same
    // behind proxies where the peer address is not the client.
    let per_second = u64::from((config.rate_limit_per_minute / 60).max(1));
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    // Layers are applied innermost first, so the governor is outermost.
    // Adding them one at a time lets axum normalize each response body.
    let app = create_router(state)
        .layer(cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(GovernorLayer::new(governor_conf));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutting down, stopping active speech");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
