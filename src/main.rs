//! SkyShow assistant proxy server binary.

use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use skyshow_assistant::adapters::http::{api_router, ProxyState};
use skyshow_assistant::adapters::openai::OpenAiAssistantGateway;
use skyshow_assistant::application::TurnService;
use skyshow_assistant::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    // Missing credentials or assistant id are fatal here, before any
    // request handler exists.
    config.validate()?;

    // One authenticated gateway for the life of the process, shared by all
    // requests.
    let gateway = Arc::new(OpenAiAssistantGateway::from_config(&config.openai)?);
    let turns = Arc::new(
        TurnService::new(gateway)
            .with_poll_interval(config.openai.poll_interval())
            .with_max_poll_interval(config.openai.max_poll_interval())
            .with_run_deadline(config.openai.run_deadline()),
    );

    let state = ProxyState::new(
        turns,
        config.openai.has_api_key(),
        config.openai.has_assistant_id(),
    );

    let app = api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "assistant proxy listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// CORS from configured origins. With none configured the layer falls back
/// to any-origin outside production; in production it allows no
/// cross-origin callers instead.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.server.allow_permissive_cors() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        tracing::warn!("no CORS origins configured; cross-origin requests are disabled");
        CorsLayer::new()
    }
}
