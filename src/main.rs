//! Renamarr - media file rename service
//!
//! Entry point: loads configuration, wires the catalog and subtitle
//! services, and serves the REST API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use renamarr::AppState;
use renamarr::api;
use renamarr::config::Config;
use renamarr::services::{
    ExecutorService, MkvToolset, OpenSubtitlesClient, ProposalService, TvdbClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renamarr=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Renamarr");
    tracing::info!("Configuration loaded");

    let timeout = Duration::from_secs(config.http_timeout_secs);

    // Credentials may be absent; scans still run, with resolution disabled.
    let catalog = TvdbClient::new(
        config.tvdb_base_url.clone(),
        config.tvdb_api_key.clone(),
        config.tvdb_pin.clone(),
        timeout,
    )?;
    if config.tvdb_api_key.is_none() {
        tracing::warn!("TVDB_API_KEY is not set; metadata resolution will be disabled");
    }

    let proposals = Arc::new(ProposalService::new(
        Arc::new(catalog),
        config.title_overrides.clone(),
    ));
    tracing::info!("Proposal service initialized");

    // Subtitle download only runs with a full set of credentials
    let subtitle_provider = match (
        config.opensubtitles_api_key.clone(),
        config.opensubtitles_username.clone(),
        config.opensubtitles_password.clone(),
    ) {
        (Some(api_key), Some(username), Some(password)) => Some(OpenSubtitlesClient::new(
            config.opensubtitles_base_url.clone(),
            api_key,
            username,
            password,
            timeout,
        )?),
        _ => None,
    };
    if subtitle_provider.is_none() {
        tracing::info!("OpenSubtitles credentials not set; subtitle download disabled");
    }

    let extractor = MkvToolset::new(config.mkvmerge_path.clone(), config.mkvextract_path.clone());
    if !extractor.is_available().await {
        tracing::warn!("mkvmerge not found; embedded subtitle extraction will fail");
    }

    let executor = Arc::new(ExecutorService::new(
        extractor,
        subtitle_provider,
        config.subtitle_language.clone(),
    ));
    tracing::info!("Executor service initialized");

    let state = AppState {
        config: config.clone(),
        proposals,
        executor,
    };

    let app = Router::new()
        .merge(api::health::router())
        .nest("/api", api::rename::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
