// src/main.rs
use std::net::SocketAddr;

use dotenvy::dotenv;
use http::HeaderValue;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polly::{app, build_store, AppState, Config, JwtVerifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok(); // Load environment variables from .env file

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("polly=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = build_store(&config).await?;
    info!(store = store.backend_tag(), "store ready");

    let verifier = JwtVerifier::new(&config.jwt_secret, config.jwt_audience.as_deref());
    let state = AppState::new(store, verifier);

    let cors_origin = match config.cors_origin.as_deref() {
        Some(origin) => Some(origin.parse::<HeaderValue>()?),
        None => {
            warn!("CORS_ORIGIN not set, allowing any origin");
            None
        }
    };

    let router = app(state, cors_origin.as_ref());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("listening on http://{}", config.bind_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
