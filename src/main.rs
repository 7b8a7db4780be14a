mod config;
mod gemini;
mod models;
mod orchestrator;
mod pipeline;
mod render;
mod routes;

use anyhow::Context;
use axum::{Router, routing::{post, get}};
use routes::{index, submit_form, generate_course, get_course, export_course, AppState};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use std::sync::Arc;
use tower_http::cors::{CorsLayer, Any};

use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::orchestrator::Orchestrator;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/generate", post(submit_form))
        .route("/api/course", post(generate_course).get(get_course))
        .route("/api/course/export", get(export_course))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("failed to load configuration")?;
    if config.is_demo() {
        tracing::warn!("Running in demo mode - no remote calls will be made");
    }
    tracing::info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        image_concurrency = config.pipeline.image_concurrency,
        "Configuration loaded"
    );

    let gemini = Arc::new(GeminiClient::new(&config));
    let state = AppState {
        orchestrator: Orchestrator::new(gemini, config.pipeline.clone()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
