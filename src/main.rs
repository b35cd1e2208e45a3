mod answer_matching;
mod api;
mod config;
mod errors;
mod history;
mod llm_client;
mod models;
mod session_store;
mod study_service;

use anyhow::Result;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    api::{AppState, create_router},
    config::Config,
    history::HistoryStore,
    llm_client::OpenRouterClient,
    session_store::McqSessionStore,
    study_service::StudyService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging with file output
    let _guard = setup_logging()?;

    let config = Config::from_env()?;
    config.validate()?;

    info!("Starting studygen server...");

    let llm_client = OpenRouterClient::new(&config.llm)?;
    let session_store = McqSessionStore::new(config.session.ttl_seconds);
    let study_service = StudyService::new(llm_client, session_store);

    let history = HistoryStore::new(&config.database.url).await?;
    info!("History store initialized");

    let state = AppState {
        study_service,
        history,
    };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn setup_logging() -> Result<WorkerGuard> {
    use std::fs;
    use tracing_subscriber::fmt;

    // Create logs directory if it doesn't exist
    fs::create_dir_all("logs").unwrap_or_else(|e| {
        eprintln!("Warning: Could not create logs directory: {}", e);
    });

    let default_log_level = "info,studygen=debug";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level));

    // Daily-rotated file output alongside the console
    let file_appender = tracing_appender::rolling::daily("logs", "studygen.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking_file);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized - writing to logs/studygen.log with daily rotation");

    Ok(guard)
}
