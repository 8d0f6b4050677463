use std::sync::Arc;

use anyhow::Context;
use coach_server_lib::config::AppConfig;
use coach_server_lib::services::OpenAiChatProvider;
use coach_server_lib::{db, handlers, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Coach Server");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Data directory: {:?}", config.data_dir);

    let pool = db::init_database(config.data_dir.clone()).context("Failed to initialize database")?;
    tracing::info!("Database initialized");

    if config.openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; chat streaming will answer 503");
    }

    let provider = Arc::new(OpenAiChatProvider::new(config.openai.clone()));
    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::new(pool, config, provider));
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Coach Server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Coach Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, keep serving
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
