use anyhow::Context;
use dialogue_tree::api::{self, app_state::AppState};
use dialogue_tree::config::loader::ConfigLoader;
use dialogue_tree::observability::{
    ConversationMetrics, ObservabilityState, create_observability_router, init_tracing,
};
use dialogue_tree::services::{ConversationOptions, create_bot_responder, create_conversation_service};
use dialogue_tree::storage::StorageFactory;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;

    let _log_guard = init_tracing(&config.logging)?;
    info!(
        "Starting {} ({} environment)...",
        config.app_name, config.environment
    );

    let store = StorageFactory::create(&config.storage).await?;
    info!("Turn store initialized (backend: {})", config.storage.backend);

    let responder = create_bot_responder(&config.responder)?;
    info!(
        "Bot responder initialized: {} (backend: {})",
        responder.model_name(),
        config.responder.backend
    );

    let metrics = Arc::new(ConversationMetrics::default());
    let conversation_service = create_conversation_service(
        store,
        Arc::from(responder),
        ConversationOptions::from(&config),
        metrics.clone(),
    );
    info!("Conversation service initialized");

    let app_state = AppState::new(conversation_service, config.responder.wait_for_reply);

    let observability_state = Arc::new(ObservabilityState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        metrics,
    ));
    let api_router = api::create_router(
        app_state,
        Duration::from_secs(config.server.request_timeout),
    );
    let router = create_observability_router(observability_state.clone()).merge(api_router);
    info!("API router created with observability endpoints");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    observability_state.mark_ready();
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
