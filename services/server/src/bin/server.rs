//! services/server/src/bin/server.rs

use chatbot_core::controller::Services;
use server_lib::{
    adapters::{db::DbAdapter, chat_llm::OpenAiChatAdapter},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState, view::Views, SessionRegistry},
};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Database & Run Migrations ---
    info!("Opening database at {}...", config.database_url);
    let db_adapter = Arc::new(DbAdapter::connect(&config.database_url).await?);
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Model Adapter ---
    let client =
        OpenAiChatAdapter::client_for(&config.llm_api_key, config.llm_api_base.as_deref());
    let chat_adapter = Arc::new(OpenAiChatAdapter::new(client, config.chat_model.clone()));
    info!("Using chat model '{}'", config.chat_model);

    // --- 4. Build the Shared AppState ---
    let sessions = SessionRegistry::new(chrono::Duration::minutes(config.session_idle_minutes));
    let app_state = Arc::new(AppState {
        services: Services {
            credentials: db_adapter.clone(),
            transcripts: db_adapter,
            model: chat_adapter,
        },
        sessions: sessions.clone(),
        views: Views::new()?,
    });

    let shutdown = CancellationToken::new();
    let sweeper = sessions.spawn_sweeper(shutdown.clone());

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    sweeper
        .await
        .map_err(|e| ApiError::Internal(format!("Session sweeper panicked: {}", e)))?;
    info!("Server stopped.");
    Ok(())
}

/// Resolves on Ctrl-C and cancels `token` so background tasks stop too.
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {:?}", e);
    }
    info!("Shutdown requested.");
    token.cancel();
}
