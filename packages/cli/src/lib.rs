// ABOUTME: MarketWise server assembly and command implementations
// ABOUTME: Wires storage, text generation, prompts and the API router into a running server

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use axum::Router;
use marketwise_ai::AIService;
use marketwise_api::{create_router, ApiState};
use marketwise_insights::{InsightService, ProfileStorage};
use marketwise_prompts::PromptManager;
use marketwise_questionnaire::{CatalogDocument, ImportSummary, QuestionnaireStorage};
use marketwise_storage::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod config;

#[cfg(test)]
mod tests;

use config::Config;

/// Open the configured database and bring its schema up to date
pub async fn open_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let pool = marketwise_storage::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    marketwise_storage::run_migrations(&pool).await?;
    Ok(pool)
}

/// Build the application state over an open pool
pub fn build_state(config: &Config, pool: SqlitePool) -> anyhow::Result<ApiState> {
    let generator = AIService::from_env().context("Failed to create text generation client")?;
    info!("Text generation model: {}", generator.model());

    let questionnaire = QuestionnaireStorage::new(pool.clone());
    let insights = InsightService::new(
        Arc::new(generator),
        PromptManager::new(config.prompts_dir.clone()),
        questionnaire.clone(),
        ProfileStorage::new(pool),
        config.response_language.clone(),
    );

    Ok(ApiState::new(Arc::new(insights), questionnaire, config.engine))
}

/// The API router with CORS and request tracing
pub fn build_app(config: &Config, state: ApiState) -> anyhow::Result<Router> {
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin {}", config.cors_origin))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let pool = open_database(&config).await?;
    let state = build_state(&config, pool)?;
    let app = build_app(&config, state)?;

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("MarketWise server listening on http://{}", addr);
    info!("CORS origin: {}", config.cors_origin);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("MarketWise server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

pub async fn run_migrations(config: &Config) -> anyhow::Result<()> {
    open_database(config).await?;
    info!("Database {} is up to date", config.database_url);
    Ok(())
}

/// Replace the stored catalog with the one described in `path`.
///
/// Stored answers are removed together with the old catalog.
pub async fn import_catalog(config: &Config, path: &Path) -> anyhow::Result<ImportSummary> {
    let catalog = CatalogDocument::from_file(path)
        .and_then(|document| document.into_catalog())
        .with_context(|| format!("Invalid catalog file {}", path.display()))?;

    let pool = open_database(config).await?;
    let summary = QuestionnaireStorage::new(pool)
        .replace_catalog(&catalog)
        .await
        .context("Failed to store catalog")?;

    info!(
        "Imported {} stages, {} questions and {} options from {}",
        summary.stages,
        summary.questions,
        summary.options,
        path.display()
    );
    Ok(summary)
}
