//! Triage Graph - diabetes risk intake assistant
//!
//! A conversation graph that collects clinical metrics from free text,
//! validates them, and pauses for confirmation before running the risk
//! classifier.

mod api;
mod capabilities;
mod config;
mod db;
mod llm;
mod report;
mod runtime;
mod state_machine;
mod steps;

use api::{create_router, AppState};
use capabilities::{
    DuckDuckGoSearch, LinearModelClassifier, LlmExtractor, RuleExtractor, UnavailableClassifier,
};
use config::AppConfig;
use db::Database;
use llm::LlmService;
use runtime::{
    recover_sessions, Classifier, ConversationRuntime, DatabaseStorage, Extractor, Retriever,
    SessionManager,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_graph=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Settle sessions a crash left mid-step
    let recovered = recover_sessions(&db)?;
    if recovered > 0 {
        tracing::info!(count = recovered, "Recovered interrupted sessions");
    }

    let extractor: Arc<dyn Extractor> = match config.llm.service()? {
        Some(llm) => {
            tracing::info!(model = %llm.model_id(), "LLM extraction enabled");
            Arc::new(LlmExtractor::new(llm))
        }
        None => {
            tracing::warn!(
                "No LLM API key configured. Set OPENAI_API_KEY or GITHUB_TOKEN; \
                 falling back to rule-based extraction."
            );
            Arc::new(RuleExtractor)
        }
    };

    let classifier: Arc<dyn Classifier> = match &config.model_path {
        Some(path) => match LinearModelClassifier::load(path) {
            Ok(model) => {
                tracing::info!(model = %model.model_id(), path = %path.display(), "Classifier loaded");
                Arc::new(model)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Classifier unavailable");
                Arc::new(UnavailableClassifier::new(e.to_string()))
            }
        },
        None => {
            tracing::warn!("TRIAGE_MODEL_PATH not set; risk prediction is unavailable");
            Arc::new(UnavailableClassifier::new("no model configured"))
        }
    };

    let retriever: Arc<dyn Retriever> = Arc::new(DuckDuckGoSearch::new(&config.search_url)?);

    let runtime = ConversationRuntime::new(
        DatabaseStorage::new(db),
        extractor,
        classifier,
        retriever,
        config.ranges.clone(),
    );
    let state = AppState::new(SessionManager::new(runtime));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Triage graph server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
