//! Axum-based HTTP gateway exposing chat and evolution over localhost.
//!
//! Hyper handles HTTP/1.1 compliance; the router adds a body limit and a
//! request timeout so a stalled client cannot pin a worker.

mod handlers;

use handlers::{
    handle_chat, handle_evolution_history, handle_evolve, handle_health, handle_history,
    handle_persona, handle_rollback, handle_state_history, handle_topic_score,
};

use crate::chat::ChatAssistant;
use crate::config::Config;
use crate::conversation::TurnStore;
use crate::evolution::{SelfEvolutionPipeline, VersionStore};
use crate::llm::LlmGateway;
use crate::persona::StyleProfileStore;
use anyhow::Result;
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (256KB); evolution requests carry whole source
/// files.
pub const MAX_BODY_SIZE: usize = 262_144;
/// Request timeout. Generous because a chat turn includes backend retries.
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<ChatAssistant>,
    pub pipeline: Arc<SelfEvolutionPipeline>,
    pub backend_name: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/sessions/{id}/persona", get(handle_persona))
        .route("/sessions/{id}/state-history", get(handle_state_history))
        .route("/sessions/{id}/topic-score", get(handle_topic_score))
        .route("/evolve", post(handle_evolve))
        .route("/rollback", post(handle_rollback))
        .route("/evolution/{target_id}", get(handle_evolution_history))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Wire up stores, backend, and pipeline from config.
pub fn build_state(config: &Config) -> Result<AppState> {
    let gateway = Arc::new(LlmGateway::from_config(config));
    let backend_name = gateway.backend_name();

    let turns = Arc::new(TurnStore::open(&config.turns_db_path())?);
    let versions = Arc::new(VersionStore::open(&config.evolution_db_path())?);
    let profile = StyleProfileStore::new(config.profile_path()).load()?;

    let assistant = Arc::new(ChatAssistant::new(
        config,
        Arc::clone(&gateway),
        turns,
        profile,
    ));
    let pipeline = Arc::new(SelfEvolutionPipeline::new(
        gateway,
        versions,
        config.llm.evolve_model(),
        config.llm.max_tokens,
    ));

    Ok(AppState {
        assistant,
        pipeline,
        backend_name,
    })
}

/// Run the HTTP gateway until the process is stopped.
pub async fn run_gateway(config: &Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    run_gateway_with_listener(listener, config).await
}

/// Run the gateway from a pre-bound listener. Split out so tests can bind
/// port 0.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    config: &Config,
) -> Result<()> {
    let state = build_state(config)?;
    let local = listener.local_addr()?;
    tracing::info!(
        addr = %local,
        backend = state.backend_name,
        "Gateway listening"
    );
    println!("◆ Geist gateway listening on http://{local}");
    println!("  POST /chat");
    println!("  POST /evolve, POST /rollback");
    println!("  GET  /sessions/{{id}}/history | persona | state-history | topic-score");
    println!("  GET  /evolution/{{target_id}}");
    println!("  GET  /health");
    println!("  Press Ctrl+C to stop\n");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
