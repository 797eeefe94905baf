use super::AppState;
use crate::error::EvolutionError;
use crate::evolution::EvolveOutcome;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub(super) struct ChatBody {
    /// Omitted on the first message; the reply carries the generated id.
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Deserialize)]
pub(super) struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub(super) struct EvolveBody {
    pub target_id: String,
    pub source: String,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Deserialize)]
pub(super) struct RollbackBody {
    pub target_id: String,
    pub version: u32,
}

/// GET /health
pub(super) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "backend": state.backend_name,
    }))
}

/// POST /chat
pub(super) async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => {
            let err = serde_json::json!({
                "error": format!("Invalid JSON: {e}. Expected: {{\"message\": \"...\"}}")
            });
            return (StatusCode::BAD_REQUEST, Json(err));
        }
    };
    if body.message.trim().is_empty() {
        let err = serde_json::json!({"error": "message must not be empty"});
        return (StatusCode::BAD_REQUEST, Json(err));
    }

    let session_id = body
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match state
        .assistant
        .chat(&session_id, &body.message, body.strict)
        .await
    {
        Ok(reply) => {
            let body = serde_json::json!({
                "session_id": session_id,
                "seq": reply.turn.seq,
                "reply": reply.turn.assistant_text,
                "generated": reply.generated,
                "state": reply.turn.state,
            });
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Chat turn failed");
            let err = serde_json::json!({"error": e.to_string()});
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
        }
    }
}

/// GET /sessions/{id}/history
pub(super) async fn handle_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.assistant.turns(&session_id, query.limit) {
        Ok(turns) => (StatusCode::OK, Json(serde_json::json!({"turns": turns}))),
        Err(e) => {
            let err = serde_json::json!({"error": e.to_string()});
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
        }
    }
}

/// GET /sessions/{id}/persona
pub(super) async fn handle_persona(
    State(state): State<AppState>,
    Path(_session_id): Path<String>,
) -> impl IntoResponse {
    // The profile is global; the per-session piece is the anchor set.
    Json(serde_json::json!({
        "profile": state.assistant.profile(),
        "anchor_topics": state.assistant.anchors(),
    }))
}

/// GET /sessions/{id}/state-history
pub(super) async fn handle_state_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.assistant.state_series(&session_id) {
        Ok(series) => (StatusCode::OK, Json(serde_json::json!(series))),
        Err(e) => {
            let err = serde_json::json!({"error": e.to_string()});
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
        }
    }
}

/// GET /sessions/{id}/topic-score
pub(super) async fn handle_topic_score(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.assistant.session_state(&session_id).await {
        Some(s) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "topic_match_score": s.topic_match_score,
                "consecutive_off_topic": s.consecutive_off_topic,
                "patience": s.patience,
                "snark": s.snark,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("no such session: {session_id}")})),
        ),
    }
}

/// POST /evolve
pub(super) async fn handle_evolve(
    State(state): State<AppState>,
    body: Result<Json<EvolveBody>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => {
            let err = serde_json::json!({"error": format!("Invalid JSON: {e}")});
            return (StatusCode::BAD_REQUEST, Json(err));
        }
    };

    match state
        .pipeline
        .evolve(&body.target_id, &body.source, &body.instructions, None)
        .await
    {
        Ok(EvolveOutcome::Committed(version)) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "committed", "version": version})),
        ),
        Ok(EvolveOutcome::Failed(failure)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "status": "failed",
                "target_id": failure.target_id,
                "reason": failure.reason,
            })),
        ),
        Err(e) => {
            tracing::error!(target_id = %body.target_id, error = %e, "Evolve failed");
            let err = serde_json::json!({"error": e.to_string()});
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
        }
    }
}

/// POST /rollback
pub(super) async fn handle_rollback(
    State(state): State<AppState>,
    body: Result<Json<RollbackBody>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => {
            let err = serde_json::json!({"error": format!("Invalid JSON: {e}")});
            return (StatusCode::BAD_REQUEST, Json(err));
        }
    };

    match state.pipeline.rollback(&body.target_id, body.version).await {
        Ok(version) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "committed", "version": version})),
        ),
        Err(e @ EvolutionError::NoSuchVersion { .. }) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e) => {
            let err = serde_json::json!({"error": e.to_string()});
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
        }
    }
}

/// GET /evolution/{target_id}
pub(super) async fn handle_evolution_history(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> impl IntoResponse {
    match state.pipeline.history(&target_id) {
        Ok(versions) => (
            StatusCode::OK,
            Json(serde_json::json!({"versions": versions})),
        ),
        Err(e) => {
            let err = serde_json::json!({"error": e.to_string()});
            (StatusCode::INTERNAL_SERVER_ERROR, Json(err))
        }
    }
}
