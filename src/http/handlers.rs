use super::state::AppState;
use crate::session::{SessionState, SessionStats, VoiceOverrides};
use crate::transcript::ChatTurn;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Optional voice override for this conversation
    pub voice_name: Option<String>,

    /// Optional persona override for this conversation
    pub system_instruction: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status_text: String,
    #[serde(flatten)]
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a voice conversation
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    info!("Session start requested");

    // Check state up front for a friendly 409; start() re-checks atomically
    if state.session.state() != SessionState::Idle {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "session already active, stop it first".to_string(),
            }),
        )
            .into_response();
    }

    let overrides = VoiceOverrides {
        voice_name: req.voice_name,
        system_instruction: req.system_instruction,
    };

    match state.session.start(overrides).await {
        Ok(()) => (
            StatusCode::OK,
            Json(StartSessionResponse {
                status: "connecting".to_string(),
                message: "Voice session starting".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start session: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to start session: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /session/stop
/// Stop the voice conversation (idempotent)
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.session.stop().await;
    info!("Session stopped via API");

    (
        StatusCode::OK,
        Json(StopSessionResponse {
            status: "stopped".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// GET /session/status
/// Get lifecycle state, speaking flag, and counters
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.session.stats().await;
    let status_text = stats.status_text().to_string();

    (StatusCode::OK, Json(StatusResponse { status_text, stats })).into_response()
}

/// GET /session/transcript
/// Get the conversation transcript accumulated so far
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<ChatTurn> = state.session.transcript().await;
    (StatusCode::OK, Json(transcript)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
