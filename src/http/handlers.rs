use super::state::AppState;
use crate::error::SessionError;
use crate::presentation::VoiceRecognition;
use crate::session::{SessionSnapshot, SessionStats};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    pub locale: Option<String>,

    pub continuous: Option<bool>,

    /// Silence timeout in milliseconds (continuous sessions)
    pub max_silence_ms: Option<u64>,

    pub enable_partial_results: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: String,
    pub snapshot: SessionSnapshot,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub transcript: String,
    pub results: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn not_found(session_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Session {} not found", session_id),
    )
}

fn session_error(e: SessionError) -> Response {
    let status = match e {
        SessionError::PermissionDenied => StatusCode::FORBIDDEN,
        SessionError::RecognizerStart(_)
        | SessionError::RecognizerStop(_)
        | SessionError::RecognizerCancel(_)
        | SessionError::Recognizer(_) => StatusCode::BAD_GATEWAY,
        SessionError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        SessionError::TornDown => StatusCode::GONE,
    };
    error_response(status, e.to_string())
}

fn snapshot_response(session: &VoiceRecognition) -> Response {
    (StatusCode::OK, Json(session.snapshot())).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /sessions/start
/// Create a new session and start listening
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<StartSessionRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Creating session: {}", session_id);

    let mut config = state.defaults.clone();
    config.session_id = session_id.clone();
    config.auto_start = false;
    if let Some(locale) = req.locale {
        config.locale = locale;
    }
    if let Some(continuous) = req.continuous {
        config.continuous = continuous;
    }
    if let Some(ms) = req.max_silence_ms {
        config.max_silence_duration = Duration::from_millis(ms);
    }
    if let Some(enabled) = req.enable_partial_results {
        config.enable_partial_results = enabled;
    }

    // Check if the id is taken
    if state.sessions.read().await.contains_key(&session_id) {
        return error_response(
            StatusCode::CONFLICT,
            format!("Session {} already exists", session_id),
        );
    }

    let recognizer = match state.recognizers.create(&session_id).await {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to create recognizer: {:#}", e);
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to create recognizer: {:#}", e),
            );
        }
    };

    let session = match VoiceRecognition::new(config, recognizer, Arc::clone(&state.permissions)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create session: {}", e);
            return session_error(e);
        }
    };

    // Reserve the id before starting so concurrent creates conflict
    {
        let mut sessions = state.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return error_response(
                StatusCode::CONFLICT,
                format!("Session {} already exists", session_id),
            );
        }
        sessions.insert(session_id.clone(), Arc::clone(&session));
    }

    if let Err(e) = session.start().await {
        error!("Failed to start session {}: {}", session_id, e);
        state.sessions.write().await.remove(&session_id);
        session.shutdown();
        return session_error(e);
    }

    info!("Session started successfully: {}", session_id);

    (StatusCode::CREATED, Json(session.snapshot())).into_response()
}

/// POST /sessions/:session_id/start
pub async fn start_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.get(&session_id).await else {
        return not_found(&session_id);
    };

    match session.start().await {
        Ok(()) => snapshot_response(&session),
        Err(e) => {
            warn!("Start failed for {}: {}", session_id, e);
            session_error(e)
        }
    }
}

/// POST /sessions/:session_id/stop
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.get(&session_id).await else {
        return not_found(&session_id);
    };

    info!("Stopping session: {}", session_id);
    match session.stop().await {
        Ok(()) => snapshot_response(&session),
        Err(e) => {
            warn!("Stop failed for {}: {}", session_id, e);
            session_error(e)
        }
    }
}

/// POST /sessions/:session_id/cancel
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.get(&session_id).await else {
        return not_found(&session_id);
    };

    info!("Cancelling session: {}", session_id);
    match session.cancel().await {
        Ok(()) => snapshot_response(&session),
        Err(e) => {
            warn!("Cancel failed for {}: {}", session_id, e);
            session_error(e)
        }
    }
}

/// POST /sessions/:session_id/reset
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.get(&session_id).await else {
        return not_found(&session_id);
    };

    session.reset();
    snapshot_response(&session)
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.get(&session_id).await else {
        return not_found(&session_id);
    };

    let snapshot = session.snapshot();
    (
        StatusCode::OK,
        Json(SessionStatusResponse {
            session_id,
            status: snapshot.state.description().to_string(),
            snapshot,
            stats: session.stats(),
        }),
    )
        .into_response()
}

/// GET /sessions/:session_id/transcript
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.get(&session_id).await else {
        return not_found(&session_id);
    };

    let snapshot = session.snapshot();
    (
        StatusCode::OK,
        Json(TranscriptResponse {
            session_id,
            transcript: snapshot.transcript,
            results: snapshot.results,
        }),
    )
        .into_response()
}

/// DELETE /sessions/:session_id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session = state.sessions.write().await.remove(&session_id);

    match session {
        Some(session) => {
            info!("Removing session: {}", session_id);
            session.shutdown();
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(&session_id),
    }
}
