//! HTTP request handlers

use super::types::{
    AdvanceResponse, ErrorResponse, MessageRequest, ResumeResponse, SessionListResponse,
    SessionView, SuccessResponse,
};
use super::AppState;
use crate::db::SessionSummary;
use crate::report::render_report;
use crate::runtime::ExecutorError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session listing and creation
        .route("/api/sessions", get(list_sessions).post(create_session))
        // Snapshot and discard
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        // Conversation turns
        .route("/api/sessions/:id/messages", post(send_message))
        .route("/api/sessions/:id/resume", post(resume_session))
        // Downloadable report
        .route("/api/sessions/:id/report", get(get_report))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionListResponse>, AppError> {
    let records = state
        .db()
        .list_sessions()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(SessionListResponse {
        sessions: records.iter().map(SessionSummary::from).collect(),
    }))
}

async fn create_session(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let (session_id, snapshot) = state.sessions.create_session().await?;
    Ok((StatusCode::CREATED, Json(SessionView::new(session_id, snapshot))))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let snapshot = state.sessions.get_state(&id).await?;
    Ok(Json(SessionView::new(id, snapshot)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if state.sessions.discard(&id).await? {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(AppError::NotFound(format!("Session not found: {id}")))
    }
}

// ============================================================
// Turns
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let outcome = state.sessions.advance(&id, &req.text).await?;
    Ok(Json(outcome.into()))
}

async fn resume_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResumeResponse>, AppError> {
    let outcome = state.sessions.resume(&id).await?;
    Ok(Json(outcome.into()))
}

// ============================================================
// Report
// ============================================================

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let snapshot = state.sessions.get_state(&id).await?;
    let Some(prediction) = &snapshot.prediction else {
        return Err(AppError::Conflict(
            "No assessment has been completed for this session".to_string(),
        ));
    };

    let report = render_report(&snapshot.metrics, prediction, snapshot.advice.as_deref());
    let disposition = format!("attachment; filename=\"diabetes-report-{id}.txt\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report,
    )
        .into_response())
}

async fn get_version() -> &'static str {
    concat!("triage-graph ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl From<ExecutorError> for AppError {
    fn from(e: ExecutorError) -> Self {
        let message = e.to_string();
        match e {
            ExecutorError::EmptyInput => AppError::BadRequest(message),
            ExecutorError::SessionNotFound(_) => AppError::NotFound(message),
            ExecutorError::InvalidResume(_) => AppError::Conflict(message),
            ExecutorError::PredictionFailed(_) => AppError::BadGateway(message),
            ExecutorError::Storage(_) => {
                tracing::error!(error = %message, "Storage failure");
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
