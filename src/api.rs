//! HTTP surface over the session lifecycle.
//!
//! Routes:
//! - `POST /sessions` starts a session (201).
//! - `POST /sessions/{id}/approve` resumes a paused session.
//! - `POST /sessions/{id}/input` records human input.
//! - `GET /sessions/{id}` reports status, log and result.
//! - `GET /health` is a liveness probe.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::session::StatusReport;
use crate::models::state::SessionMode;
use crate::orchestrator::lifecycle::{SessionService, StartRequest};
use crate::{AppError, Result};

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionBody {
    /// What the agent should accomplish.
    pub goal: String,
    /// Repository to work in.
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Base branch; `main` when absent.
    #[serde(default)]
    pub base_branch: Option<String>,
    /// `auto` or `review`.
    #[serde(default)]
    pub mode: SessionMode,
}

/// Response of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    /// Identifier of the new session.
    pub session_id: String,
}

/// Body of `POST /sessions/{id}/input`.
#[derive(Debug, Clone, Deserialize)]
pub struct InputBody {
    /// Text to inject.
    pub message: String,
}

/// Acknowledgement returned by the approve and input routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    /// `resumed` or `input_added`.
    pub status: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(err = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn create_session(
    State(service): State<Arc<SessionService>>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<CreateSessionResponse>)> {
    let session_id = service
        .start_session(StartRequest {
            goal: body.goal,
            repo_url: body.repo_url,
            base_branch: body.base_branch,
            mode: body.mode,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

async fn approve_session(
    State(service): State<Arc<SessionService>>,
    Path(session_id): Path<String>,
) -> Result<Json<Ack>> {
    service.resume_session(&session_id).await?;
    Ok(Json(Ack {
        status: "resumed".into(),
    }))
}

async fn add_input(
    State(service): State<Arc<SessionService>>,
    Path(session_id): Path<String>,
    Json(body): Json<InputBody>,
) -> Result<Json<Ack>> {
    service.add_session_input(&session_id, &body.message).await?;
    Ok(Json(Ack {
        status: "input_added".into(),
    }))
}

async fn session_status(
    State(service): State<Arc<SessionService>>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusReport>> {
    Ok(Json(service.get_status(&session_id).await?))
}

/// Build the API router over `service`.
#[must_use]
pub fn router(service: Arc<SessionService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(session_status))
        .route("/sessions/{id}/approve", post(approve_session))
        .route("/sessions/{id}/input", post(add_input))
        .with_state(service)
}

/// Serve the API on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails.
pub async fn serve(
    listener: TcpListener,
    service: Arc<SessionService>,
    ct: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "starting HTTP API");
    }

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP API shut down");
    Ok(())
}
