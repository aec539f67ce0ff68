//! Admin endpoint handlers
//!
//! Every failure is reported as 500 with `{success: false, message}`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::AdminError;
use super::host::HostStats;
use super::server::AdminState;
use crate::supervisor::SupervisorStatus;

/// Body returned by the action endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ActionResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            note: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Route: GET /api/stats
pub async fn stats(State(state): State<AdminState>) -> Result<Json<HostStats>, AdminError> {
    Ok(Json(state.host.stats().await?))
}

/// Route: GET /api/status
pub async fn status(State(state): State<AdminState>) -> Json<SupervisorStatus> {
    Json(state.supervisor.status())
}

/// Route: POST /api/restart-ide
pub async fn restart_ide(
    State(state): State<AdminState>,
) -> Result<Json<ActionResponse>, AdminError> {
    tracing::info!("Backend restart requested");
    let signalled = state.host.restart_backend().await?;
    tracing::info!(processes = signalled, "Sent terminate signal to backend");

    Ok(Json(
        ActionResponse::success("IDE restart signal sent")
            .with_note("The IDE should restart automatically"),
    ))
}

/// Route: POST /api/agent-mode
pub async fn agent_mode(
    State(state): State<AdminState>,
) -> Result<Json<ActionResponse>, AdminError> {
    tracing::info!("Agent mode requested");
    state.host.send_gesture().await?;
    Ok(Json(ActionResponse::success("Agent Mode signal sent (Ctrl+E)")))
}

/// Route: POST /api/restart-proxy
///
/// Only queues the request; the supervisor task performs the restart.
pub async fn restart_proxy(
    State(state): State<AdminState>,
) -> Result<(StatusCode, Json<ActionResponse>), AdminError> {
    state.supervisor.request_restart("admin API")?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ActionResponse::success("Proxy restart queued")),
    ))
}
