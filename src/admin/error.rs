//! Admin server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use super::routes::ActionResponse;
use crate::core::error::WatchdogError;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Resource statistics unavailable: {reason}")]
    Stats { reason: String },

    #[error("Supervisor unavailable: {0}")]
    Supervisor(#[from] WatchdogError),

    #[error("Invalid bind address '{addr}'")]
    InvalidAddress { addr: String },

    #[error("Server bind failed: {reason}")]
    BindFailed { reason: String },

    #[error("Internal server error: {reason}")]
    Internal { reason: String },
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        tracing::warn!("Admin request failed: {}", self);
        let body = ActionResponse::failure(self.to_string());
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
