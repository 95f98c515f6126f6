//! Server error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use webtty_core::{BackendError, PumpError, SessionError};

/// Errors that can occur in the webtty server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Unknown exec id or session
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Operation disabled by configuration
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Pump(#[from] PumpError),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::SessionNotFound(_) | ServerError::Backend(BackendError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ServerError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Session(SessionError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Backend(BackendError::Unsupported { .. }) => StatusCode::NOT_IMPLEMENTED,
            ServerError::Backend(BackendError::Remote(_)) => StatusCode::BAD_GATEWAY,
            ServerError::Pump(PumpError::Auth) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
