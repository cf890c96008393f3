//! Dialog Switch Server
//!
//! Provides the HTTP endpoints for response generation and language
//! understanding, and keeps the per-group resources fresh in the background.

pub mod http;
pub mod metrics;
pub mod refresh;
pub mod state;

pub use http::create_router;
pub use crate::metrics::{init_metrics, record_default_group, record_refresh, record_request};
pub use refresh::start_refresh_tasks;
pub use state::{AppState, Role, RoleRefresh};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<dialog_switch_core::Error> for ServerError {
    fn from(err: dialog_switch_core::Error) -> Self {
        use dialog_switch_core::Error;
        match err {
            Error::Configuration(message) => ServerError::Configuration(message),
            Error::MalformedRequest(message) => ServerError::InvalidRequest(message),
            Error::NotFound(message) => ServerError::NotFound(message),
            err @ Error::SourceUnreadable { .. } => ServerError::Internal(err.to_string()),
        }
    }
}

impl From<dialog_switch_config::ConfigError> for ServerError {
    fn from(err: dialog_switch_config::ConfigError) -> Self {
        ServerError::Configuration(err.to_string())
    }
}
