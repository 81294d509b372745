//! Error taxonomy for the MCP core.
//!
//! Every failure crossing the HTTP boundary is one of these variants; the
//! `IntoResponse` impl maps them onto status codes so handlers can return
//! `Result<_, McpError>` and still produce the `{"error": ...}` JSON shape
//! the dashboard expects.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP server '{0}' is not registered")]
    NotFound(String),

    #[error("MCP server '{0}' is not running")]
    NotRunning(String),

    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("timed out after {0}s waiting for tool server response")]
    Timeout(u64),

    #[error("unsupported provider '{0}'")]
    UnsupportedProvider(String),

    #[error("tool server error: {0}")]
    Upstream(String),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl McpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotRunning(_) | Self::UnsupportedProvider(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Spawn { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_boundary_contract() {
        assert_eq!(
            McpError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            McpError::NotRunning("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            McpError::UnsupportedProvider("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(McpError::Timeout(10).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            McpError::Upstream("boom".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            McpError::Spawn {
                command: "node".into(),
                message: "no such file".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_name_the_offending_id() {
        let e = McpError::NotFound("linear".into());
        assert!(e.to_string().contains("linear"));
    }
}
