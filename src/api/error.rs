//! HTTP error mapping

use crate::error::BusError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error from the simulated bus
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Request body or path could not be decoded
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Bus(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Bus(BusError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Bus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::warn!("request rejected: {}", self);
        }

        let body = match &self {
            ApiError::Bus(BusError::Connection(_)) => json!({
                "success": false,
                "message": self.to_string(),
                "isOpen": false,
            }),
            _ => json!({
                "success": false,
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state_machine::ConnectionStatus;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(BusError::NotConnected).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(BusError::UnsupportedFunction(99)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(BusError::Connection("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(BusError::InvalidTransition {
                from: ConnectionStatus::Connecting,
                to: ConnectionStatus::Connecting,
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::BadRequest("port is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
