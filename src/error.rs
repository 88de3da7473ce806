//! Gateway error type and its HTTP rendering.
//!
//! Every failure that can reach a client is a [`GatewayError`]. Each variant
//! knows its HTTP status and a short machine-readable code; the JSON body is
//! `{"httpcode": <status>, "code": <code>, "message": <display>}`.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The registry could not produce an address for the service.
    #[error("service unavailable: {service} ({reason})")]
    ServiceUnavailable { service: String, reason: String },

    /// Dialing the backend failed.
    #[error("connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    /// The backend call returned an error status.
    #[error("call to {service} failed: {code:?}: {message}")]
    Call {
        service: String,
        code: tonic::Code,
        message: String,
    },

    #[error("call to {service} timed out after {after:?}")]
    Timeout { service: String, after: Duration },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("security mode not configured")]
    SecurityNotConfigured,

    /// The upload stream broke.
    #[error("upload failed: {0}")]
    Protocol(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The coordinator did not acknowledge a relayed heartbeat.
    #[error("heartbeat failed: {0}")]
    Heartbeat(String),
}

impl GatewayError {
    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn connection(addr: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    pub fn call(service: impl Into<String>, status: &tonic::Status) -> Self {
        Self::Call {
            service: service.into(),
            code: status.code(),
            message: status.message().to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Connection { .. } | Self::Call { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::SecurityNotConfigured | Self::Protocol(_) | Self::Heartbeat(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Connection { .. } => "connection_failed",
            Self::Call { .. } => "call_failed",
            Self::Timeout { .. } => "call_timeout",
            Self::Unauthorized(_) => "unauthorized",
            Self::SecurityNotConfigured => "security_not_configured",
            Self::Protocol(_) => "upload_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Forbidden(_) => "read_only",
            Self::Heartbeat(_) => "heartbeat_failed",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "httpcode": status.as_u16(),
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
