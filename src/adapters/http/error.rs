//! Endpoint-boundary error conversion.
//!
//! Every gateway error is caught here and turned into a JSON error body;
//! nothing propagates as an unhandled crash. Nothing is retried either:
//! the caller corrects 400s, everything else is surfaced as-is.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use crate::ports::{GatewayError, RunStatus};

/// API error with a fixed HTTP mapping.
#[derive(Debug)]
pub enum ApiError {
    /// Empty or malformed client input (400).
    BadRequest(String),
    /// Missing credential or assistant id (500).
    Configuration(String),
    /// Non-2xx from the conversation store (502).
    Upstream { status: u16, detail: String },
    /// Malformed upstream payload, raw payload attached for diagnosis (500).
    UpstreamPayload {
        message: String,
        details: serde_json::Value,
    },
    /// Run ended failed/cancelled/expired (500, status named in the body).
    RunFailure(RunStatus),
    /// Run outlived the poll deadline (504).
    Timeout { deadline_secs: u64 },
    /// Transport failure talking upstream (502).
    Network(String),
    /// Anything else (500).
    Internal(String),
}

/// JSON error body: `{ "error": ..., "details"?: ... }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    fn with_details(error: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            error: error.into(),
            details: Some(details),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(msg) => ApiError::BadRequest(msg),
            GatewayError::Configuration(msg) => ApiError::Configuration(msg),
            GatewayError::Upstream { status, detail } => ApiError::Upstream { status, detail },
            GatewayError::MalformedId {
                kind,
                value,
                payload,
            } => ApiError::UpstreamPayload {
                message: format!("Unexpected {kind} id returned: {value}"),
                // Embed the payload as JSON when it is JSON, verbatim otherwise.
                details: serde_json::from_str(&payload)
                    .unwrap_or(serde_json::Value::String(payload)),
            },
            GatewayError::RunFailed { status } => ApiError::RunFailure(status),
            GatewayError::Timeout { deadline_secs } => ApiError::Timeout { deadline_secs },
            GatewayError::Network(msg) => ApiError::Network(msg),
            GatewayError::Parse(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg)),
            ApiError::Configuration(msg) => {
                tracing::error!("configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new(format!("Missing configuration: {msg}")),
                )
            }
            ApiError::Upstream { status, detail } => {
                tracing::error!(upstream_status = status, "upstream error: {detail}");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody::new(format!("Upstream returned {status}")),
                )
            }
            ApiError::UpstreamPayload { message, details } => {
                tracing::error!("upstream payload error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::with_details(message, details),
                )
            }
            ApiError::RunFailure(run_status) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(format!("Run {run_status}")),
            ),
            ApiError::Timeout { deadline_secs } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorBody::new(format!("Run did not complete within {deadline_secs}s")),
            ),
            ApiError::Network(msg) => {
                tracing::error!("network error: {msg}");
                (StatusCode::BAD_GATEWAY, ErrorBody::new("Upstream unreachable"))
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("An internal error occurred"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
