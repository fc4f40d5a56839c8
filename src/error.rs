//! Error types for Barrier Gateway.
//!
//! Defines the HTTP-facing error type. Every terminal outcome other than
//! COMPLETED ends up here and maps to a distinct status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::{CorrelationId, Stage};
use crate::engine::UpstreamError;

/// Unified error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Content-level block. `reason` names labels, never matched content.
    #[error("Blocked at {stage}: {reason}")]
    PolicyBlocked {
        stage: Stage,
        reason: String,
        correlation_id: CorrelationId,
    },

    #[error("Payment denied")]
    PaymentDenied {
        reference: Option<String>,
        correlation_id: CorrelationId,
    },

    #[error("Upstream error: {source}")]
    Upstream {
        #[source]
        source: UpstreamError,
        correlation_id: CorrelationId,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rejection body for a blocked exchange.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlockedResponse {
    pub blocked: bool,
    pub stage: Stage,
    pub reason: String,
    pub correlation_id: CorrelationId,
}

/// Error response body for API clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message, details, correlation_id) = match self {
            GatewayError::PolicyBlocked {
                stage,
                reason,
                correlation_id,
            } => {
                let body = BlockedResponse {
                    blocked: true,
                    stage,
                    reason,
                    correlation_id,
                };
                return (StatusCode::FORBIDDEN, Json(body)).into_response();
            }
            GatewayError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None, None)
            }
            GatewayError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None, None)
            }
            GatewayError::PaymentDenied {
                reference,
                correlation_id,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "PAYMENT_DENIED",
                "Payment was not authorized".to_string(),
                reference,
                Some(correlation_id),
            ),
            GatewayError::Upstream {
                source,
                correlation_id,
            } => {
                let (status, code) = if source.is_timeout() {
                    (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT")
                } else {
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
                };
                (
                    status,
                    code,
                    "Upstream request failed".to_string(),
                    Some(source.to_string()),
                    Some(correlation_id),
                )
            }
            GatewayError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Configuration error".to_string(),
                Some(msg),
                None,
            ),
            GatewayError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                "SERIALIZATION_ERROR",
                "Failed to process request/response".to_string(),
                Some(e.to_string()),
                None,
            ),
            GatewayError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
            correlation_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let id = CorrelationId::new();
        let cases = [
            (
                GatewayError::PolicyBlocked {
                    stage: Stage::Request,
                    reason: "PII detected: CREDIT_CARD".to_string(),
                    correlation_id: id,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                GatewayError::PaymentDenied {
                    reference: None,
                    correlation_id: id,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                GatewayError::Upstream {
                    source: UpstreamError::Timeout(Duration::from_secs(30)),
                    correlation_id: id,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GatewayError::Upstream {
                    source: UpstreamError::Connect("refused".to_string()),
                    correlation_id: id,
                },
                StatusCode::BAD_GATEWAY,
            ),
            (GatewayError::BadRequest("no url".to_string()), StatusCode::BAD_REQUEST),
            (GatewayError::Unauthorized("no key".to_string()), StatusCode::UNAUTHORIZED),
            (
                GatewayError::Config("upstream client: bad user agent".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
