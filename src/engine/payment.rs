//! Payment Gate adapters.
//!
//! The gateway asks the gate once per request, after sanitization and before
//! forwarding. Settlement and reconciliation belong to the gate; this side
//! only needs a yes/no and a reference for the audit trail.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PaymentConfig;
use crate::domain::{CorrelationId, RequestDescriptor};

/// Why the gate could not give an answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment gate unavailable: {0}")]
    Unavailable(String),

    #[error("payment gate timed out after {0:?}")]
    Timeout(Duration),

    #[error("payment gate rejected the request: {0}")]
    Rejected(String),
}

/// The gate's answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentAuthorization {
    pub authorized: bool,
    #[serde(default)]
    pub reference: Option<String>,
}

#[async_trait]
pub trait PaymentGate: Send + Sync {
    async fn authorize(
        &self,
        correlation_id: CorrelationId,
        descriptor: &RequestDescriptor,
    ) -> Result<PaymentAuthorization, PaymentError>;
}

/// Gate used when metering is switched off. Authorizes everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPaymentGate;

impl DisabledPaymentGate {
    pub const REFERENCE: &'static str = "unmetered";
}

#[async_trait]
impl PaymentGate for DisabledPaymentGate {
    async fn authorize(
        &self,
        _correlation_id: CorrelationId,
        _descriptor: &RequestDescriptor,
    ) -> Result<PaymentAuthorization, PaymentError> {
        Ok(PaymentAuthorization {
            authorized: true,
            reference: Some(Self::REFERENCE.to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
struct AuthorizeRequest<'a> {
    correlation_id: CorrelationId,
    request: &'a RequestDescriptor,
    price: &'a str,
    pay_to: &'a str,
    network: &'a str,
}

/// Facilitator-backed gate.
///
/// POSTs the descriptor and the configured price terms, expects
/// `{"authorized": bool, "reference": string?}` back.
pub struct HttpPaymentGate {
    config: PaymentConfig,
    client: Client,
}

impl HttpPaymentGate {
    pub fn new(config: PaymentConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl PaymentGate for HttpPaymentGate {
    async fn authorize(
        &self,
        correlation_id: CorrelationId,
        descriptor: &RequestDescriptor,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let body = AuthorizeRequest {
            correlation_id,
            request: descriptor,
            price: &self.config.price,
            pay_to: &self.config.pay_to,
            network: &self.config.network,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::Timeout(self.config.timeout())
                } else {
                    PaymentError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::Unavailable(format!("facilitator returned {}", status)));
        }
        if !status.is_success() {
            return Err(PaymentError::Rejected(format!("facilitator returned {}", status)));
        }

        response
            .json::<PaymentAuthorization>()
            .await
            .map_err(|e| PaymentError::Unavailable(format!("invalid facilitator response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor {
            method: "GET".to_string(),
            host: "api.example.com".to_string(),
            path: "/weather".to_string(),
            body_bytes: 0,
        }
    }

    async fn facilitator(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/authorize", addr)
    }

    fn gate(endpoint: String) -> HttpPaymentGate {
        HttpPaymentGate::new(PaymentConfig {
            enabled: true,
            endpoint,
            pay_to: "0xabc".to_string(),
            ..PaymentConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_gate_authorizes() {
        let result = DisabledPaymentGate
            .authorize(CorrelationId::new(), &descriptor())
            .await
            .unwrap();
        assert!(result.authorized);
        assert_eq!(result.reference.as_deref(), Some("unmetered"));
    }

    #[tokio::test]
    async fn test_http_gate_forwards_terms() {
        let router = Router::new().route(
            "/authorize",
            post(|Json(body): Json<serde_json::Value>| async move {
                let ok = body["price"] == "$0.001"
                    && body["network"] == "base-sepolia"
                    && body["request"]["host"] == "api.example.com";
                Json(serde_json::json!({"authorized": ok, "reference": "pay-1"}))
            }),
        );
        let endpoint = facilitator(router).await;

        let result = gate(endpoint)
            .authorize(CorrelationId::new(), &descriptor())
            .await
            .unwrap();
        assert!(result.authorized);
        assert_eq!(result.reference.as_deref(), Some("pay-1"));
    }

    #[tokio::test]
    async fn test_http_gate_rejection_status() {
        let router = Router::new().route(
            "/authorize",
            post(|| async { (axum::http::StatusCode::PAYMENT_REQUIRED, "pay first") }),
        );
        let endpoint = facilitator(router).await;

        let result = gate(endpoint).authorize(CorrelationId::new(), &descriptor()).await;
        assert!(matches!(result, Err(PaymentError::Rejected(_))));
    }
}
