//! Upstream fetch - sends the sanitized request to its target.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::domain::{Headers, InspectionRequest, InspectionResponse};

/// Transport-level failure talking to the target. Never a security decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not connect to upstream: {0}")]
    Connect(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream response exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid upstream request: {0}")]
    InvalidTarget(String),
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
    }
}

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: &InspectionRequest) -> Result<InspectionResponse, UpstreamError>;
}

/// reqwest-backed upstream. Redirects are returned to the caller, not followed.
pub struct HttpUpstream {
    client: Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn outbound_headers(headers: &Headers) -> Result<HeaderMap, UpstreamError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers.iter() {
            // reqwest derives these from the URL and body.
            if is_hop_by_hop(name) || name == "host" || name == "content-length" {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| UpstreamError::InvalidTarget(format!("header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| UpstreamError::InvalidTarget(format!("header {}: {}", name, e)))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    fn map_error(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else if e.is_connect() {
            UpstreamError::Connect(e.to_string())
        } else if e.is_builder() {
            UpstreamError::InvalidTarget(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &InspectionRequest) -> Result<InspectionResponse, UpstreamError> {
        let headers = Self::outbound_headers(request.headers())?;

        let mut response = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(headers)
            .body(request.body().to_vec())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(UpstreamError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let status = response.status().as_u16();
        let response_headers: Headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(UpstreamError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            correlation_id = %request.correlation_id(),
            status,
            body_bytes = body.len(),
            "Upstream responded"
        );

        Ok(InspectionResponse::new(
            request.correlation_id(),
            status,
            response_headers,
            body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::HeaderMap as AxumHeaders,
        routing::{get, post},
        Router,
    };
    use reqwest::{Method, Url};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn upstream(timeout_ms: u64, max_body_bytes: usize) -> HttpUpstream {
        HttpUpstream::new(&UpstreamConfig {
            timeout_ms,
            max_body_bytes,
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    fn request(method: Method, url: &str, headers: Headers, body: &[u8]) -> InspectionRequest {
        InspectionRequest::new(method, Url::parse(url).unwrap(), headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_fetch_relays_method_headers_and_body() {
        let router = Router::new().route(
            "/echo",
            post(|headers: AxumHeaders, body: String| async move {
                let tag = headers
                    .get("x-agent-tag")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string();
                (
                    [("content-type", "text/plain"), ("connection", "close")],
                    format!("{}:{}", tag, body),
                )
            }),
        );
        let base = serve(router).await;

        let headers: Headers = [("X-Agent-Tag", "t1"), ("Connection", "keep-alive")]
            .into_iter()
            .collect();
        let req = request(Method::POST, &format!("{}/echo", base), headers, b"hello");
        let response = upstream(5_000, 1024).fetch(&req).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), b"t1:hello");
        assert_eq!(response.correlation_id(), req.correlation_id());
        assert_eq!(response.headers().content_type().as_deref(), Some("text/plain"));
        assert!(!response.headers().contains("connection"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_a_response_not_an_error() {
        let router = Router::new().route(
            "/missing",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        );
        let base = serve(router).await;

        let req = request(Method::GET, &format!("{}/missing", base), Headers::new(), b"");
        let response = upstream(5_000, 1024).fetch(&req).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let router = Router::new().route("/big", get(|| async { "x".repeat(4096) }));
        let base = serve(router).await;

        let req = request(Method::GET, &format!("{}/big", base), Headers::new(), b"");
        let result = upstream(5_000, 1024).fetch(&req).await;
        assert_eq!(result.unwrap_err(), UpstreamError::BodyTooLarge { limit: 1024 });
    }

    #[tokio::test]
    async fn test_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = serve(router).await;

        let req = request(Method::GET, &format!("{}/slow", base), Headers::new(), b"");
        let result = upstream(100, 1024).fetch(&req).await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let req = request(Method::GET, &format!("http://{}/", addr), Headers::new(), b"");
        let result = upstream(2_000, 1024).fetch(&req).await;
        assert!(matches!(result, Err(UpstreamError::Connect(_))));
    }

    #[test]
    fn test_invalid_header_value() {
        let headers: Headers = [("x-bad", "line\nbreak")].into_iter().collect();
        assert!(matches!(
            HttpUpstream::outbound_headers(&headers),
            Err(UpstreamError::InvalidTarget(_))
        ));
    }
}
