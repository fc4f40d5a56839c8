//! API request and response types.

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Headers, InspectionRequest};
use crate::error::GatewayError;

// ==================== Proxy ====================

fn default_method() -> String {
    "GET".to_string()
}

/// Outbound request an agent wants made on its behalf.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProxyRequest {
    /// Absolute http(s) URL of the target.
    pub url: String,
    /// HTTP method. Defaults to GET.
    #[serde(default = "default_method")]
    pub method: String,
    /// Headers to send to the target.
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Body to send. Objects and arrays are sent as JSON, strings verbatim.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub body: Option<serde_json::Value>,
}

/// Form-encoded variant of [`ProxyRequest`]. `headers` is a JSON object string.
#[derive(Debug, Deserialize)]
pub struct ProxyForm {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl TryFrom<ProxyForm> for ProxyRequest {
    type Error = GatewayError;

    fn try_from(form: ProxyForm) -> Result<Self, Self::Error> {
        let headers = match form.headers.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| {
                GatewayError::BadRequest(format!("headers must be a JSON object: {}", e))
            })?),
        };

        Ok(Self {
            url: form.url,
            method: form.method,
            headers,
            body: form.body.map(serde_json::Value::String),
        })
    }
}

impl ProxyRequest {
    /// Validate and snapshot into the pipeline's request type.
    pub fn into_inspection_request(self) -> Result<InspectionRequest, GatewayError> {
        let url = Url::parse(&self.url)
            .map_err(|e| GatewayError::BadRequest(format!("invalid url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::BadRequest(format!(
                "unsupported url scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(GatewayError::BadRequest("url has no host".to_string()));
        }

        let method = Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| GatewayError::BadRequest(format!("invalid method: {}", self.method)))?;

        let mut headers: Headers = self.headers.unwrap_or_default().into_iter().collect();

        let body = match self.body {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::String(text)) => text.into_bytes(),
            Some(value) => {
                if !headers.contains("content-type") {
                    headers.insert("content-type", "application/json");
                }
                serde_json::to_vec(&value)?
            }
        };

        Ok(InspectionRequest::new(method, url, headers, body))
    }
}

/// Ingress payload: JSON or urlencoded form, chosen by `Content-Type`.
#[derive(Debug)]
pub struct ProxyPayload(pub ProxyRequest);

#[async_trait]
impl<S> FromRequest<S> for ProxyPayload
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form {
            let Form(form) = Form::<ProxyForm>::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            Ok(Self(ProxyRequest::try_from(form)?))
        } else {
            let Json(request) = Json::<ProxyRequest>::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            Ok(Self(request))
        }
    }
}

// ==================== Health ====================

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub classifier_enabled: bool,
    pub payment_enabled: bool,
    pub auth_enabled: bool,
    pub timestamp: String,
}
