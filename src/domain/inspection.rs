//! Request/response snapshots that flow through the inspection pipeline.
//!
//! Snapshots are immutable once built. Sanitization never edits a request in
//! place; it derives a new one that keeps the same correlation id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Token tying every stage of one proxied exchange together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Header mapping with case-insensitive keys.
///
/// Keys are stored lowercased; iteration order is by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Media type without parameters, lowercased (`text/html; charset=utf-8` -> `text/html`).
    pub fn content_type(&self) -> Option<String> {
        self.get("content-type").map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Outbound request as received at ingress.
#[derive(Debug, Clone)]
pub struct InspectionRequest {
    correlation_id: CorrelationId,
    method: Method,
    url: Url,
    headers: Headers,
    body: Vec<u8>,
    received_at: DateTime<Utc>,
}

impl InspectionRequest {
    /// Snapshot a new request, generating its correlation id.
    pub fn new(method: Method, url: Url, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            method,
            url,
            headers,
            body,
            received_at: Utc::now(),
        }
    }

    /// Build the variant that is actually sent onward.
    ///
    /// Method, correlation id and ingress time are inherited.
    pub fn derive(&self, url: Url, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            correlation_id: self.correlation_id,
            method: self.method.clone(),
            url,
            headers,
            body,
            received_at: self.received_at,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Descriptor handed to the payment gate. Carries no body or header values.
    pub fn descriptor(&self) -> RequestDescriptor {
        RequestDescriptor {
            method: self.method.to_string(),
            host: self.url.host_str().unwrap_or_default().to_string(),
            path: self.url.path().to_string(),
            body_bytes: self.body.len(),
        }
    }
}

/// Minimal, content-free description of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub host: String,
    pub path: String,
    pub body_bytes: usize,
}

/// Upstream reply, tied to the originating request's correlation id.
#[derive(Debug, Clone)]
pub struct InspectionResponse {
    correlation_id: CorrelationId,
    status: u16,
    headers: Headers,
    body: Vec<u8>,
    received_at: DateTime<Utc>,
}

impl InspectionResponse {
    pub fn new(correlation_id: CorrelationId, status: u16, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            correlation_id,
            status,
            headers,
            body,
            received_at: Utc::now(),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Whether the body is something an agent would read as text.
    ///
    /// A missing content type counts as text so that untyped payloads are
    /// still classified.
    pub fn is_textual(&self) -> bool {
        match self.headers.content_type() {
            None => true,
            Some(ct) => is_textual_media_type(&ct),
        }
    }
}

/// Text, HTML, JSON, XML and their `+json`/`+xml` structured suffixes.
pub fn is_textual_media_type(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || media_type == "application/json"
        || media_type == "application/xml"
        || media_type == "application/javascript"
        || media_type == "application/x-www-form-urlencoded"
        || media_type.ends_with("+json")
        || media_type.ends_with("+xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json");

        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert!(headers.contains("Content-type"));

        headers.insert("content-type", "text/plain");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let headers: Headers = [("Content-Type", "Text/HTML; charset=utf-8")]
            .into_iter()
            .collect();
        assert_eq!(headers.content_type().as_deref(), Some("text/html"));
    }

    #[test]
    fn test_derive_keeps_correlation_id() {
        let url = Url::parse("https://api.example.com/v1?q=1").unwrap();
        let original = InspectionRequest::new(Method::POST, url.clone(), Headers::new(), b"a".to_vec());
        let derived = original.derive(url, Headers::new(), b"b".to_vec());

        assert_eq!(original.correlation_id(), derived.correlation_id());
        assert_eq!(original.body(), b"a");
        assert_eq!(derived.body(), b"b");
        assert_eq!(derived.method(), &Method::POST);
    }

    #[test]
    fn test_descriptor_has_no_content() {
        let url = Url::parse("https://api.example.com/pay?card=4111").unwrap();
        let request = InspectionRequest::new(Method::GET, url, Headers::new(), b"secret".to_vec());
        let descriptor = request.descriptor();

        assert_eq!(descriptor.host, "api.example.com");
        assert_eq!(descriptor.path, "/pay");
        assert_eq!(descriptor.body_bytes, 6);
    }

    #[test]
    fn test_textual_media_types() {
        assert!(is_textual_media_type("text/html"));
        assert!(is_textual_media_type("application/json"));
        assert!(is_textual_media_type("application/ld+json"));
        assert!(!is_textual_media_type("image/png"));
        assert!(!is_textual_media_type("application/octet-stream"));
    }

    #[test]
    fn test_response_without_content_type_is_textual() {
        let response = InspectionResponse::new(CorrelationId::new(), 200, Headers::new(), Vec::new());
        assert!(response.is_textual());

        let png: Headers = [("content-type", "image/png")].into_iter().collect();
        let response = InspectionResponse::new(CorrelationId::new(), 200, png, Vec::new());
        assert!(!response.is_textual());
    }
}
