//! Authentication middleware for axum.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::auth::ApiKeyValidator;
use crate::error::GatewayError;

/// Extract and validate API key from request.
///
/// Looks for `X-API-Key` header or `Authorization: Bearer <key>` header.
/// On success the [`crate::auth::ApiKeyInfo`] is added to the request
/// extensions.
pub async fn require_api_key(
    State(validator): State<ApiKeyValidator>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let api_key = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| {
            request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(String::from)
        });

    let api_key =
        api_key.ok_or_else(|| GatewayError::Unauthorized("missing API key".to_string()))?;

    let key_info = validator.validate(&api_key).ok_or_else(|| {
        let prefix: String = api_key.chars().take(4).collect();
        tracing::warn!(key_prefix = %prefix, "Invalid API key attempted");
        GatewayError::Unauthorized("invalid API key".to_string())
    })?;

    tracing::debug!(
        key_id = %key_info.key_id,
        key_name = %key_info.name,
        client_id = %key_info.client_id,
        "API key accepted"
    );
    request.extensions_mut().insert(key_info);

    Ok(next.run(request).await)
}
