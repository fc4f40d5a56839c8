//! HTTP request handlers.

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue},
    response::Response,
    Extension, Json,
};
use tokio_util::sync::CancellationToken;

use crate::api::types::*;
use crate::auth::ApiKeyInfo;
use crate::domain::{CorrelationId, InspectionResponse};
use crate::engine::GatewayOutcome;
use crate::error::{GatewayError, GatewayResult};
use crate::AppState;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const UPSTREAM_STATUS_HEADER: &str = "x-upstream-status";

/// Proxy a request through the inspection pipeline.
///
/// POST /v1/proxy
#[utoipa::path(
    post,
    path = "/v1/proxy",
    request_body(
        content = ProxyRequest,
        content_type = "application/json",
        description = "Target request. An urlencoded form with the same fields is also accepted."
    ),
    responses(
        (status = 200, description = "Upstream body, inspected and passed verbatim"),
        (status = 400, description = "Invalid proxy payload", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 402, description = "Payment denied", body = crate::error::ErrorResponse),
        (status = 403, description = "Blocked by inspection", body = crate::error::BlockedResponse),
        (status = 502, description = "Upstream failure", body = crate::error::ErrorResponse),
        (status = 504, description = "Upstream timeout", body = crate::error::ErrorResponse)
    ),
    security(("api_key" = [])),
    tag = "proxy"
)]
pub async fn proxy(
    State(state): State<AppState>,
    client: Option<Extension<ApiKeyInfo>>,
    ProxyPayload(request): ProxyPayload,
) -> GatewayResult<Response> {
    let request = request.into_inspection_request()?;
    let correlation_id = request.correlation_id();
    let client_id = client.map(|Extension(info)| info.client_id);

    tracing::info!(
        correlation_id = %correlation_id,
        client_id = ?client_id,
        method = %request.method(),
        host = request.url().host_str().unwrap_or_default(),
        "Proxy request accepted"
    );

    // The exchange runs as its own task; if this handler is dropped because
    // the caller went away, the guard cancels it and it still finalizes.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let gateway = state.gateway.clone();
    let exchange = tokio::spawn(async move { gateway.handle(request, client_id, cancel).await })
        .await
        .map_err(|e| GatewayError::Internal(format!("exchange task failed: {}", e)))?;

    match exchange.outcome {
        GatewayOutcome::Completed(response) => Ok(completed(correlation_id, &response)),
        GatewayOutcome::BlockedAtRequest(verdict) | GatewayOutcome::BlockedAtResponse(verdict) => {
            Err(GatewayError::PolicyBlocked {
                stage: verdict.stage(),
                reason: verdict.reason().to_string(),
                correlation_id,
            })
        }
        GatewayOutcome::PaymentDenied { reference } => Err(GatewayError::PaymentDenied {
            reference,
            correlation_id,
        }),
        GatewayOutcome::UpstreamFailed(source) => Err(GatewayError::Upstream {
            source,
            correlation_id,
        }),
        GatewayOutcome::Cancelled => Err(GatewayError::Internal("exchange cancelled".to_string())),
    }
}

/// 200 with the upstream body verbatim, its content type, and tracing headers.
fn completed(correlation_id: CorrelationId, upstream: &InspectionResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body().to_vec()));
    let headers = response.headers_mut();

    if let Some(value) = upstream
        .headers()
        .get("content-type")
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        headers.insert(CORRELATION_HEADER, value);
    }
    headers.insert(UPSTREAM_STATUS_HEADER, HeaderValue::from(upstream.status()));

    response
}

/// Health check endpoint.
///
/// GET /v1/health
#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        classifier_enabled: state.classifier_enabled,
        payment_enabled: state.payment_enabled,
        auth_enabled: state.auth_enabled,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
