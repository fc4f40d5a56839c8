//! Barrier Gateway - inspecting HTTP proxy for autonomous agents
//!
//! Outbound requests are scanned for data leakage before they leave; inbound
//! responses are classified for prompt injection before the agent sees them.

use std::sync::Arc;

use tokio::net::TcpListener;

mod api;
mod auth;
mod config;
mod domain;
mod engine;
mod error;
mod logging;

use crate::api::build_router;
use crate::auth::ApiKeyValidator;
use crate::config::Config;
use crate::error::GatewayError;
use crate::engine::{
    Detector, DisabledPaymentGate, Gateway, GatewayTimeouts, HttpPaymentGate, HttpUpstream,
    KeywordInjectionDetector, LlmInjectionClassifier, PatternScanner, PaymentGate, PolicyEngine,
    RequestSanitizer, ResponseClassifier, ThresholdPolicyEngine,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The interception pipeline.
    pub gateway: Arc<Gateway>,
    pub classifier_enabled: bool,
    pub payment_enabled: bool,
    pub auth_enabled: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: No .env file loaded ({e})");
    }

    logging::init();

    tracing::info!("Starting Barrier Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        block_threshold = config.inspection.block_threshold,
        redact_threshold = config.inspection.redact_threshold,
        auth_enabled = config.auth.enabled,
        "Configuration loaded"
    );

    let gateway = build_gateway(&config)?;

    let validator = ApiKeyValidator::new(config.auth.api_keys.clone());
    if config.auth.enabled {
        tracing::info!(api_keys = validator.len(), "Authentication enabled");
    } else {
        tracing::warn!("Authentication is DISABLED - enable for production");
    }

    let state = AppState {
        gateway: Arc::new(gateway),
        classifier_enabled: config.classifier.enabled,
        payment_enabled: config.payment.enabled,
        auth_enabled: config.auth.enabled,
    };

    let app = build_router(state, config.auth.enabled, validator);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "Server listening");
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire detectors, policy and the two outbound hops into one pipeline.
fn build_gateway(config: &Config) -> Result<Gateway, GatewayError> {
    let setup =
        |what: &str, e: &dyn std::fmt::Display| GatewayError::Config(format!("{}: {}", what, e));

    let policy: Arc<dyn PolicyEngine> = Arc::new(ThresholdPolicyEngine::from_config(&config.inspection));

    let scanner = PatternScanner::from_config(&config.inspection)
        .map_err(|e| setup("pattern scanner", &e))?;
    tracing::info!(patterns = scanner.pattern_count(), "Pattern scanner ready");
    let sanitizer = RequestSanitizer::new(vec![Arc::new(scanner)], policy.clone(), &config.inspection);

    let keywords =
        KeywordInjectionDetector::new(Vec::new()).map_err(|e| setup("keyword detector", &e))?;
    let mut response_detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(keywords)];
    if config.classifier.enabled {
        tracing::info!(
            model = %config.classifier.model,
            timeout_ms = config.classifier.timeout_ms,
            "LLM injection classifier enabled"
        );
        let llm = LlmInjectionClassifier::new(config.classifier.clone())
            .map_err(|e| setup("injection classifier client", &e))?;
        response_detectors.push(Arc::new(llm));
    } else {
        tracing::info!("LLM injection classifier disabled; keyword detector only");
    }
    let classifier = ResponseClassifier::new(response_detectors, policy);
    tracing::info!(detectors = ?classifier.detector_names(), "Response classifier ready");

    let payment: Arc<dyn PaymentGate> = if config.payment.enabled {
        tracing::info!(
            endpoint = %config.payment.endpoint,
            price = %config.payment.price,
            network = %config.payment.network,
            "Payment gate enabled"
        );
        Arc::new(
            HttpPaymentGate::new(config.payment.clone())
                .map_err(|e| setup("payment gate client", &e))?,
        )
    } else {
        tracing::info!("Payment gate disabled; every request is unmetered");
        Arc::new(DisabledPaymentGate)
    };

    let upstream = Arc::new(
        HttpUpstream::new(&config.upstream).map_err(|e| setup("upstream client", &e))?,
    );

    Ok(Gateway::new(
        sanitizer,
        payment,
        upstream,
        classifier,
        GatewayTimeouts::from_config(config),
    ))
}
