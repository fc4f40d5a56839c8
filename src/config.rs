//! Configuration module for Barrier Gateway.
//!
//! Loads configuration from YAML files and environment variables once at
//! startup. Nothing here is mutated afterwards.

use std::collections::HashSet;
use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use crate::auth::ConfiguredApiKey;
use crate::domain::EntityKind;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub inspection: InspectionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Ingress authentication.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<ConfiguredApiKey>,
}

/// Thresholds and scope of the inspection passes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InspectionConfig {
    /// Findings at or above this confidence block the exchange.
    pub block_threshold: f64,
    /// Request-side PII/secret findings at or above this (and below block) are masked.
    pub redact_threshold: f64,
    /// Scanner findings below this confidence are dropped before policy.
    pub min_confidence: f64,
    /// Entities the scanner reports. Empty means all.
    pub enabled_entities: HashSet<EntityKind>,
    /// Entities never reported, even if enabled.
    pub disabled_entities: HashSet<EntityKind>,
    /// Headers forwarded without scanning (routing metadata).
    pub passthrough_headers: HashSet<String>,
    /// Replacement for each redacted span.
    pub mask_token: String,
    /// Upper bound on the whole pipeline for one request.
    pub request_deadline_ms: u64,
}

impl InspectionConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    /// Whether the scanner should report `entity`.
    pub fn entity_enabled(&self, entity: EntityKind) -> bool {
        (self.enabled_entities.is_empty() || self.enabled_entities.contains(&entity))
            && !self.disabled_entities.contains(&entity)
    }

    pub fn is_passthrough(&self, header: &str) -> bool {
        self.passthrough_headers.contains(&header.to_ascii_lowercase())
    }
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            block_threshold: 0.8,
            redact_threshold: 0.5,
            min_confidence: 0.3,
            enabled_entities: HashSet::new(),
            disabled_entities: HashSet::new(),
            passthrough_headers: ["host", "content-length", "content-type", "accept", "user-agent"]
                .into_iter()
                .map(String::from)
                .collect(),
            mask_token: "[REDACTED]".to_string(),
            request_deadline_ms: 60_000,
        }
    }
}

/// Generative prompt-injection classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
    /// Longer bodies are judged in chunks of this many characters.
    pub max_content_chars: usize,
    /// Bodies needing more chunks than this are not classified (fail closed).
    pub max_chunks: usize,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "meta-llama/llama-guard-4-12b".to_string(),
            timeout_ms: 10_000,
            max_content_chars: 32_000,
            max_chunks: 8,
        }
    }
}

/// Payment gate consulted before forwarding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub enabled: bool,
    /// Facilitator authorization endpoint.
    pub endpoint: String,
    pub price: String,
    pub pay_to: String,
    pub network: String,
    pub timeout_ms: u64,
}

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            price: "$0.001".to_string(),
            pay_to: String::new(),
            network: "base-sepolia".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Outbound fetch to the caller-supplied target.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub timeout_ms: u64,
    pub max_body_bytes: usize,
    pub user_agent: String,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_body_bytes: 10 * 1024 * 1024,
            user_agent: concat!("barrier-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (BARRIER_*)
    /// 2. config/local.yaml (if exists)
    /// 3. config/default.yaml
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("BARRIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()
    }

    /// Check cross-field constraints and normalize header names.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let inspection = &mut self.inspection;

        for (name, value) in [
            ("block_threshold", inspection.block_threshold),
            ("redact_threshold", inspection.redact_threshold),
            ("min_confidence", inspection.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Message(format!(
                    "inspection.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if inspection.redact_threshold > inspection.block_threshold {
            return Err(ConfigError::Message(format!(
                "inspection.redact_threshold ({}) must not exceed block_threshold ({})",
                inspection.redact_threshold, inspection.block_threshold
            )));
        }
        if inspection.mask_token.is_empty() {
            return Err(ConfigError::Message(
                "inspection.mask_token must not be empty".to_string(),
            ));
        }
        if inspection.request_deadline_ms == 0 {
            return Err(ConfigError::Message(
                "inspection.request_deadline_ms must be positive".to_string(),
            ));
        }
        inspection.passthrough_headers = inspection
            .passthrough_headers
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();

        if self.classifier.enabled && self.classifier.api_key.is_empty() {
            return Err(ConfigError::Message(
                "classifier.api_key is required when the classifier is enabled".to_string(),
            ));
        }
        if self.classifier.max_content_chars == 0 || self.classifier.max_chunks == 0 {
            return Err(ConfigError::Message(
                "classifier.max_content_chars and classifier.max_chunks must be positive".to_string(),
            ));
        }
        if self.payment.enabled && self.payment.endpoint.is_empty() {
            return Err(ConfigError::Message(
                "payment.endpoint is required when the payment gate is enabled".to_string(),
            ));
        }
        if self.auth.enabled && self.auth.api_keys.is_empty() {
            tracing::warn!("Authentication enabled without any API keys; every request will be rejected");
        }

        Ok(self)
    }
}
