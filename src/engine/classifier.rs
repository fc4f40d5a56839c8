//! Response Classifier - inbound injection inspection.
//!
//! Textual bodies go through every response-side detector; binary bodies are
//! allowed without inspection. Unlike the request side this pass is
//! fail-closed: if any detector cannot produce an answer the verdict is BLOCK.

use std::sync::Arc;

use crate::domain::{InspectionResponse, Stage, Verdict};
use crate::engine::detector::{ContentHint, Detector};
use crate::engine::policy::PolicyEngine;

pub const REASON_UNAVAILABLE: &str = "classification unavailable";

/// Inbound inspection pass.
pub struct ResponseClassifier {
    detectors: Vec<Arc<dyn Detector>>,
    policy: Arc<dyn PolicyEngine>,
}

impl ResponseClassifier {
    pub fn new(detectors: Vec<Arc<dyn Detector>>, policy: Arc<dyn PolicyEngine>) -> Self {
        Self { detectors, policy }
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Classify `response`. Never returns REDACT.
    pub async fn classify(&self, response: &InspectionResponse) -> Verdict {
        let correlation_id = response.correlation_id();

        if !response.is_textual() {
            tracing::debug!(
                correlation_id = %correlation_id,
                content_type = ?response.headers().content_type(),
                "Non-text response body; skipping classification"
            );
            return self.policy.decide(&[], Stage::Response);
        }

        // Lossy decoding: an agent reading this body would see the same text.
        let text = String::from_utf8_lossy(response.body());
        let hint = ContentHint::body(response.headers().content_type());

        let mut findings = Vec::new();
        for detector in &self.detectors {
            match detector.inspect(&text, &hint).await {
                Ok(found) => findings.extend(found),
                Err(e) => {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        detector = detector.name(),
                        error = %e,
                        "Response detector failed; blocking"
                    );
                    return Verdict::fail_closed(Stage::Response, REASON_UNAVAILABLE);
                }
            }
        }

        let verdict = self.policy.decide(&findings, Stage::Response);
        tracing::debug!(
            correlation_id = %correlation_id,
            findings = findings.len(),
            directive = %verdict.directive(),
            "Response inspection complete"
        );
        verdict
    }
}
