//! Policy Engine - turns findings into a verdict.
//!
//! Deterministic and side-effect free: the same findings and stage always
//! produce the same verdict. Rules are evaluated in order, first match wins:
//!
//! 1. INJECTION at or above the block threshold blocks (either stage).
//! 2. On the request stage, PII or SECRET at or above the block threshold blocks.
//! 3. On the request stage, PII or SECRET at or above the redact threshold redacts.
//! 4. Otherwise allow.

use crate::config::InspectionConfig;
use crate::domain::{Directive, Finding, FindingKind, Stage, Verdict};

pub const REASON_INJECTION: &str = "prompt injection detected";
pub const REASON_CLEAN: &str = "no actionable findings";

/// Trait for policy engine implementations.
pub trait PolicyEngine: Send + Sync {
    /// Resolve `findings` for `stage` into a verdict.
    fn decide(&self, findings: &[Finding], stage: Stage) -> Verdict;
}

/// Threshold-driven policy engine.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicyEngine {
    block_threshold: f64,
    redact_threshold: f64,
}

impl ThresholdPolicyEngine {
    pub fn new(block_threshold: f64, redact_threshold: f64) -> Self {
        Self {
            block_threshold,
            redact_threshold,
        }
    }

    pub fn from_config(config: &InspectionConfig) -> Self {
        Self::new(config.block_threshold, config.redact_threshold)
    }

    fn at_least(findings: &[Finding], threshold: f64, pred: impl Fn(&Finding) -> bool) -> Vec<Finding> {
        findings
            .iter()
            .filter(|f| pred(f) && f.confidence >= threshold)
            .cloned()
            .collect()
    }
}

impl PolicyEngine for ThresholdPolicyEngine {
    fn decide(&self, findings: &[Finding], stage: Stage) -> Verdict {
        let injections = Self::at_least(findings, self.block_threshold, |f| {
            f.kind == FindingKind::Injection
        });
        if !injections.is_empty() {
            return Verdict::new(stage, Directive::Block, REASON_INJECTION, injections);
        }

        // Responses are block-or-allow only; leakage rules do not apply.
        if stage == Stage::Response {
            return Verdict::new(stage, Directive::Allow, REASON_CLEAN, Vec::new());
        }

        let blocking = Self::at_least(findings, self.block_threshold, Finding::is_leakage);
        if !blocking.is_empty() {
            let reason = leakage_reason(&blocking, "detected");
            return Verdict::new(stage, Directive::Block, reason, blocking);
        }

        let redactable = Self::at_least(findings, self.redact_threshold, Finding::is_leakage);
        if !redactable.is_empty() {
            let reason = leakage_reason(&redactable, "redacted");
            return Verdict::new(stage, Directive::Redact, reason, redactable);
        }

        Verdict::new(stage, Directive::Allow, REASON_CLEAN, Vec::new())
    }
}

/// "PII detected: CREDIT_CARD, EMAIL_ADDRESS". Names labels, never content.
fn leakage_reason(findings: &[Finding], verb: &str) -> String {
    let class = if findings.iter().any(|f| f.kind == FindingKind::PiiEntity) {
        "PII"
    } else {
        "secret"
    };

    let mut labels: Vec<&str> = Vec::new();
    for finding in findings {
        if !labels.contains(&finding.label.as_str()) {
            labels.push(&finding.label);
        }
    }

    format!("{} {}: {}", class, verb, labels.join(", "))
}
