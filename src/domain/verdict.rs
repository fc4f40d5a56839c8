//! Policy output for one inspection pass.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Finding;

/// Which direction an inspection pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Request,
    Response,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Request => write!(f, "request"),
            Stage::Response => write!(f, "response"),
        }
    }
}

/// What to do with the inspected content.
///
/// Variants are declared in ascending severity so that `max` picks the
/// dominant directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Directive {
    Allow,
    Redact,
    Block,
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Directive::Allow => write!(f, "ALLOW"),
            Directive::Redact => write!(f, "REDACT"),
            Directive::Block => write!(f, "BLOCK"),
        }
    }
}

/// Decision for one pass, with the findings that produced it.
///
/// Only the policy engine and the fail-closed paths construct verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Verdict {
    stage: Stage,
    directive: Directive,
    reason: String,
    findings: Vec<Finding>,
}

impl Verdict {
    pub(crate) fn new(
        stage: Stage,
        directive: Directive,
        reason: impl Into<String>,
        findings: Vec<Finding>,
    ) -> Self {
        if stage == Stage::Response {
            debug_assert!(directive != Directive::Redact);
        }
        Self {
            stage,
            directive,
            reason: reason.into(),
            findings,
        }
    }

    /// BLOCK without findings, used when an inspection could not run.
    pub(crate) fn fail_closed(stage: Stage, reason: impl Into<String>) -> Self {
        Self::new(stage, Directive::Block, reason, Vec::new())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn directive(&self) -> Directive {
        self.directive
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Contributing findings, in detector order.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn is_block(&self) -> bool {
        self.directive == Directive::Block
    }
}
