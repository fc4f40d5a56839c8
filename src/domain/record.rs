//! Per-request audit trail.
//!
//! One [`DecisionRecord`] per correlation id. The gateway owns it and appends
//! each stage's contribution as the stage completes; stages themselves never
//! see the record.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CorrelationId, Directive, InspectionRequest, InspectionResponse, Stage, Verdict};

/// Lifecycle of one proxied exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayState {
    Received,
    Sanitizing,
    BlockedAtRequest,
    PaymentPending,
    PaymentDenied,
    Forwarding,
    UpstreamFailed,
    Classifying,
    BlockedAtResponse,
    Completed,
    Cancelled,
}

impl GatewayState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayState::BlockedAtRequest
                | GatewayState::PaymentDenied
                | GatewayState::UpstreamFailed
                | GatewayState::BlockedAtResponse
                | GatewayState::Completed
                | GatewayState::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: GatewayState) -> bool {
        use GatewayState::*;

        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Received, Sanitizing)
                | (Sanitizing, BlockedAtRequest)
                | (Sanitizing, PaymentPending)
                | (PaymentPending, PaymentDenied)
                | (PaymentPending, Forwarding)
                | (Forwarding, UpstreamFailed)
                | (Forwarding, Classifying)
                | (Classifying, BlockedAtResponse)
                | (Classifying, Completed)
        )
    }
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GatewayState::Received => "RECEIVED",
            GatewayState::Sanitizing => "SANITIZING",
            GatewayState::BlockedAtRequest => "BLOCKED_AT_REQUEST",
            GatewayState::PaymentPending => "PAYMENT_PENDING",
            GatewayState::PaymentDenied => "PAYMENT_DENIED",
            GatewayState::Forwarding => "FORWARDING",
            GatewayState::UpstreamFailed => "UPSTREAM_FAILED",
            GatewayState::Classifying => "CLASSIFYING",
            GatewayState::BlockedAtResponse => "BLOCKED_AT_RESPONSE",
            GatewayState::Completed => "COMPLETED",
            GatewayState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// What the payment gate said, or why it said nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Set when the gate could not be consulted (timeout, unavailable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PaymentOutcome {
    pub fn authorized(reference: Option<String>) -> Self {
        Self {
            authorized: true,
            reference,
            failure: None,
        }
    }

    pub fn denied(reference: Option<String>) -> Self {
        Self {
            authorized: false,
            reference,
            failure: None,
        }
    }

    pub fn failed(failure: impl Into<String>) -> Self {
        Self {
            authorized: false,
            reference: None,
            failure: Some(failure.into()),
        }
    }
}

/// Final disposition reported in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalAction {
    /// Forwarded unchanged and delivered.
    Allow,
    /// Forwarded with masked spans and delivered.
    Redact,
    Block,
    PaymentDenied,
    UpstreamError,
    Cancelled,
}

/// When the record entered a state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateEntry {
    pub state: GatewayState,
    pub at: DateTime<Utc>,
}

/// Accumulated audit trail for one correlation id.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    correlation_id: CorrelationId,
    client_id: Option<String>,
    original_request: InspectionRequest,
    sanitized_request: Option<InspectionRequest>,
    request_verdict: Option<Verdict>,
    payment: Option<PaymentOutcome>,
    response: Option<InspectionResponse>,
    response_verdict: Option<Verdict>,
    upstream_error: Option<String>,
    state: GatewayState,
    history: Vec<StateEntry>,
    final_action: Option<FinalAction>,
}

impl DecisionRecord {
    /// Open a record at ingress. The state is `RECEIVED`.
    pub fn open(request: InspectionRequest, client_id: Option<String>) -> Self {
        let received_at = request.received_at();
        Self {
            correlation_id: request.correlation_id(),
            client_id,
            original_request: request,
            sanitized_request: None,
            request_verdict: None,
            payment: None,
            response: None,
            response_verdict: None,
            upstream_error: None,
            state: GatewayState::Received,
            history: vec![StateEntry {
                state: GatewayState::Received,
                at: received_at,
            }],
            final_action: None,
        }
    }

    /// Move to `next`, stamping the time. Illegal transitions are ignored
    /// and reported.
    pub fn advance(&mut self, next: GatewayState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                correlation_id = %self.correlation_id,
                from = %self.state,
                to = %next,
                "Illegal gateway state transition"
            );
            debug_assert!(false, "illegal transition {} -> {}", self.state, next);
            return false;
        }
        self.state = next;
        self.history.push(StateEntry {
            state: next,
            at: Utc::now(),
        });
        true
    }

    pub fn record_request_verdict(&mut self, verdict: Verdict, forwarded: Option<InspectionRequest>) {
        self.request_verdict = Some(verdict);
        self.sanitized_request = forwarded;
    }

    pub fn record_payment(&mut self, outcome: PaymentOutcome) {
        self.payment = Some(outcome);
    }

    pub fn record_response(&mut self, response: InspectionResponse) {
        self.response = Some(response);
    }

    pub fn record_response_verdict(&mut self, verdict: Verdict) {
        self.response_verdict = Some(verdict);
    }

    pub fn record_upstream_error(&mut self, error: impl Into<String>) {
        self.upstream_error = Some(error.into());
    }

    /// Close the record and derive the final action from what was recorded.
    ///
    /// A BLOCK verdict on either side always yields [`FinalAction::Block`].
    pub fn finalize(&mut self) -> FinalAction {
        let blocked = [&self.request_verdict, &self.response_verdict]
            .into_iter()
            .flatten()
            .any(Verdict::is_block);

        let action = if blocked {
            FinalAction::Block
        } else {
            match self.state {
                GatewayState::PaymentDenied => FinalAction::PaymentDenied,
                GatewayState::UpstreamFailed => FinalAction::UpstreamError,
                GatewayState::Completed => match self.request_verdict.as_ref().map(Verdict::directive) {
                    Some(Directive::Redact) => FinalAction::Redact,
                    _ => FinalAction::Allow,
                },
                _ => FinalAction::Cancelled,
            }
        };
        self.final_action = Some(action);
        action
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn history(&self) -> &[StateEntry] {
        &self.history
    }

    pub fn original_request(&self) -> &InspectionRequest {
        &self.original_request
    }

    pub fn sanitized_request(&self) -> Option<&InspectionRequest> {
        self.sanitized_request.as_ref()
    }

    pub fn request_verdict(&self) -> Option<&Verdict> {
        self.request_verdict.as_ref()
    }

    pub fn payment(&self) -> Option<&PaymentOutcome> {
        self.payment.as_ref()
    }

    pub fn response(&self) -> Option<&InspectionResponse> {
        self.response.as_ref()
    }

    pub fn response_verdict(&self) -> Option<&Verdict> {
        self.response_verdict.as_ref()
    }

    pub fn upstream_error(&self) -> Option<&str> {
        self.upstream_error.as_deref()
    }

    pub fn final_action(&self) -> Option<FinalAction> {
        self.final_action
    }

    /// Content-free view for the audit log.
    pub fn summary(&self) -> AuditSummary {
        let verdict_summary = |v: &Verdict| VerdictSummary {
            stage: v.stage(),
            directive: v.directive(),
            reason: v.reason().to_string(),
            labels: v.findings().iter().map(|f| f.label.clone()).collect(),
        };

        AuditSummary {
            correlation_id: self.correlation_id,
            client_id: self.client_id.clone(),
            method: self.original_request.method().to_string(),
            target_host: self
                .original_request
                .url()
                .host_str()
                .unwrap_or_default()
                .to_string(),
            request_body_bytes: self.original_request.body().len(),
            forwarded_body_bytes: self.sanitized_request.as_ref().map(|r| r.body().len()),
            request_verdict: self.request_verdict.as_ref().map(verdict_summary),
            payment: self.payment.clone(),
            upstream_status: self.response.as_ref().map(InspectionResponse::status),
            upstream_error: self.upstream_error.clone(),
            response_verdict: self.response_verdict.as_ref().map(verdict_summary),
            final_state: self.state,
            final_action: self.final_action,
            history: self.history.clone(),
        }
    }
}

/// Verdict without spans or matched content.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictSummary {
    pub stage: Stage,
    pub directive: Directive,
    pub reason: String,
    pub labels: Vec<String>,
}

/// What gets written to the audit log when a record is finalized.
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub correlation_id: CorrelationId,
    pub client_id: Option<String>,
    pub method: String,
    pub target_host: String,
    pub request_body_bytes: usize,
    pub forwarded_body_bytes: Option<usize>,
    pub request_verdict: Option<VerdictSummary>,
    pub payment: Option<PaymentOutcome>,
    pub upstream_status: Option<u16>,
    pub upstream_error: Option<String>,
    pub response_verdict: Option<VerdictSummary>,
    pub final_state: GatewayState,
    pub final_action: Option<FinalAction>,
    pub history: Vec<StateEntry>,
}
