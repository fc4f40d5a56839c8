//! Gateway - per-request lifecycle.
//!
//! Sequences sanitizer, payment gate, upstream fetch and response classifier
//! for one exchange, driving a [`DecisionRecord`] through its states. Every
//! suspension point is bounded by the earlier of its own timeout and the
//! request deadline, and aborts as soon as the request is cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::domain::{
    CorrelationId, DecisionRecord, GatewayState, InspectionRequest, InspectionResponse,
    PaymentOutcome, Stage, Verdict,
};
use crate::engine::classifier::{ResponseClassifier, REASON_UNAVAILABLE};
use crate::engine::payment::PaymentGate;
use crate::engine::sanitizer::RequestSanitizer;
use crate::engine::upstream::{Upstream, UpstreamError};
use crate::logging::AUDIT_TARGET;

/// Bounds for each suspension point.
#[derive(Debug, Clone, Copy)]
pub struct GatewayTimeouts {
    pub payment: Duration,
    pub upstream: Duration,
    pub classification: Duration,
    /// Upper bound on the whole exchange.
    pub request_deadline: Duration,
}

impl GatewayTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            payment: config.payment.timeout(),
            upstream: config.upstream.timeout(),
            // The classifier bounds each call itself; this also covers the
            // local detectors that run next to it.
            classification: config.classifier.timeout() + Duration::from_secs(1),
            request_deadline: config.inspection.request_deadline(),
        }
    }
}

/// How an exchange ended.
#[derive(Debug, Clone)]
pub enum GatewayOutcome {
    /// Upstream response, passed by the classifier, to deliver verbatim.
    Completed(InspectionResponse),
    BlockedAtRequest(Verdict),
    PaymentDenied { reference: Option<String> },
    UpstreamFailed(UpstreamError),
    BlockedAtResponse(Verdict),
    Cancelled,
}

/// Finalized record plus the outcome to map onto the HTTP reply.
#[derive(Debug)]
pub struct GatewayExchange {
    pub record: DecisionRecord,
    pub outcome: GatewayOutcome,
}

enum Wait<T> {
    Done(T),
    TimedOut(Duration),
    Cancelled,
}

/// Await `fut` until `deadline`, or until `cancel` fires.
async fn bounded<F: Future>(fut: F, deadline: Instant, cancel: &CancellationToken) -> Wait<F::Output> {
    let limit = deadline.saturating_duration_since(Instant::now());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wait::Cancelled,
        result = tokio::time::timeout_at(deadline, fut) => match result {
            Ok(value) => Wait::Done(value),
            Err(_) => Wait::TimedOut(limit),
        },
    }
}

/// The interception pipeline. Shared across requests; holds no per-request state.
pub struct Gateway {
    sanitizer: RequestSanitizer,
    payment: Arc<dyn PaymentGate>,
    upstream: Arc<dyn Upstream>,
    classifier: ResponseClassifier,
    timeouts: GatewayTimeouts,
}

impl Gateway {
    pub fn new(
        sanitizer: RequestSanitizer,
        payment: Arc<dyn PaymentGate>,
        upstream: Arc<dyn Upstream>,
        classifier: ResponseClassifier,
        timeouts: GatewayTimeouts,
    ) -> Self {
        Self {
            sanitizer,
            payment,
            upstream,
            classifier,
            timeouts,
        }
    }

    /// Run one exchange to a terminal state.
    pub async fn handle(
        &self,
        request: InspectionRequest,
        client_id: Option<String>,
        cancel: CancellationToken,
    ) -> GatewayExchange {
        let started = Instant::now();
        let deadline = started + self.timeouts.request_deadline;
        let stage_deadline = |timeout: Duration| (Instant::now() + timeout).min(deadline);

        let mut record = DecisionRecord::open(request, client_id);
        tracing::info!(
            correlation_id = %record.correlation_id(),
            method = %record.original_request().method(),
            host = record.original_request().url().host_str().unwrap_or_default(),
            "Exchange received"
        );

        // Request inspection
        transition(&mut record, GatewayState::Sanitizing);
        let waited = bounded(
            self.sanitizer.sanitize(record.original_request()),
            deadline,
            &cancel,
        )
        .await;
        let sanitized = match waited {
            Wait::Done(outcome) => outcome,
            Wait::Cancelled => return finish(record, GatewayOutcome::Cancelled),
            Wait::TimedOut(_) => {
                let verdict = Verdict::fail_closed(Stage::Request, "request deadline exceeded");
                record.record_request_verdict(verdict.clone(), None);
                transition(&mut record, GatewayState::BlockedAtRequest);
                return finish(record, GatewayOutcome::BlockedAtRequest(verdict));
            }
        };

        let forwarded = match sanitized.forwarded {
            Some(forwarded) if !sanitized.verdict.is_block() => forwarded,
            _ => {
                let verdict = sanitized.verdict;
                record.record_request_verdict(verdict.clone(), None);
                transition(&mut record, GatewayState::BlockedAtRequest);
                return finish(record, GatewayOutcome::BlockedAtRequest(verdict));
            }
        };
        record.record_request_verdict(sanitized.verdict, Some(forwarded.clone()));

        // Payment
        transition(&mut record, GatewayState::PaymentPending);
        let descriptor = forwarded.descriptor();
        let payment = match bounded(
            self.payment.authorize(forwarded.correlation_id(), &descriptor),
            stage_deadline(self.timeouts.payment),
            &cancel,
        )
        .await
        {
            Wait::Done(Ok(auth)) if auth.authorized => PaymentOutcome::authorized(auth.reference),
            Wait::Done(Ok(auth)) => PaymentOutcome::denied(auth.reference),
            Wait::Done(Err(e)) => {
                tracing::warn!(
                    correlation_id = %record.correlation_id(),
                    error = %e,
                    "Payment gate failed; treating as denied"
                );
                PaymentOutcome::failed(e.to_string())
            }
            Wait::TimedOut(limit) => {
                tracing::warn!(
                    correlation_id = %record.correlation_id(),
                    timeout_ms = limit.as_millis() as u64,
                    "Payment gate timed out; treating as denied"
                );
                PaymentOutcome::failed(format!("payment gate timed out after {:?}", limit))
            }
            Wait::Cancelled => return finish(record, GatewayOutcome::Cancelled),
        };

        if !payment.authorized {
            let reference = payment.reference.clone();
            record.record_payment(payment);
            transition(&mut record, GatewayState::PaymentDenied);
            return finish(record, GatewayOutcome::PaymentDenied { reference });
        }
        record.record_payment(payment);

        // Upstream
        transition(&mut record, GatewayState::Forwarding);
        let fetched = match bounded(
            self.upstream.fetch(&forwarded),
            stage_deadline(self.timeouts.upstream),
            &cancel,
        )
        .await
        {
            Wait::Done(result) => result,
            Wait::TimedOut(limit) => Err(UpstreamError::Timeout(limit)),
            Wait::Cancelled => return finish(record, GatewayOutcome::Cancelled),
        };

        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    correlation_id = %record.correlation_id(),
                    error = %e,
                    "Upstream fetch failed"
                );
                record.record_upstream_error(e.to_string());
                transition(&mut record, GatewayState::UpstreamFailed);
                return finish(record, GatewayOutcome::UpstreamFailed(e));
            }
        };
        record.record_response(response.clone());

        // Response inspection
        transition(&mut record, GatewayState::Classifying);
        let verdict = match bounded(
            self.classifier.classify(&response),
            stage_deadline(self.timeouts.classification),
            &cancel,
        )
        .await
        {
            Wait::Done(verdict) => verdict,
            Wait::TimedOut(limit) => {
                tracing::warn!(
                    correlation_id = %record.correlation_id(),
                    timeout_ms = limit.as_millis() as u64,
                    "Response classification timed out; blocking"
                );
                Verdict::fail_closed(Stage::Response, REASON_UNAVAILABLE)
            }
            Wait::Cancelled => return finish(record, GatewayOutcome::Cancelled),
        };

        record.record_response_verdict(verdict.clone());
        if verdict.is_block() {
            transition(&mut record, GatewayState::BlockedAtResponse);
            return finish(record, GatewayOutcome::BlockedAtResponse(verdict));
        }

        transition(&mut record, GatewayState::Completed);
        finish(record, GatewayOutcome::Completed(response))
    }
}

fn transition(record: &mut DecisionRecord, next: GatewayState) {
    let from = record.state();
    if record.advance(next) {
        tracing::debug!(
            correlation_id = %record.correlation_id(),
            from = %from,
            to = %next,
            "Gateway state changed"
        );
    }
}

/// Close the record, emit the audit event, and pair it with the outcome.
fn finish(mut record: DecisionRecord, outcome: GatewayOutcome) -> GatewayExchange {
    if matches!(outcome, GatewayOutcome::Cancelled) {
        transition(&mut record, GatewayState::Cancelled);
    }
    let action = record.finalize();

    let summary = record.summary();
    let audit = audit_payload(&summary, record.correlation_id());
    tracing::info!(
        target: AUDIT_TARGET,
        correlation_id = %record.correlation_id(),
        final_state = %record.state(),
        final_action = ?action,
        audit = %audit,
        "Exchange finalized"
    );

    GatewayExchange { record, outcome }
}

/// JSON body of the audit event. An unencodable summary is reported and
/// audited as an empty payload.
fn audit_payload(summary: &impl serde::Serialize, correlation_id: CorrelationId) -> String {
    match serde_json::to_string(summary) {
        Ok(audit) => audit,
        Err(e) => {
            tracing::warn!(
                correlation_id = %correlation_id,
                error = %e,
                "Audit summary could not be serialized"
            );
            String::new()
        }
    }
}
