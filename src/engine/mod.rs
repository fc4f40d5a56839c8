//! Inspection engine for Barrier Gateway.
//!
//! This module contains the bidirectional interception pipeline:
//! - Detectors: pattern scanner, keyword injection detector, LLM classifier
//! - Policy Engine: resolves findings into ALLOW / REDACT / BLOCK
//! - Request Sanitizer and Response Classifier: one inspection pass per direction
//! - Payment Gate and Upstream: the two outbound hops
//! - Gateway: per-request state machine tying it together

mod classifier;
mod detector;
mod firewall;
mod gateway;
mod llm_guard;
mod payment;
mod policy;
mod sanitizer;
mod scanner;
mod upstream;

pub use classifier::*;
pub use detector::*;
pub use firewall::*;
pub use gateway::*;
pub use llm_guard::*;
pub use payment::*;
pub use policy::*;
pub use sanitizer::*;
pub use scanner::*;
pub use upstream::*;
