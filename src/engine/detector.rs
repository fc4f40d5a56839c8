//! Detector capability shared by every content inspector.
//!
//! The request sanitizer and the response classifier only ever talk to
//! `dyn Detector`; new detectors plug in without touching either.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Finding, Location};

/// Why a detector could not produce a result.
///
/// "Ran and found nothing" is `Ok(vec![])`, never an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    #[error("detector timed out after {0:?}")]
    Timeout(Duration),
}

/// What the detector is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHint {
    /// Media type without parameters, if known.
    pub content_type: Option<String>,
    /// Where the content came from; stamped onto every finding.
    pub location: Location,
}

impl ContentHint {
    pub fn new(location: Location, content_type: Option<String>) -> Self {
        Self {
            content_type,
            location,
        }
    }

    pub fn body(content_type: Option<String>) -> Self {
        Self::new(Location::Body, content_type)
    }
}

/// A unit that scores or labels a piece of text.
///
/// Implementations are shared across concurrent requests and must be
/// stateless or internally synchronized.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Stable name recorded on findings and in logs.
    fn name(&self) -> &str;

    /// Inspect `content` and return findings ordered by position.
    async fn inspect(&self, content: &str, hint: &ContentHint) -> Result<Vec<Finding>, DetectorError>;
}
