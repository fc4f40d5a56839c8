//! Detector output types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Broad class of a finding; drives which policy rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    /// Personally identifiable information.
    PiiEntity,
    /// Credential or key material.
    Secret,
    /// Attempt to manipulate an agent's instructions.
    Injection,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingKind::PiiEntity => write!(f, "PII_ENTITY"),
            FindingKind::Secret => write!(f, "SECRET"),
            FindingKind::Injection => write!(f, "INJECTION"),
        }
    }
}

/// Entities the pattern scanner knows how to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    EmailAddress,
    PhoneNumber,
    CreditCard,
    UsSsn,
    UsBankNumber,
    Crypto,
    IpAddress,
    ApiKey,
    SecretKey,
    Password,
    Token,
    Credential,
    PrivateKey,
    HighEntropy,
}

impl EntityKind {
    pub const ALL: [EntityKind; 15] = [
        EntityKind::Person,
        EntityKind::EmailAddress,
        EntityKind::PhoneNumber,
        EntityKind::CreditCard,
        EntityKind::UsSsn,
        EntityKind::UsBankNumber,
        EntityKind::Crypto,
        EntityKind::IpAddress,
        EntityKind::ApiKey,
        EntityKind::SecretKey,
        EntityKind::Password,
        EntityKind::Token,
        EntityKind::Credential,
        EntityKind::PrivateKey,
        EntityKind::HighEntropy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "PERSON",
            EntityKind::EmailAddress => "EMAIL_ADDRESS",
            EntityKind::PhoneNumber => "PHONE_NUMBER",
            EntityKind::CreditCard => "CREDIT_CARD",
            EntityKind::UsSsn => "US_SSN",
            EntityKind::UsBankNumber => "US_BANK_NUMBER",
            EntityKind::Crypto => "CRYPTO",
            EntityKind::IpAddress => "IP_ADDRESS",
            EntityKind::ApiKey => "API_KEY",
            EntityKind::SecretKey => "SECRET_KEY",
            EntityKind::Password => "PASSWORD",
            EntityKind::Token => "TOKEN",
            EntityKind::Credential => "CREDENTIAL",
            EntityKind::PrivateKey => "PRIVATE_KEY",
            EntityKind::HighEntropy => "HIGH_ENTROPY",
        }
    }

    /// Secrets are credential-shaped; everything else identifies a person.
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            EntityKind::ApiKey
            | EntityKind::SecretKey
            | EntityKind::Password
            | EntityKind::Token
            | EntityKind::Credential
            | EntityKind::PrivateKey
            | EntityKind::HighEntropy => FindingKind::Secret,
            _ => FindingKind::PiiEntity,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("Unknown entity kind: {}", s))
    }
}

/// Which part of an exchange a finding was located in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "segment", rename_all = "snake_case")]
pub enum Location {
    Body,
    Header { name: String },
    Query { param: String },
    /// Percent-decoded URL path.
    Path,
    /// Percent-decoded URL userinfo; `part` is `username` or `password`.
    UserInfo { part: String },
}

impl Location {
    pub fn url_password() -> Self {
        Location::UserInfo {
            part: "password".to_string(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Body => write!(f, "body"),
            Location::Header { name } => write!(f, "header:{}", name),
            Location::Query { param } => write!(f, "query:{}", param),
            Location::Path => write!(f, "path"),
            Location::UserInfo { part } => write!(f, "userinfo:{}", part),
        }
    }
}

/// Byte range within the decoded text of one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One detector's observation about a piece of content.
///
/// Findings never carry the matched text, only where it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Finding {
    pub kind: FindingKind,
    /// Entity type or injection label.
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub location: Location,
    pub span: Span,
    /// Name of the detector that produced this finding.
    pub detector: String,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        label: impl Into<String>,
        confidence: f64,
        location: Location,
        span: Span,
        detector: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            location,
            span,
            detector: detector.into(),
        }
    }

    pub fn is_leakage(&self) -> bool {
        matches!(self.kind, FindingKind::PiiEntity | FindingKind::Secret)
    }
}
