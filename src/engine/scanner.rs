//! Pattern/entity scanner for PII and credential material.
//!
//! Deterministic and local: a static catalogue of regexes, each tagged with
//! the entity it detects and a base confidence. Some entities get a second
//! look (Luhn for card numbers, area ranges for SSNs, Shannon entropy for
//! random-looking tokens) that adjusts or discards the match.

use async_trait::async_trait;
use regex::{Regex, RegexSet};

use crate::config::InspectionConfig;
use crate::domain::{EntityKind, Finding, Location, Span};
use crate::engine::detector::{ContentHint, Detector, DetectorError};

/// One catalogue entry.
struct EntityPattern {
    entity: EntityKind,
    pattern: &'static str,
    confidence: f64,
    /// Capture group holding the sensitive value; 0 is the whole match.
    group: usize,
}

/// Built-in catalogue. Key/value patterns capture only the value so that
/// redaction keeps the field name readable.
static ENTITY_PATTERNS: &[EntityPattern] = &[
    EntityPattern {
        entity: EntityKind::Person,
        pattern: r"\b(?:[Mm]y name is|[Nn]ame is|[Nn]amed|[Cc]alled)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z'-]+){1,2})\b",
        confidence: 0.6,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::Person,
        pattern: r"\b(?:Mr|Mrs|Ms|Miss|Dr)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z'-]+)?)\b",
        confidence: 0.55,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::Person,
        pattern: r#"(?i:"(?:full_?name|first_?name|last_?name|customer_?name|patient_?name|name)")\s*:\s*"([A-Z][a-z]+(?:\s+[A-Z][a-z'-]+){0,2})""#,
        confidence: 0.55,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::EmailAddress,
        pattern: r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        confidence: 0.7,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::PhoneNumber,
        pattern: r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
        confidence: 0.6,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::CreditCard,
        pattern: r"\b(?:\d[ -]?){12,18}\d\b",
        confidence: 0.95,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::UsSsn,
        pattern: r"\b\d{3}-\d{2}-\d{4}\b",
        confidence: 0.85,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::UsBankNumber,
        pattern: r"(?i)\b(?:account|acct|routing|bank)(?:[\s_-]?(?:number|no|num|#))?[^\d\n]{0,12}(\d{8,17})\b",
        confidence: 0.85,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::Crypto,
        pattern: r"\b(?:bc1[a-z0-9]{25,59}|[13][a-km-zA-HJ-NP-Z1-9]{25,34})\b",
        confidence: 0.9,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::Crypto,
        pattern: r"\b0x[a-fA-F0-9]{40}\b",
        confidence: 0.9,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::IpAddress,
        pattern: r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b",
        confidence: 0.45,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::ApiKey,
        pattern: r#"(?i)api[_-]?key["']?\s*[:=]\s*["']?([A-Za-z0-9_\-]{10,})"#,
        confidence: 0.9,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::ApiKey,
        pattern: r"\b(?:sk|pk|rk)-[A-Za-z0-9_\-]{16,}\b|\bAKIA[0-9A-Z]{16}\b|\bgh[pousr]_[A-Za-z0-9]{36}\b|\bxox[abpr]-[A-Za-z0-9\-]{10,}\b",
        confidence: 0.95,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::SecretKey,
        pattern: r#"(?i)secret[_-]?key["']?\s*[:=]\s*["']?([A-Za-z0-9_\-]{10,})"#,
        confidence: 0.9,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::Password,
        pattern: r#"(?i)passw(?:or)?d["']?\s*[:=]\s*["']?([^\s'"<>,}]{6,})"#,
        confidence: 0.9,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::Token,
        pattern: r#"(?i)token["']?\s*[:=]\s*["']?([A-Za-z0-9_\-.]{20,})"#,
        confidence: 0.85,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::Token,
        pattern: r"(?i)\bbearer\s+([A-Za-z0-9_\-.=~+/]{20,})",
        confidence: 0.9,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::Credential,
        pattern: r#"(?i)credential["']?\s*[:=]\s*["']?([A-Za-z0-9_\-]{10,})"#,
        confidence: 0.85,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::PrivateKey,
        pattern: r"-----BEGIN\s+(?:RSA\s+|EC\s+|DSA\s+|OPENSSH\s+)?PRIVATE\s+KEY-----",
        confidence: 0.99,
        group: 0,
    },
    EntityPattern {
        entity: EntityKind::PrivateKey,
        pattern: r#"(?i)private[_-]?key["']?\s*[:=]\s*["']?([A-Za-z0-9+/=_\-]{16,})"#,
        confidence: 0.9,
        group: 1,
    },
    EntityPattern {
        entity: EntityKind::HighEntropy,
        pattern: r"[A-Za-z0-9+/_\-]{32,}={0,2}",
        confidence: 0.6,
        group: 0,
    },
];

/// Bits per character above which a long token is treated as random.
const ENTROPY_FLOOR: f64 = 4.0;

/// Any password carried in URL userinfo is a credential in full.
const URL_PASSWORD_CONFIDENCE: f64 = 0.9;

/// Errors that can occur while compiling a regex-backed detector.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("failed to compile detection pattern: {0}")]
    RegexCompile(#[from] regex::Error),
}

struct CompiledPattern {
    entity: EntityKind,
    regex: Regex,
    confidence: f64,
    group: usize,
}

/// Regex-backed PII and secret scanner.
pub struct PatternScanner {
    prefilter: RegexSet,
    patterns: Vec<CompiledPattern>,
    min_confidence: f64,
}

impl PatternScanner {
    pub const NAME: &'static str = "pattern_scanner";

    /// Compile the catalogue entries for `entities`.
    pub fn new(
        entities: impl IntoIterator<Item = EntityKind>,
        min_confidence: f64,
    ) -> Result<Self, ScannerError> {
        let wanted: Vec<EntityKind> = entities.into_iter().collect();
        let selected: Vec<&EntityPattern> = ENTITY_PATTERNS
            .iter()
            .filter(|p| wanted.contains(&p.entity))
            .collect();

        let prefilter = RegexSet::new(selected.iter().map(|p| p.pattern))?;
        let patterns = selected
            .iter()
            .map(|p| {
                Ok(CompiledPattern {
                    entity: p.entity,
                    regex: Regex::new(p.pattern)?,
                    confidence: p.confidence,
                    group: p.group,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            prefilter,
            patterns,
            min_confidence,
        })
    }

    /// Build from the inspection allow/deny lists and confidence floor.
    pub fn from_config(config: &InspectionConfig) -> Result<Self, ScannerError> {
        Self::new(
            EntityKind::ALL
                .into_iter()
                .filter(|e| config.entity_enabled(*e)),
            config.min_confidence,
        )
    }

    /// Scan `text`, returning non-overlapping findings sorted by offset.
    ///
    /// Where matches overlap, the higher-confidence one wins.
    pub fn scan(&self, text: &str, location: &Location) -> Vec<Finding> {
        let mut candidates: Vec<(EntityKind, Span, f64)> = Vec::new();

        for idx in self.prefilter.matches(text).into_iter() {
            let pattern = &self.patterns[idx];
            for caps in pattern.regex.captures_iter(text) {
                let Some(m) = caps.get(pattern.group) else {
                    continue;
                };
                if let Some(confidence) = adjust_confidence(pattern.entity, m.as_str(), pattern.confidence) {
                    if confidence >= self.min_confidence {
                        candidates.push((pattern.entity, Span::new(m.start(), m.end()), confidence));
                    }
                }
            }
        }

        if *location == Location::url_password()
            && !text.is_empty()
            && URL_PASSWORD_CONFIDENCE >= self.min_confidence
            && self.reports(EntityKind::Password)
        {
            candidates.push((EntityKind::Password, Span::new(0, text.len()), URL_PASSWORD_CONFIDENCE));
        }

        // Strongest first, then longest, so that greedy acceptance keeps the best span.
        candidates.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.len().cmp(&a.1.len()))
        });

        let mut accepted: Vec<(EntityKind, Span, f64)> = Vec::new();
        for candidate in candidates {
            if accepted.iter().all(|a| !a.1.overlaps(&candidate.1)) {
                accepted.push(candidate);
            }
        }
        accepted.sort_by_key(|(_, span, _)| span.start);

        accepted
            .into_iter()
            .map(|(entity, span, confidence)| {
                Finding::new(
                    entity.finding_kind(),
                    entity.as_str(),
                    confidence,
                    location.clone(),
                    span,
                    Self::NAME,
                )
            })
            .collect()
    }

    fn reports(&self, entity: EntityKind) -> bool {
        self.patterns.iter().any(|p| p.entity == entity)
    }

    /// Number of compiled catalogue entries.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[async_trait]
impl Detector for PatternScanner {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn inspect(&self, content: &str, hint: &ContentHint) -> Result<Vec<Finding>, DetectorError> {
        Ok(self.scan(content, &hint.location))
    }
}

/// Second look at a raw match. `None` discards it.
fn adjust_confidence(entity: EntityKind, matched: &str, base: f64) -> Option<f64> {
    match entity {
        EntityKind::CreditCard => {
            let digits: String = matched.chars().filter(|c| c.is_ascii_digit()).collect();
            if luhn_check(&digits) {
                Some(base)
            } else {
                Some(0.4)
            }
        }
        EntityKind::UsSsn => {
            let area: u32 = matched.get(0..3)?.parse().ok()?;
            if area == 0 || area == 666 || area >= 900 {
                Some(0.4)
            } else {
                Some(base)
            }
        }
        EntityKind::HighEntropy => {
            let has_digit = matched.chars().any(|c| c.is_ascii_digit());
            let has_alpha = matched.chars().any(|c| c.is_ascii_alphabetic());
            let entropy = shannon_entropy(matched);
            if !(has_digit && has_alpha) || entropy < ENTROPY_FLOOR {
                return None;
            }
            Some((base + (entropy - ENTROPY_FLOOR) * 0.2).min(0.85))
        }
        _ => Some(base),
    }
}

/// Luhn checksum over a string of ASCII digits.
fn luhn_check(digits: &str) -> bool {
    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }
    let mut sum = 0u32;
    let mut double = false;
    for c in digits.chars().rev() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
    }
    sum % 10 == 0
}

/// Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    let mut counts = std::collections::HashMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_insert(0usize) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}
