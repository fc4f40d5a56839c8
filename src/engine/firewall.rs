//! Keyword injection detector - known prompt-injection phrasing.
//!
//! Deterministic companion to the generative classifier. Phrases that only
//! make sense as an attack score high; phrases that also show up in benign
//! text (role play, transcripts) score low and are left to the threshold.

use async_trait::async_trait;
use regex::Regex;

use crate::domain::{Finding, FindingKind, Span};
use crate::engine::detector::{ContentHint, Detector, DetectorError};
use crate::engine::scanner::ScannerError;

/// Confidence for phrases that are unambiguous override attempts.
const STRONG: f64 = 0.9;
/// Confidence for phrases that are suspicious only in context.
const WEAK: f64 = 0.5;

static INJECTION_PHRASES: &[(&str, &str, f64)] = &[
    ("ignore_previous", r"(?i)ignore\s+(?:all\s+)?(?:the\s+)?previous(?:\s+instructions?)?", STRONG),
    ("disregard_previous", r"(?i)disregard\s+(?:all\s+)?(?:prior|previous|above|your\s+instructions)", STRONG),
    ("forget_everything", r"(?i)forget\s+everything", STRONG),
    ("new_instructions", r"(?i)new\s+instructions?\s*:?", STRONG),
    ("you_are_now", r"(?i)you\s+are\s+now\b", STRONG),
    ("jailbreak", r"(?i)\bjailbreak|\bDAN\s+mode\b", STRONG),
    ("reveal_prompt", r"(?i)(?:reveal|print|show|output)\s+(?:your\s+|the\s+)?system\s+prompt", STRONG),
    ("override", r"(?i)\boverride\b", WEAK),
    ("bypass", r"(?i)\bbypass\b", WEAK),
    ("role_marker", r"(?im)^\s*(?:system|assistant|user)\s*:", WEAK),
    ("act_as_if", r"(?i)act\s+as\s+if", WEAK),
    ("pretend_to_be", r"(?i)pretend\s+to\s+be", WEAK),
    ("roleplay", r"(?i)\brole[\s-]?play", WEAK),
    ("simulate", r"(?i)\bsimulate\b", WEAK),
];

/// Regex phrase matcher producing INJECTION findings.
pub struct KeywordInjectionDetector {
    phrases: Vec<(&'static str, Regex, f64)>,
    /// Operator-supplied extra phrases, matched case-insensitively.
    extra: Vec<String>,
}

impl KeywordInjectionDetector {
    pub const NAME: &'static str = "keyword_injection";

    /// Compile the built-in phrases plus `extra_keywords`.
    pub fn new(extra_keywords: Vec<String>) -> Result<Self, ScannerError> {
        let phrases = INJECTION_PHRASES
            .iter()
            .map(|(name, pattern, confidence)| Ok((*name, Regex::new(pattern)?, *confidence)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            phrases,
            extra: extra_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }

    /// Scan `text` for injection phrasing.
    pub fn scan(&self, text: &str, hint: &ContentHint) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (name, regex, confidence) in &self.phrases {
            for m in regex.find_iter(text) {
                findings.push(self.finding(name, *confidence, hint, Span::new(m.start(), m.end())));
            }
        }

        if !self.extra.is_empty() {
            // Lowercasing ASCII keeps byte offsets; non-ASCII text is matched
            // without offsets rather than risking a bad span.
            let lowered = text.to_lowercase();
            let offsets_valid = lowered.len() == text.len();
            for keyword in &self.extra {
                for (start, _) in lowered.match_indices(keyword.as_str()) {
                    let span = if offsets_valid {
                        Span::new(start, start + keyword.len())
                    } else {
                        Span::new(0, 0)
                    };
                    findings.push(self.finding(keyword, STRONG, hint, span));
                }
            }
        }

        findings.sort_by_key(|f| f.span.start);
        findings
    }

    fn finding(&self, label: &str, confidence: f64, hint: &ContentHint, span: Span) -> Finding {
        Finding::new(
            FindingKind::Injection,
            label,
            confidence,
            hint.location.clone(),
            span,
            Self::NAME,
        )
    }
}

#[async_trait]
impl Detector for KeywordInjectionDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn inspect(&self, content: &str, hint: &ContentHint) -> Result<Vec<Finding>, DetectorError> {
        Ok(self.scan(content, hint))
    }
}
