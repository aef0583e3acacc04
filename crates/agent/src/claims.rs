//! Fake-claim detection.
//!
//! A model without a working web search will still happily write "after
//! searching, I found...". These phrase patterns flag text that asserts an
//! internet lookup took place, so the turn engine can compare the claim
//! against what the ledger actually recorded.
//!
//! The built-in list is deliberately small and phrase-based; it misses
//! rephrased claims. Deployments extend it through
//! `[truthfulness] extra_claim_patterns`.

use regex_lite::Regex;
use std::sync::LazyLock;

/// Case-insensitive phrases asserting that an internet lookup happened.
pub const DEFAULT_CLAIM_PATTERNS: &[&str] = &[
    r"(?i)\bafter searching\b",
    r"(?i)\bI looked (?:it|this|that) up\b",
    r"(?i)\bI searched (?:the web|online|the internet)\b",
    r"(?i)\baccording to (?:my|a|the) (?:web |online |internet )?search\b",
    r"(?i)\bI found (?:\w+ )?online\b",
    r"(?i)\bsearch results (?:show|indicate|suggest|say)\b",
    r"(?i)\bbased on my (?:web |online |internet )?search\b",
];

static DEFAULT_DETECTOR: LazyLock<FakeClaimDetector> = LazyLock::new(|| {
    FakeClaimDetector {
        patterns: DEFAULT_CLAIM_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok().map(|re| (p.to_string(), re)))
            .collect(),
    }
});

/// A set of compiled claim patterns.
#[derive(Debug, Clone)]
pub struct FakeClaimDetector {
    patterns: Vec<(String, Regex)>,
}

impl FakeClaimDetector {
    /// The built-in pattern set.
    pub fn standard() -> Self {
        DEFAULT_DETECTOR.clone()
    }

    /// The built-in set plus `extra` patterns, matched case-insensitively.
    pub fn with_extra(extra: &[String]) -> Result<Self, regex_lite::Error> {
        let mut detector = Self::standard();
        for pattern in extra {
            let source = if pattern.starts_with("(?i)") {
                pattern.clone()
            } else {
                format!("(?i){pattern}")
            };
            let re = Regex::new(&source)?;
            detector.patterns.push((source, re));
        }
        Ok(detector)
    }

    /// The first pattern that matches, if any.
    ///
    /// Empty and whitespace-only text never matches.
    pub fn detect(&self, text: &str) -> Option<&str> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(source, _)| source.as_str())
    }

    pub fn has_fake_claim(&self, text: &str) -> bool {
        self.detect(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for FakeClaimDetector {
    fn default() -> Self {
        Self::standard()
    }
}

/// Check `text` against the built-in patterns.
pub fn has_fake_claim(text: &str) -> bool {
    DEFAULT_DETECTOR.has_fake_claim(text)
}
