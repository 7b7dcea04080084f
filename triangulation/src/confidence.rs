//! Confidence levels and local response scoring.
//!
//! The local signal is a deterministic function of response text only. It
//! is advisory input to the arbiter; the final grade attached to a
//! consensus result is derived from provider count and agreement.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Four-value confidence grade. Ordered `Unknown < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn all() -> &'static [ConfidenceLevel] {
        &[Self::High, Self::Medium, Self::Low, Self::Unknown]
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Below this many characters a response carries no usable signal.
pub const MIN_RESPONSE_CHARS: usize = 40;

/// Responses shorter than this are graded `Low`.
pub const NEAR_MIN_RESPONSE_CHARS: usize = 150;

/// Responses must exceed this length to be graded `High`.
pub const HIGH_RESPONSE_CHARS: usize = 400;

static HEDGING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(unclear|uncertain|unknown|insufficient|possibly|perhaps|unverified|speculat\w*|limited information|not enough information|no (?:clear|specific|public) (?:information|position|stance|record)|could not (?:find|determine|verify)|cannot (?:be )?(?:determined?|verified?)|it is (?:difficult|hard|not possible) to (?:say|determine|tell))\b",
    )
    .expect("HEDGING_RE regex should compile")
});

static EVIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\baccording to\b|\bvoted (?:for|against|to)\b|\b(?:co-?)?sponsored\b|\bintroduced\b|\bsigned\b|\bpledged\b|\bstated\b|\bsaid in\b|\bwrote\b|\bannounced\b|\bcampaign (?:website|site)\b|\bpress release\b|\binterview\b|\[source \d+\]|\bsource \d+\b)",
    )
    .expect("EVIDENCE_RE regex should compile")
});

/// Whether the text contains hedging or uncertainty markers.
pub fn has_hedging(text: &str) -> bool {
    HEDGING_RE.is_match(text)
}

/// Whether the text contains citation-like or evidentiary phrasing.
pub fn has_evidence(text: &str) -> bool {
    EVIDENCE_RE.is_match(text)
}

/// Grade a raw provider response.
///
/// - `Unknown`: empty or shorter than [`MIN_RESPONSE_CHARS`]
/// - `Low`: hedging markers, or shorter than [`NEAR_MIN_RESPONSE_CHARS`]
/// - `High`: longer than [`HIGH_RESPONSE_CHARS`] with evidentiary phrasing
/// - `Medium`: everything else
pub fn score_response(text: &str) -> ConfidenceLevel {
    let trimmed = text.trim();
    let len = trimmed.chars().count();

    if len < MIN_RESPONSE_CHARS {
        return ConfidenceLevel::Unknown;
    }
    if len < NEAR_MIN_RESPONSE_CHARS || has_hedging(trimmed) {
        return ConfidenceLevel::Low;
    }
    if len > HIGH_RESPONSE_CHARS && has_evidence(trimmed) {
        return ConfidenceLevel::High;
    }
    ConfidenceLevel::Medium
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(base: &str, target: usize) -> String {
        let mut s = base.to_string();
        while s.chars().count() <= target {
            s.push_str(" The candidate has discussed this topic at several town halls.");
        }
        s
    }

    #[test]
    fn test_empty_and_short_are_unknown() {
        assert_eq!(score_response(""), ConfidenceLevel::Unknown);
        assert_eq!(score_response("   \n"), ConfidenceLevel::Unknown);
        assert_eq!(score_response("Supports it."), ConfidenceLevel::Unknown);
    }

    #[test]
    fn test_near_minimum_is_low() {
        let text = "The candidate supports a public option for health insurance.";
        assert!(text.len() >= MIN_RESPONSE_CHARS && text.len() < NEAR_MIN_RESPONSE_CHARS);
        assert_eq!(score_response(text), ConfidenceLevel::Low);
    }

    #[test]
    fn test_hedging_is_low_regardless_of_length() {
        let text = padded(
            "According to one report the position is unclear and may have shifted.",
            HIGH_RESPONSE_CHARS,
        );
        assert_eq!(score_response(&text), ConfidenceLevel::Low);
    }

    #[test]
    fn test_long_with_evidence_is_high() {
        let text = padded(
            "According to her campaign website, she supports a public option and voted for the 2023 expansion bill.",
            HIGH_RESPONSE_CHARS,
        );
        assert_eq!(score_response(&text), ConfidenceLevel::High);
    }

    #[test]
    fn test_long_without_evidence_is_medium() {
        let text = padded("She supports a public option.", HIGH_RESPONSE_CHARS);
        assert!(!has_evidence(&text));
        assert_eq!(score_response(&text), ConfidenceLevel::Medium);
    }

    #[test]
    fn test_level_ordering_and_display() {
        assert!(ConfidenceLevel::Unknown < ConfidenceLevel::Low);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::High.to_string(), "HIGH");
        assert_eq!(
            serde_json::to_string(&ConfidenceLevel::Unknown).unwrap(),
            "\"UNKNOWN\""
        );
    }
}
