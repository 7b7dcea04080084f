//! Pairwise semantic agreement between provider responses.
//!
//! Two texts agree when their content-word sets overlap enough (Jaccard)
//! and they do not take opposite sides on the stance they describe.
//!
//! ```text
//! "She supports a public option"      {supports, public, option}
//! "Backs a public option for all"     {backs, public, option}
//!                                     jaccard = 2/4 = 0.50, both Support
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::corpus::embedding::tokenize;

/// Default Jaccard threshold for two responses to count as agreeing.
pub const DEFAULT_AGREEMENT_THRESHOLD: f64 = 0.30;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "are", "was", "were", "has", "have",
    "had", "their", "they", "them", "she", "her", "his", "him", "its", "not", "but", "also",
    "which", "who", "whom", "been", "being", "will", "would", "should", "could", "can", "into",
    "about", "over", "such", "than", "then", "these", "those", "there", "what", "when", "where",
    "while", "more", "most", "some", "any", "all", "our", "out", "on", "candidate", "position",
    "positions", "stance", "issue", "race",
];

static OPPOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:(?:does|do|did) not|doesn't|don't|didn't|never|won't|will not|would not|refuses? to) (?:support|back|favor|endorse)\w*|oppos\w*|against|rejects?|rejected|repeal\w*|abolish\w*|criticiz\w*|voted no)\b(?:\s+(?:to|on|any|further|the|a|an|efforts? to|plans? to|attempts? to)\b)*(?:\s+\w+)?",
    )
    .expect("OPPOSE_RE regex should compile")
});

static SUPPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:support\w*|backs?|backed|favou?rs?|favou?red|in favou?r of|endors\w*|champion\w*|advocat\w*|expand\w*|protect\w*|voted for|voted yes)\b",
    )
    .expect("SUPPORT_RE regex should compile")
});

/// Coarse stance direction detected in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StancePolarity {
    Support,
    Oppose,
    Neutral,
}

impl StancePolarity {
    /// Support vs oppose. Neutral never conflicts.
    pub fn conflicts_with(self, other: StancePolarity) -> bool {
        matches!(
            (self, other),
            (Self::Support, Self::Oppose) | (Self::Oppose, Self::Support)
        )
    }
}

/// Detect the dominant stance direction of a text.
///
/// Negated support ("does not support") counts as opposition. Each oppose
/// cue also swallows the word it governs, so "opposes expanding" is not
/// read as support for expanding, and matches are removed before support
/// cues are counted.
pub fn detect_polarity(text: &str) -> StancePolarity {
    let oppose = OPPOSE_RE.find_iter(text).count();
    let remainder = OPPOSE_RE.replace_all(text, " ");
    let support = SUPPORT_RE.find_iter(&remainder).count();

    match support.cmp(&oppose) {
        std::cmp::Ordering::Greater => StancePolarity::Support,
        std::cmp::Ordering::Less => StancePolarity::Oppose,
        std::cmp::Ordering::Equal => StancePolarity::Neutral,
    }
}

/// Normalized content words: lowercased, stopwords and short tokens removed.
pub fn content_words(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Jaccard similarity of two word sets. Zero when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Agreement assessment for one pair of responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairAgreement {
    pub overlap: f64,
    pub polarity_conflict: bool,
}

impl PairAgreement {
    pub fn agrees(&self, threshold: f64) -> bool {
        !self.polarity_conflict && self.overlap >= threshold
    }
}

/// Pre-processed response text for repeated pairwise comparison.
#[derive(Debug, Clone)]
pub struct AgreementProfile {
    words: BTreeSet<String>,
    polarity: StancePolarity,
}

impl AgreementProfile {
    pub fn new(text: &str) -> Self {
        Self {
            words: content_words(text),
            polarity: detect_polarity(text),
        }
    }

    pub fn polarity(&self) -> StancePolarity {
        self.polarity
    }

    pub fn compare(&self, other: &AgreementProfile) -> PairAgreement {
        PairAgreement {
            overlap: jaccard(&self.words, &other.words),
            polarity_conflict: self.polarity.conflicts_with(other.polarity),
        }
    }
}

/// Assess a single pair of texts.
pub fn assess(a: &str, b: &str) -> PairAgreement {
    AgreementProfile::new(a).compare(&AgreementProfile::new(b))
}

/// Symmetric agreement matrix. The diagonal is always `true`.
pub fn agreement_matrix(texts: &[&str], threshold: f64) -> Vec<Vec<bool>> {
    let profiles: Vec<AgreementProfile> = texts.iter().map(|t| AgreementProfile::new(t)).collect();
    let n = profiles.len();
    let mut matrix = vec![vec![false; n]; n];
    for i in 0..n {
        matrix[i][i] = true;
        for j in (i + 1)..n {
            let agree = profiles[i].compare(&profiles[j]).agrees(threshold);
            matrix[i][j] = agree;
            matrix[j][i] = agree;
        }
    }
    matrix
}
