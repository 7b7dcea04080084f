//! Content fragments: the atomic, deduplicated unit of source text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Website,
    News,
    Government,
    SocialMedia,
    Pdf,
    Other,
}

/// An immutable unit of extracted source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFragment {
    pub source_url: String,
    pub source_type: SourceType,
    pub text: String,
    /// Stable hash of the normalized text. Unique per race.
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default = "default_language")]
    pub language: String,
    /// Relevance score assigned upstream (0.0–1.0).
    #[serde(default)]
    pub usefulness_score: f32,
    #[serde(default)]
    pub extraction_method: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_language() -> String {
    "en".to_string()
}

impl ContentFragment {
    /// Build a fragment with checksum and word count derived from `text`.
    pub fn new(source_url: &str, source_type: SourceType, text: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            source_type,
            text: text.to_string(),
            checksum: checksum(text),
            word_count: text.split_whitespace().count(),
            language: default_language(),
            usefulness_score: 0.5,
            extraction_method: "plain_text".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_usefulness(mut self, score: f32) -> Self {
        self.usefulness_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn with_extraction_method(mut self, method: &str) -> Self {
        self.extraction_method = method.to_string();
        self
    }

    /// Recompute derived fields, keeping the record otherwise untouched.
    ///
    /// A supplied checksum that disagrees with the text is replaced.
    pub fn validated(mut self) -> Self {
        let computed = checksum(&self.text);
        if !self.checksum.is_empty() && self.checksum != computed {
            warn!(
                source_url = %self.source_url,
                supplied = %self.checksum,
                computed = %computed,
                "Fragment checksum mismatch, using computed value"
            );
        }
        self.checksum = computed;
        if self.word_count == 0 {
            self.word_count = self.text.split_whitespace().count();
        }
        self.usefulness_score = self.usefulness_score.clamp(0.0, 1.0);
        self
    }

    /// Character length of the text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable blake3 hash of the normalized text, hex encoded.
pub fn checksum(text: &str) -> String {
    blake3::hash(normalize_text(text).as_bytes())
        .to_hex()
        .to_string()
}
