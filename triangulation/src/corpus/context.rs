//! Retrieval requests and character-budgeted retrieval results.

use serde::{Deserialize, Serialize};

use super::fragment::ContentFragment;

/// A retrieval request. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusQuery {
    pub race_id: String,
    pub topic_hint: String,
    /// Maximum number of fragments to return.
    pub k: usize,
}

impl CorpusQuery {
    pub fn new(race_id: &str, topic_hint: &str, k: usize) -> Self {
        Self {
            race_id: race_id.to_string(),
            topic_hint: topic_hint.to_string(),
            k,
        }
    }
}

/// A fragment with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    pub fragment: ContentFragment,
    pub score: f32,
}

/// Ordered fragments, most relevant first, within a character budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub fragments: Vec<ScoredFragment>,
    /// Budget the context was trimmed to.
    pub max_chars: usize,
    /// Fragments dropped to respect the budget.
    pub dropped: usize,
}

impl RetrievedContext {
    /// Empty context. Legitimate when a race has no indexed content.
    pub fn empty(max_chars: usize) -> Self {
        Self {
            fragments: Vec::new(),
            max_chars,
            dropped: 0,
        }
    }

    /// Build from ranked fragments, dropping the lowest-ranked ones until the
    /// total text length fits `max_chars`.
    pub fn from_ranked(mut ranked: Vec<ScoredFragment>, max_chars: usize) -> Self {
        let mut dropped = 0;
        while total_chars(&ranked) > max_chars {
            ranked.pop();
            dropped += 1;
        }
        Self {
            fragments: ranked,
            max_chars,
            dropped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Total characters of fragment text.
    pub fn total_chars(&self) -> usize {
        total_chars(&self.fragments)
    }

    /// Distinct source URLs in rank order.
    pub fn source_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for f in &self.fragments {
            if !urls.contains(&f.fragment.source_url) {
                urls.push(f.fragment.source_url.clone());
            }
        }
        urls
    }

    /// Render fragments as numbered source blocks for prompt templates.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, f) in self.fragments.iter().enumerate() {
            out.push_str(&format!(
                "[Source {}] {}\n{}\n\n",
                i + 1,
                f.fragment.source_url,
                f.fragment.text.trim()
            ));
        }
        out
    }
}

fn total_chars(fragments: &[ScoredFragment]) -> usize {
    fragments.iter().map(|f| f.fragment.char_len()).sum()
}
