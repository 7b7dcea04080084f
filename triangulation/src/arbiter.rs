//! Triangulation arbiter: reduce the provider responses for one unit of work
//! into a single graded consensus result.
//!
//! The arbiter is a pure function of its inputs. Responses are put into a
//! canonical order (provider priority, then provider id) before any
//! comparison, so the result does not depend on arrival order.
//!
//! | Usable responses | Agreement                  | Confidence |
//! |------------------|----------------------------|------------|
//! | 0                | -                          | UNKNOWN    |
//! | 1                | -                          | LOW        |
//! | 2..=3            | some group of >= 2 agrees  | HIGH       |
//! | > 3              | strict majority agrees     | HIGH       |
//! | >= 2             | otherwise                  | MEDIUM     |

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agreement::{agreement_matrix, DEFAULT_AGREEMENT_THRESHOLD};
use crate::confidence::ConfidenceLevel;
use crate::issues::{TaskType, UnitKey};
use crate::provider::{ProviderId, ProviderResponse};

/// Text used when no provider produced output.
pub const DEFAULT_PLACEHOLDER: &str = "No summary available.";

/// Note attached to results whose sources did not agree.
pub const DISAGREEMENT_NOTE: &str = "sources disagree";

/// How the final text was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementMethod {
    /// No usable response.
    None,
    /// Exactly one usable response.
    SingleSource,
    /// An agreeing group met the consensus threshold.
    ContentOverlap,
    /// Responses did not reach consensus; strongest single response used.
    Disagreement,
}

/// Fixed arbitration parameters, set at configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterPolicy {
    /// Minimum content-word overlap for two responses to agree.
    pub agreement_threshold: f64,
    /// Tie-break order; earlier wins. Unlisted providers rank after, by id.
    pub provider_priority: Vec<ProviderId>,
    pub placeholder_text: String,
}

impl Default for ArbiterPolicy {
    fn default() -> Self {
        Self {
            agreement_threshold: DEFAULT_AGREEMENT_THRESHOLD,
            provider_priority: Vec::new(),
            placeholder_text: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

impl ArbiterPolicy {
    pub fn with_priority(mut self, priority: Vec<ProviderId>) -> Self {
        self.provider_priority = priority;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.agreement_threshold = threshold;
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder_text = placeholder.to_string();
        self
    }

    fn rank(&self, id: &ProviderId) -> usize {
        self.provider_priority
            .iter()
            .position(|p| p == id)
            .unwrap_or(usize::MAX)
    }

    /// Agreeing-group size needed for consensus among `n` responses.
    pub fn required_group(n: usize) -> usize {
        if n <= 3 {
            2
        } else {
            n / 2 + 1
        }
    }
}

/// Consensus outcome for one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub race_id: String,
    pub task_type: TaskType,
    pub unit_key: UnitKey,
    pub final_text: String,
    pub confidence_level: ConfidenceLevel,
    pub contributing_providers: Vec<ProviderId>,
    pub agreement_method: AgreementMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ConsensusResult {
    /// Placeholder result for a unit no provider could summarize.
    pub fn unknown(race_id: &str, unit_key: UnitKey, placeholder: &str) -> Self {
        Self {
            race_id: race_id.to_string(),
            task_type: unit_key.task_type(),
            unit_key,
            final_text: placeholder.to_string(),
            confidence_level: ConfidenceLevel::Unknown,
            contributing_providers: Vec::new(),
            agreement_method: AgreementMethod::None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Contributing provider ids as plain strings.
    pub fn sources(&self) -> Vec<String> {
        self.contributing_providers
            .iter()
            .map(|p| p.to_string())
            .collect()
    }
}

/// Reduce the responses for one unit of work into a consensus result.
pub fn arbitrate(
    race_id: &str,
    unit_key: UnitKey,
    responses: &[ProviderResponse],
    policy: &ArbiterPolicy,
) -> ConsensusResult {
    let ranked = canonical_order(responses, policy);
    let n = ranked.len();

    if n == 0 {
        debug!(race_id, unit = %unit_key, "No usable responses");
        return ConsensusResult::unknown(race_id, unit_key, &policy.placeholder_text);
    }

    if n == 1 {
        let only = ranked[0];
        debug!(race_id, unit = %unit_key, provider = %only.provider_id, "Single source");
        return build(
            race_id,
            unit_key,
            only.text.clone(),
            ConfidenceLevel::Low,
            vec![only.provider_id.clone()],
            AgreementMethod::SingleSource,
        );
    }

    let texts: Vec<&str> = ranked.iter().map(|r| r.text.as_str()).collect();
    let matrix = agreement_matrix(&texts, policy.agreement_threshold);

    // Best anchor: largest group, then strongest signal, then canonical order.
    let mut best_anchor = 0usize;
    let mut best_size = 0usize;
    for (i, row) in matrix.iter().enumerate() {
        let size = row.iter().filter(|a| **a).count();
        let better = size > best_size
            || (size == best_size
                && ranked[i].confidence_signal > ranked[best_anchor].confidence_signal);
        if better {
            best_anchor = i;
            best_size = size;
        }
    }

    let required = ArbiterPolicy::required_group(n);
    if best_size >= required {
        let group: Vec<usize> = (0..n).filter(|j| matrix[best_anchor][*j]).collect();
        let chosen = strongest(&ranked, &group);
        debug!(
            race_id,
            unit = %unit_key,
            group = group.len(),
            responses = n,
            chosen = %ranked[chosen].provider_id,
            "Consensus reached"
        );
        return build(
            race_id,
            unit_key,
            ranked[chosen].text.clone(),
            ConfidenceLevel::High,
            group.iter().map(|j| ranked[*j].provider_id.clone()).collect(),
            AgreementMethod::ContentOverlap,
        );
    }

    let all: Vec<usize> = (0..n).collect();
    let chosen = strongest(&ranked, &all);
    debug!(
        race_id,
        unit = %unit_key,
        largest_group = best_size,
        required,
        chosen = %ranked[chosen].provider_id,
        "No consensus"
    );
    build(
        race_id,
        unit_key,
        ranked[chosen].text.clone(),
        ConfidenceLevel::Medium,
        vec![ranked[chosen].provider_id.clone()],
        AgreementMethod::Disagreement,
    )
    .with_note(DISAGREEMENT_NOTE)
}

/// Usable responses, one per provider, in priority order.
fn canonical_order<'a>(
    responses: &'a [ProviderResponse],
    policy: &ArbiterPolicy,
) -> Vec<&'a ProviderResponse> {
    let mut usable: Vec<&ProviderResponse> = responses.iter().filter(|r| r.is_usable()).collect();
    usable.sort_by(|a, b| {
        policy
            .rank(&a.provider_id)
            .cmp(&policy.rank(&b.provider_id))
            .then_with(|| a.provider_id.cmp(&b.provider_id))
            .then_with(|| b.confidence_signal.cmp(&a.confidence_signal))
            .then_with(|| a.text.cmp(&b.text))
    });
    usable.dedup_by(|later, earlier| later.provider_id == earlier.provider_id);
    usable
}

/// Index of the highest-signal response among `candidates`; earlier wins ties.
fn strongest(ranked: &[&ProviderResponse], candidates: &[usize]) -> usize {
    let mut best = candidates[0];
    for &i in &candidates[1..] {
        if ranked[i].confidence_signal > ranked[best].confidence_signal {
            best = i;
        }
    }
    best
}

fn build(
    race_id: &str,
    unit_key: UnitKey,
    final_text: String,
    confidence_level: ConfidenceLevel,
    contributing_providers: Vec<ProviderId>,
    agreement_method: AgreementMethod,
) -> ConsensusResult {
    ConsensusResult {
        race_id: race_id.to_string(),
        task_type: unit_key.task_type(),
        unit_key,
        final_text,
        confidence_level,
        contributing_providers,
        agreement_method,
        note: None,
    }
}
