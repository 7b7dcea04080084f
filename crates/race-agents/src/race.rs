//! Race input specification and the race-level output artifact.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use triangulation::{CanonicalIssue, ConfidenceLevel, ConsensusResult, ProviderId, UnitKey};

/// One candidate in a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub incumbent: bool,
}

/// A race to summarize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSpec {
    pub race_id: String,
    pub title: String,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub election_date: Option<String>,
    pub candidates: Vec<CandidateSpec>,
}

impl RaceSpec {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read race spec {}", path.display()))?;
        let spec: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse race spec {}", path.display()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.race_id.trim().is_empty() {
            anyhow::bail!("race_id must not be empty");
        }
        let mut seen = std::collections::HashSet::new();
        for c in &self.candidates {
            if c.name.trim().is_empty() {
                anyhow::bail!("candidate name must not be empty");
            }
            if !seen.insert(c.name.as_str()) {
                anyhow::bail!("duplicate candidate '{}'", c.name);
            }
        }
        Ok(())
    }

    /// Every unit of work: overview, each candidate, each candidate×issue.
    pub fn units(&self) -> Vec<UnitKey> {
        let mut units = vec![UnitKey::RaceOverview];
        for c in &self.candidates {
            units.push(UnitKey::Candidate {
                name: c.name.clone(),
            });
        }
        for c in &self.candidates {
            for issue in CanonicalIssue::all() {
                units.push(UnitKey::CandidateIssue {
                    name: c.name.clone(),
                    issue: *issue,
                });
            }
        }
        units
    }
}

/// Stance on one canonical issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueStance {
    pub stance: String,
    pub confidence: ConfidenceLevel,
    /// Contributing provider ids.
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&ConsensusResult> for IssueStance {
    fn from(result: &ConsensusResult) -> Self {
        Self {
            stance: result.final_text.clone(),
            confidence: result.confidence_level,
            sources: result.sources(),
            note: result.note.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    pub incumbent: bool,
    pub summary: ConsensusResult,
    /// All canonical issues, in canonical order.
    pub issues: BTreeMap<CanonicalIssue, IssueStance>,
}

/// Race-level artifact handed to publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSummary {
    pub run_id: String,
    pub race_id: String,
    pub title: String,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub election_date: Option<String>,
    /// Enabled provider ids.
    pub generators: Vec<ProviderId>,
    pub summary: ConsensusResult,
    pub candidates: Vec<CandidateSummary>,
    pub overall_confidence: ConfidenceLevel,
    pub generated_at: DateTime<Utc>,
}

impl RaceSummary {
    /// Assemble the artifact. Units missing from `results` become UNKNOWN.
    pub fn assemble(
        race: &RaceSpec,
        run_id: &str,
        generators: Vec<ProviderId>,
        mut results: HashMap<UnitKey, ConsensusResult>,
        placeholder: &str,
    ) -> Self {
        let mut take = |unit: UnitKey| {
            results
                .remove(&unit)
                .unwrap_or_else(|| ConsensusResult::unknown(&race.race_id, unit, placeholder))
        };

        let summary = take(UnitKey::RaceOverview);
        let candidates = race
            .candidates
            .iter()
            .map(|c| {
                let summary = take(UnitKey::Candidate {
                    name: c.name.clone(),
                });
                let issues = CanonicalIssue::all()
                    .iter()
                    .map(|issue| {
                        let result = take(UnitKey::CandidateIssue {
                            name: c.name.clone(),
                            issue: *issue,
                        });
                        (*issue, IssueStance::from(&result))
                    })
                    .collect();
                CandidateSummary {
                    name: c.name.clone(),
                    party: c.party.clone(),
                    incumbent: c.incumbent,
                    summary,
                    issues,
                }
            })
            .collect::<Vec<_>>();

        let overall_confidence = modal_confidence(
            candidates
                .iter()
                .flat_map(|c| c.issues.values().map(|s| s.confidence)),
        );

        Self {
            run_id: run_id.to_string(),
            race_id: race.race_id.clone(),
            title: race.title.clone(),
            office: race.office.clone(),
            jurisdiction: race.jurisdiction.clone(),
            election_date: race.election_date.clone(),
            generators,
            summary,
            candidates,
            overall_confidence,
            generated_at: Utc::now(),
        }
    }

    pub fn candidate(&self, name: &str) -> Option<&CandidateSummary> {
        self.candidates.iter().find(|c| c.name == name)
    }
}

/// Most frequent level; ties resolve toward the lower level. Empty is UNKNOWN.
pub fn modal_confidence(levels: impl IntoIterator<Item = ConfidenceLevel>) -> ConfidenceLevel {
    let mut counts: BTreeMap<ConfidenceLevel, usize> = BTreeMap::new();
    for level in levels {
        *counts.entry(level).or_default() += 1;
    }
    // BTreeMap iterates lowest level first, so the first maximum wins ties.
    let mut best = ConfidenceLevel::Unknown;
    let mut best_count = 0;
    for (level, count) in counts {
        if count > best_count {
            best = level;
            best_count = count;
        }
    }
    best
}
