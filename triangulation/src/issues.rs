//! Canonical issue set and units of work.
//!
//! Every candidate's positions are organized under the same 11 issues, in the
//! same order, for every race. A unit of work is one race overview, one
//! candidate, or one candidate×issue pair.

use serde::{Deserialize, Serialize};

/// One of the fixed topic categories a candidate stance is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalIssue {
    #[serde(rename = "Healthcare")]
    Healthcare,
    #[serde(rename = "Economy")]
    Economy,
    #[serde(rename = "Climate/Energy")]
    ClimateEnergy,
    #[serde(rename = "Reproductive Rights")]
    ReproductiveRights,
    #[serde(rename = "Immigration")]
    Immigration,
    #[serde(rename = "Guns & Safety")]
    GunsSafety,
    #[serde(rename = "Foreign Policy")]
    ForeignPolicy,
    #[serde(rename = "Social Justice")]
    SocialJustice,
    #[serde(rename = "Education")]
    Education,
    #[serde(rename = "Tech & AI")]
    TechAi,
    #[serde(rename = "Election Reform")]
    ElectionReform,
}

impl CanonicalIssue {
    /// All issues in canonical order.
    pub fn all() -> &'static [CanonicalIssue] {
        &[
            CanonicalIssue::Healthcare,
            CanonicalIssue::Economy,
            CanonicalIssue::ClimateEnergy,
            CanonicalIssue::ReproductiveRights,
            CanonicalIssue::Immigration,
            CanonicalIssue::GunsSafety,
            CanonicalIssue::ForeignPolicy,
            CanonicalIssue::SocialJustice,
            CanonicalIssue::Education,
            CanonicalIssue::TechAi,
            CanonicalIssue::ElectionReform,
        ]
    }

    /// Display name, identical to the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Healthcare => "Healthcare",
            Self::Economy => "Economy",
            Self::ClimateEnergy => "Climate/Energy",
            Self::ReproductiveRights => "Reproductive Rights",
            Self::Immigration => "Immigration",
            Self::GunsSafety => "Guns & Safety",
            Self::ForeignPolicy => "Foreign Policy",
            Self::SocialJustice => "Social Justice",
            Self::Education => "Education",
            Self::TechAi => "Tech & AI",
            Self::ElectionReform => "Election Reform",
        }
    }

    /// Extra retrieval terms used alongside the issue name.
    pub fn search_terms(&self) -> &'static str {
        match self {
            Self::Healthcare => "health care insurance medicare medicaid public option",
            Self::Economy => "economy jobs taxes inflation wages budget",
            Self::ClimateEnergy => "climate energy emissions oil gas renewable",
            Self::ReproductiveRights => "abortion reproductive rights roe contraception",
            Self::Immigration => "immigration border asylum citizenship",
            Self::GunsSafety => "guns firearms background checks public safety police",
            Self::ForeignPolicy => "foreign policy military ukraine israel china trade",
            Self::SocialJustice => "civil rights equality justice discrimination",
            Self::Education => "education schools teachers student loans",
            Self::TechAi => "technology artificial intelligence privacy broadband",
            Self::ElectionReform => "elections voting rights campaign finance",
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|i| i.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for CanonicalIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of summarization task. Selects the prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    RaceSummary,
    CandidateSummary,
    IssueStance,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RaceSummary => write!(f, "race_summary"),
            Self::CandidateSummary => write!(f, "candidate_summary"),
            Self::IssueStance => write!(f, "issue_stance"),
        }
    }
}

/// Identity of one unit of work inside a race.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitKey {
    RaceOverview,
    Candidate { name: String },
    CandidateIssue { name: String, issue: CanonicalIssue },
}

impl UnitKey {
    /// Task type implied by the unit.
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::RaceOverview => TaskType::RaceSummary,
            Self::Candidate { .. } => TaskType::CandidateSummary,
            Self::CandidateIssue { .. } => TaskType::IssueStance,
        }
    }

    /// Candidate name, if the unit is candidate-scoped.
    pub fn candidate(&self) -> Option<&str> {
        match self {
            Self::RaceOverview => None,
            Self::Candidate { name } | Self::CandidateIssue { name, .. } => Some(name),
        }
    }

    /// Issue, if the unit is a candidate×issue pair.
    pub fn issue(&self) -> Option<CanonicalIssue> {
        match self {
            Self::CandidateIssue { issue, .. } => Some(*issue),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RaceOverview => write!(f, "overview"),
            Self::Candidate { name } => write!(f, "candidate:{name}"),
            Self::CandidateIssue { name, issue } => write!(f, "candidate:{name}/issue:{issue}"),
        }
    }
}
