//! Prompt templates for each summarization task.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever template content changes,
//! so a published summary can be traced back to the wording that produced it.

use triangulation::{RetrievedContext, TaskType, UnitKey};

use crate::race::RaceSpec;

/// Prompt version. Bump on any template content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Shared system preamble for every task.
pub const SYSTEM_PREAMBLE: &str = "\
You are a nonpartisan election analyst. You summarize what candidates have said \
and done, using only the numbered sources you are given.

## Rules
- Do not rank, endorse, or recommend any candidate.
- Do not fact-check claims; report positions as stated.
- Cite sources inline as [Source N] when a statement relies on one.
- If the sources do not establish a position, say so plainly instead of guessing.";

const RACE_SUMMARY_TEMPLATE: &str = "\
Write a neutral overview of the race below in 2-3 short paragraphs. Cover the \
office at stake, the candidates, and the main themes of the campaign.

## Race
{race}

## Sources
{sources}";

const CANDIDATE_SUMMARY_TEMPLATE: &str = "\
Write a neutral profile of {candidate} in one paragraph: background, current \
role, and the priorities their campaign emphasizes.

## Race
{race}

## Sources
{sources}";

const ISSUE_STANCE_TEMPLATE: &str = "\
State {candidate}'s position on {issue} in 2-4 sentences. Begin with whether \
they support or oppose the main proposals under discussion, then give specifics \
such as votes, bills, or public statements.

## Race
{race}

## Sources
{sources}";

const NO_SOURCES: &str = "(no sources available for this topic)";

/// System and user text for one provider request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Template keyed by task type.
pub fn template(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::RaceSummary => RACE_SUMMARY_TEMPLATE,
        TaskType::CandidateSummary => CANDIDATE_SUMMARY_TEMPLATE,
        TaskType::IssueStance => ISSUE_STANCE_TEMPLATE,
    }
}

/// Render the prompt for one unit of work against its retrieved context.
pub fn render(unit: &UnitKey, race: &RaceSpec, context: &RetrievedContext) -> RenderedPrompt {
    let sources = if context.is_empty() {
        NO_SOURCES.to_string()
    } else {
        context.render().trim_end().to_string()
    };
    let candidate = unit.candidate().map(|name| candidate_label(race, name));
    let issue = unit.issue().map(|i| i.name()).unwrap_or_default();

    let user = template(unit.task_type())
        .replace("{race}", &race_header(race))
        .replace("{candidate}", candidate.as_deref().unwrap_or_default())
        .replace("{issue}", issue)
        .replace("{sources}", &sources);

    RenderedPrompt {
        system: SYSTEM_PREAMBLE.to_string(),
        user,
    }
}

/// Retrieval hint for a unit: the words most likely to match relevant fragments.
pub fn topic_hint(unit: &UnitKey, race: &RaceSpec) -> String {
    match unit {
        UnitKey::RaceOverview => {
            let mut parts = vec![race.title.clone()];
            parts.extend(race.office.clone());
            parts.extend(race.candidates.iter().map(|c| c.name.clone()));
            parts.join(" ")
        }
        UnitKey::Candidate { name } => {
            let party = race
                .candidates
                .iter()
                .find(|c| &c.name == name)
                .and_then(|c| c.party.clone())
                .unwrap_or_default();
            format!("{name} {party} background career priorities")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        }
        UnitKey::CandidateIssue { name, issue } => {
            format!("{name} {} {}", issue.name(), issue.search_terms())
        }
    }
}

fn race_header(race: &RaceSpec) -> String {
    let mut lines = vec![format!("Title: {}", race.title)];
    if let Some(office) = &race.office {
        lines.push(format!("Office: {office}"));
    }
    if let Some(jurisdiction) = &race.jurisdiction {
        lines.push(format!("Jurisdiction: {jurisdiction}"));
    }
    if let Some(date) = &race.election_date {
        lines.push(format!("Election date: {date}"));
    }
    let candidates = race
        .candidates
        .iter()
        .map(|c| match &c.party {
            Some(party) => format!("{} ({party})", c.name),
            None => c.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("Candidates: {candidates}"));
    lines.join("\n")
}

fn candidate_label(race: &RaceSpec, name: &str) -> String {
    match race.candidates.iter().find(|c| c.name == name) {
        Some(c) if c.incumbent => format!("{name} (incumbent)"),
        _ => name.to_string(),
    }
}
