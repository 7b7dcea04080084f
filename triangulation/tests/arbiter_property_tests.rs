//! Arbiter property tests: invariants checked over every permutation and
//! subset of a fixed response pool.
//!
//! Tests verify:
//! - Contributing providers never exceed successful responses
//! - Output is invariant under input permutation
//! - Confidence depends only on response count and agreement
//! - Every contributor actually returned usable text

use chrono::Utc;
use triangulation::{
    arbitrate, AgreementMethod, ArbiterPolicy, CanonicalIssue, ConfidenceLevel, ProviderId,
    ProviderResponse, TaskType, UnitKey,
};

const POOL: &[(&str, &str, ConfidenceLevel)] = &[
    (
        "openai",
        "Supports a public option for health insurance and capping insulin costs.",
        ConfidenceLevel::Medium,
    ),
    (
        "anthropic",
        "She supports a public option for health insurance and capping insulin costs.",
        ConfidenceLevel::High,
    ),
    (
        "gemini",
        "Opposes a public option for health insurance, citing insulin costs.",
        ConfidenceLevel::Medium,
    ),
    (
        "xai",
        "Focuses on tariffs, steel manufacturing, and trade enforcement.",
        ConfidenceLevel::Low,
    ),
    ("mistral", "", ConfidenceLevel::Unknown),
];

fn response(provider: &str, text: &str, signal: ConfidenceLevel) -> ProviderResponse {
    ProviderResponse {
        provider_id: ProviderId::new(provider),
        race_id: "mo-senate-2024".into(),
        task_type: TaskType::IssueStance,
        text: text.into(),
        confidence_signal: signal,
        token_usage: Default::default(),
        latency_ms: 0,
        timestamp: Utc::now(),
        extensions: serde_json::Value::Null,
    }
}

fn unit() -> UnitKey {
    UnitKey::CandidateIssue {
        name: "Jane Doe".into(),
        issue: CanonicalIssue::Healthcare,
    }
}

fn policy() -> ArbiterPolicy {
    ArbiterPolicy::default().with_priority(
        ["anthropic", "openai", "gemini", "xai"]
            .into_iter()
            .map(ProviderId::new)
            .collect(),
    )
}

/// All non-empty subsets of the pool, as index lists.
fn subsets() -> Vec<Vec<usize>> {
    (1u32..(1 << POOL.len()))
        .map(|mask| (0..POOL.len()).filter(|i| mask & (1 << i) != 0).collect())
        .collect()
}

fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head);
            out.push(tail);
        }
    }
    out
}

fn build(indices: &[usize]) -> Vec<ProviderResponse> {
    indices
        .iter()
        .map(|&i| response(POOL[i].0, POOL[i].1, POOL[i].2))
        .collect()
}

// ── Property: contributors bounded by successful responses ─────────

#[test]
fn prop_contributors_never_exceed_successes() {
    for subset in subsets() {
        let responses = build(&subset);
        let successes = responses.iter().filter(|r| !r.text.trim().is_empty()).count();
        let result = arbitrate("mo-senate-2024", unit(), &responses, &policy());
        assert!(
            result.contributing_providers.len() <= successes,
            "subset {subset:?}"
        );
    }
}

// ── Property: contributors all returned usable text ────────────────

#[test]
fn prop_contributors_are_successful_providers() {
    for subset in subsets() {
        let responses = build(&subset);
        let result = arbitrate("mo-senate-2024", unit(), &responses, &policy());
        for id in &result.contributing_providers {
            assert!(responses
                .iter()
                .any(|r| &r.provider_id == id && !r.text.trim().is_empty()));
        }
    }
}

// ── Property: permutation invariance ───────────────────────────────

#[test]
fn prop_output_invariant_under_permutation() {
    for subset in subsets() {
        let baseline = arbitrate("mo-senate-2024", unit(), &build(&subset), &policy());
        for perm in permutations(&subset) {
            let result = arbitrate("mo-senate-2024", unit(), &build(&perm), &policy());
            assert_eq!(result, baseline, "permutation {perm:?}");
        }
    }
}

// ── Property: confidence by success count ──────────────────────────

#[test]
fn prop_confidence_follows_success_count() {
    for subset in subsets() {
        let responses = build(&subset);
        let successes = responses.iter().filter(|r| !r.text.trim().is_empty()).count();
        let result = arbitrate("mo-senate-2024", unit(), &responses, &policy());
        match successes {
            0 => {
                assert_eq!(result.confidence_level, ConfidenceLevel::Unknown);
                assert_eq!(result.agreement_method, AgreementMethod::None);
            }
            1 => assert_eq!(result.confidence_level, ConfidenceLevel::Low),
            _ => assert!(matches!(
                result.confidence_level,
                ConfidenceLevel::High | ConfidenceLevel::Medium
            )),
        }
        if result.confidence_level == ConfidenceLevel::High {
            assert!(result.contributing_providers.len() >= 2);
        }
        if result.confidence_level == ConfidenceLevel::Medium {
            assert_eq!(result.contributing_providers.len(), 1);
            assert!(result.note.is_some());
        }
    }
}

// ── Scenario: three agreeing providers ─────────────────────────────

#[test]
fn three_agreeing_providers_are_high() {
    let responses = vec![
        response("openai", "Supports a public option for health insurance.", ConfidenceLevel::Medium),
        response("anthropic", "She supports a public option for health insurance.", ConfidenceLevel::Medium),
        response("gemini", "Supports a public option in health insurance markets.", ConfidenceLevel::Medium),
    ];
    let result = arbitrate("mo-senate-2024", unit(), &responses, &policy());
    assert_eq!(result.confidence_level, ConfidenceLevel::High);
    assert_eq!(result.contributing_providers.len(), 3);
    assert!(result.final_text.contains("public option"));
    // Equal signals: configured priority puts anthropic first.
    assert_eq!(result.final_text, responses[1].text);
}

// ── Scenario: conflicting stances with high overlap ────────────────

#[test]
fn opposite_stances_do_not_form_consensus() {
    let responses = build(&[0, 2]);
    let result = arbitrate("mo-senate-2024", unit(), &responses, &policy());
    assert_eq!(result.confidence_level, ConfidenceLevel::Medium);
    assert_eq!(result.contributing_providers, vec![ProviderId::new("openai")]);
}

// ── Scenario: negated verb phrase against its affirmative form ─────

#[test]
fn opposing_an_expansion_is_not_consensus_with_supporting_it() {
    let cases = [
        (
            "Jane Doe supports expanding Medicaid and a public option for health insurance.",
            "Jane Doe opposes expanding Medicaid and a public option for health insurance.",
        ),
        (
            "Jane Doe is committed to protecting collective bargaining rights for teachers.",
            "Jane Doe is against protecting collective bargaining rights for teachers.",
        ),
    ];
    for (support, oppose) in cases {
        let responses = vec![
            response("openai", support, ConfidenceLevel::Medium),
            response("anthropic", oppose, ConfidenceLevel::Medium),
        ];
        let result = arbitrate("mo-senate-2024", unit(), &responses, &policy());
        assert_eq!(result.confidence_level, ConfidenceLevel::Medium, "{oppose:?}");
        assert_eq!(result.contributing_providers.len(), 1);
        assert!(result.note.is_some());
    }
}
