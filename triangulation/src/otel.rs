//! OpenTelemetry-compatible span helpers for the race pipeline.
//!
//! All spans use dot-notation field names.
//!
//! # Span Hierarchy
//!
//! ```text
//! race.run                 (root, one per race pipeline run)
//!   └─ race.unit           (one per unit of work)
//!       ├─ provider.call   (one per provider, spans all retry attempts)
//!       └─ race.arbitration
//! ```

use tracing::Span;

use crate::arbiter::ConsensusResult;

// ── Span Name Constants ──────────────────────────────────────────────

/// Root span for one race pipeline run.
pub const SPAN_RACE_RUN: &str = "race.run";

/// One unit of work (overview, candidate, candidate×issue).
pub const SPAN_UNIT: &str = "race.unit";

/// One provider request including its retries.
pub const SPAN_PROVIDER_CALL: &str = "provider.call";

/// Consensus arbitration for one unit.
pub const SPAN_ARBITRATION: &str = "race.arbitration";

// ── Field Name Constants ─────────────────────────────────────────────

pub const FIELD_RACE_ID: &str = "race.id";
pub const FIELD_RUN_ID: &str = "race.run_id";
pub const FIELD_UNIT: &str = "race.unit.key";
pub const FIELD_TASK_TYPE: &str = "race.task_type";
pub const FIELD_PROVIDER: &str = "provider.id";
pub const FIELD_MODEL: &str = "provider.model";
pub const FIELD_ATTEMPTS: &str = "provider.attempts";
pub const FIELD_SUCCESS: &str = "race.success";
pub const FIELD_DURATION_MS: &str = "race.duration_ms";
pub const FIELD_TOKENS_USED: &str = "provider.tokens_used";
pub const FIELD_RESPONSE_COUNT: &str = "race.arbitration.responses";
pub const FIELD_CONFIDENCE: &str = "race.arbitration.confidence";
pub const FIELD_CONTRIBUTORS: &str = "race.arbitration.contributors";
pub const FIELD_METHOD: &str = "race.arbitration.method";

// ── Span Builders ────────────────────────────────────────────────────

/// Root span for a race run.
///
/// Fields filled later via [`record_run_result`]: units completed, duration.
pub fn race_run_span(race_id: &str, run_id: &str) -> Span {
    tracing::info_span!(
        "race.run",
        "race.id" = %race_id,
        "race.run_id" = %run_id,
        "race.units" = tracing::field::Empty,
        "race.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_run_result(span: &Span, units: usize, duration_ms: u64) {
    span.record("race.units", units as u64);
    span.record("race.duration_ms", duration_ms);
}

/// Span for a single unit of work.
pub fn unit_span(race_id: &str, unit: &str, task_type: &str) -> Span {
    tracing::info_span!(
        "race.unit",
        "race.id" = %race_id,
        "race.unit.key" = %unit,
        "race.task_type" = %task_type,
        "race.arbitration.confidence" = tracing::field::Empty,
        "race.duration_ms" = tracing::field::Empty,
    )
}

/// Span for one provider request, covering all of its attempts.
///
/// Fields filled later via [`record_provider_result`]: success, attempts, tokens, duration.
pub fn provider_call_span(provider: &str, model: &str, task_type: &str) -> Span {
    tracing::info_span!(
        "provider.call",
        "provider.id" = %provider,
        "provider.model" = %model,
        "race.task_type" = %task_type,
        "race.success" = tracing::field::Empty,
        "provider.attempts" = tracing::field::Empty,
        "provider.tokens_used" = tracing::field::Empty,
        "race.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_provider_result(
    span: &Span,
    success: bool,
    attempts: u32,
    tokens_used: u64,
    duration_ms: u64,
) {
    span.record("race.success", success);
    span.record("provider.attempts", attempts);
    span.record("provider.tokens_used", tokens_used);
    span.record("race.duration_ms", duration_ms);
}

/// Span for arbitration over `response_count` responses.
pub fn arbitration_span(unit: &str, response_count: usize) -> Span {
    tracing::info_span!(
        "race.arbitration",
        "race.unit.key" = %unit,
        "race.arbitration.responses" = response_count as u64,
        "race.arbitration.confidence" = tracing::field::Empty,
        "race.arbitration.contributors" = tracing::field::Empty,
        "race.arbitration.method" = tracing::field::Empty,
    )
}

/// Record an arbitration outcome on an arbitration or unit span.
pub fn record_arbitration_result(span: &Span, result: &ConsensusResult) {
    span.record(
        "race.arbitration.confidence",
        tracing::field::display(result.confidence_level),
    );
    span.record(
        "race.arbitration.contributors",
        result.contributing_providers.len() as u64,
    );
    span.record(
        "race.arbitration.method",
        tracing::field::debug(result.agreement_method),
    );
}
