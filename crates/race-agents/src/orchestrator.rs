//! Race pipeline: retrieval → fan-out → arbitration for every unit of work.
//!
//! Units run sequentially. A race-level deadline bounds the whole run; any
//! unit not finished by then, or after cancellation, is reported UNKNOWN so
//! the full candidate×issue matrix is always present in the output.
//!
//! Each run counts usage on its own tracker, so runs sharing one engine may
//! proceed in parallel. The engine's tracker receives the run's snapshot when
//! the run finishes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use triangulation::otel;
use triangulation::{
    arbitrate, ArbiterPolicy, ConsensusResult, CorpusQuery, CorpusStore, ModelTier, RetrievedContext,
    SharedCorpusStore, UnitKey, UsageTracker,
};

use crate::config::{RaceAgentsConfig, RetrievalConfig, RunMode};
use crate::engine::{EngineOutcome, SummarizationEngine};
use crate::prompts;
use crate::race::{RaceSpec, RaceSummary};
use crate::publish::SharedPublisher;
use crate::telemetry::{self, RunRecorder, RunReport};

/// Note attached to units the race deadline cut off.
pub const TIMEOUT_NOTE: &str = "race timeout reached before this unit completed";

/// Note attached to units skipped after cancellation.
pub const CANCELLED_NOTE: &str = "run cancelled before this unit completed";

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct RaceRun {
    pub summary: RaceSummary,
    pub report: RunReport,
    /// Publisher locator, when a publisher is attached.
    pub published: Option<String>,
}

struct UnitOutcome {
    result: ConsensusResult,
    engine: EngineOutcome,
}

pub struct Orchestrator {
    store: SharedCorpusStore,
    engine: SummarizationEngine,
    policy: ArbiterPolicy,
    retrieval: RetrievalConfig,
    race_timeout: Duration,
    mode: RunMode,
    publisher: Option<SharedPublisher>,
    telemetry_log: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(config: &RaceAgentsConfig, store: SharedCorpusStore, engine: SummarizationEngine) -> Self {
        Self {
            store,
            engine,
            policy: config.arbiter_policy(),
            retrieval: config.retrieval.clone(),
            race_timeout: config.orchestrator.race_timeout(),
            mode: config.mode,
            publisher: None,
            telemetry_log: config.output.telemetry_log.clone(),
        }
    }

    pub fn with_publisher(mut self, publisher: SharedPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_telemetry_log(mut self, path: Option<PathBuf>) -> Self {
        self.telemetry_log = path;
        self
    }

    pub fn with_race_timeout(mut self, timeout: Duration) -> Self {
        self.race_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &SummarizationEngine {
        &self.engine
    }

    /// Run the pipeline, publish the artifact, and append the run report.
    pub async fn run(&self, race: &RaceSpec, cancel: &CancellationToken) -> anyhow::Result<RaceRun> {
        let (summary, report) = self.execute(race, cancel).await;

        let published = match &self.publisher {
            Some(publisher) => Some(
                publisher
                    .publish(&summary)
                    .await
                    .with_context(|| format!("Failed to publish race {}", race.race_id))?,
            ),
            None => None,
        };
        if let Some(path) = &self.telemetry_log {
            telemetry::append_report(&report, path);
        }

        Ok(RaceRun {
            summary,
            report,
            published,
        })
    }

    /// Produce the race artifact and run report. Never fails: every provider
    /// and corpus failure degrades confidence instead.
    pub async fn execute(&self, race: &RaceSpec, cancel: &CancellationToken) -> (RaceSummary, RunReport) {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = otel::race_run_span(&race.race_id, &run_id);
        let (summary, report) = self
            .execute_inner(race, &run_id, cancel)
            .instrument(span.clone())
            .await;
        otel::record_run_result(&span, report.unit_count(), report.elapsed_ms);
        (summary, report)
    }

    async fn execute_inner(
        &self,
        race: &RaceSpec,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> (RaceSummary, RunReport) {
        let usage = UsageTracker::shared();
        let engine = self.engine.clone().with_usage(usage.clone());

        let pool = engine.pool();
        let tier: ModelTier = pool.tier();
        let generators = pool.ids();
        if generators.is_empty() {
            warn!(race_id = %race.race_id, "No providers enabled, every unit will be UNKNOWN");
        }

        let units = race.units();
        info!(
            race_id = %race.race_id,
            run_id,
            units = units.len(),
            providers = generators.len(),
            tier = %tier,
            store = self.store.backend_name(),
            "Starting race run"
        );

        let deadline = Instant::now() + self.race_timeout;
        let mut recorder = RunRecorder::new(run_id, &race.race_id, self.mode, tier);
        let mut results: HashMap<UnitKey, ConsensusResult> = HashMap::with_capacity(units.len());

        for unit in units {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                let note = if cancel.is_cancelled() {
                    CANCELLED_NOTE
                } else {
                    TIMEOUT_NOTE
                };
                let result = self.unknown(race, unit.clone()).with_note(note);
                recorder.record_skipped(&result);
                results.insert(unit, result);
                continue;
            }

            let start = Instant::now();
            let unit_span = otel::unit_span(
                &race.race_id,
                &unit.to_string(),
                &unit.task_type().to_string(),
            );
            let processed = tokio::time::timeout_at(
                deadline,
                self.process_unit(&engine, race, &unit, cancel)
                    .instrument(unit_span.clone()),
            )
            .await;

            match processed {
                Ok(outcome) => {
                    otel::record_arbitration_result(&unit_span, &outcome.result);
                    recorder.record_unit(
                        &outcome.result,
                        &outcome.engine,
                        start.elapsed().as_millis() as u64,
                    );
                    results.insert(unit, outcome.result);
                }
                Err(_) => {
                    warn!(race_id = %race.race_id, unit = %unit, "Race timeout reached mid-unit");
                    let result = self.unknown(race, unit.clone()).with_note(TIMEOUT_NOTE);
                    recorder.record_skipped(&result);
                    results.insert(unit, result);
                }
            }
        }

        let summary = RaceSummary::assemble(
            race,
            run_id,
            generators,
            results,
            &self.policy.placeholder_text,
        );
        let report = recorder.finish(usage.snapshot());
        self.engine.usage().replace(&report.usage);
        info!(
            race_id = %race.race_id,
            run_id,
            overall = %summary.overall_confidence,
            elapsed_ms = report.elapsed_ms,
            timed_out = report.timed_out_units,
            calls = report.usage.total_calls(),
            tokens = report.usage.total_tokens(),
            "Race run complete"
        );
        (summary, report)
    }

    async fn process_unit(
        &self,
        engine: &SummarizationEngine,
        race: &RaceSpec,
        unit: &UnitKey,
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let context = self.retrieve(race, unit).await;
        let engine = engine.summarize(race, unit, &context, cancel).await;

        if engine.cancelled {
            return UnitOutcome {
                result: self.unknown(race, unit.clone()).with_note(CANCELLED_NOTE),
                engine,
            };
        }

        let span = otel::arbitration_span(&unit.to_string(), engine.responses.len());
        let result = span.in_scope(|| {
            arbitrate(&race.race_id, unit.clone(), &engine.responses, &self.policy)
        });
        otel::record_arbitration_result(&span, &result);

        info!(
            race_id = %race.race_id,
            unit = %unit,
            confidence = %result.confidence_level,
            contributors = result.contributing_providers.len(),
            responses = engine.responses.len(),
            failures = engine.failures.len(),
            fragments = context.len(),
            "Unit complete"
        );
        UnitOutcome { result, engine }
    }

    /// Retrieve context for a unit. Storage failures degrade to an empty context.
    async fn retrieve(&self, race: &RaceSpec, unit: &UnitKey) -> RetrievedContext {
        let query = CorpusQuery::new(
            &race.race_id,
            &prompts::topic_hint(unit, race),
            self.retrieval.k,
        );
        match self.store.query(&query, self.retrieval.max_chars).await {
            Ok(context) => context,
            Err(e) => {
                warn!(
                    race_id = %race.race_id,
                    unit = %unit,
                    error = %e,
                    "Corpus query failed, continuing with empty context"
                );
                RetrievedContext::empty(self.retrieval.max_chars)
            }
        }
    }

    fn unknown(&self, race: &RaceSpec, unit: UnitKey) -> ConsensusResult {
        ConsensusResult::unknown(&race.race_id, unit, &self.policy.placeholder_text)
    }
}
