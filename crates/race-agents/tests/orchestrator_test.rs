//! End-to-end race runs over scripted providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use race_agents::orchestrator::{CANCELLED_NOTE, TIMEOUT_NOTE};
use race_agents::race::RaceSummary;
use race_agents::{
    CandidateSpec, JsonFilePublisher, Orchestrator, ProviderPool, RaceAgentsConfig, RaceSpec,
    SummarizationEngine,
};
use triangulation::{
    AgreementMethod, CanonicalIssue, ConfidenceLevel, ContentFragment, CorpusQuery, CorpusStore,
    IngestOutcome, MemoryCorpusStore, MockProvider, ProviderError, RetrievedContext, RetryPolicy,
    SharedCorpusStore, SourceType, StorageError, StorageResult, SummaryProvider, UsageTracker,
};

const RACE_ID: &str = "mo-senate-2024";
const PLACEHOLDER: &str = "No summary available.";

const AGREE_A: &str =
    "Jane Doe supports a public option for health insurance and voted for the Medicaid expansion bill.";
const AGREE_B: &str =
    "Jane Doe supports a public option for health insurance and backs Medicaid expansion.";
const AGREE_C: &str =
    "Doe supports adding a public health insurance option and voted for Medicaid expansion.";
const UNRELATED: &str =
    "Coverage focuses on agricultural subsidies, rural broadband grants, and veterans benefits.";

fn race() -> RaceSpec {
    RaceSpec {
        race_id: RACE_ID.into(),
        title: "Missouri U.S. Senate 2024".into(),
        office: Some("U.S. Senate".into()),
        jurisdiction: Some("Missouri".into()),
        election_date: Some("2024-11-05".into()),
        candidates: vec![
            CandidateSpec {
                name: "Jane Doe".into(),
                party: Some("Democratic".into()),
                incumbent: false,
            },
            CandidateSpec {
                name: "John Smith".into(),
                party: Some("Republican".into()),
                incumbent: true,
            },
        ],
    }
}

async fn seeded_store() -> SharedCorpusStore {
    let store = MemoryCorpusStore::default();
    for (url, text) in [
        ("https://news.example/doe-health", "Jane Doe said she supports a public option."),
        ("https://news.example/smith-border", "John Smith pledged to fund more border agents."),
        ("https://news.example/race", "The Missouri Senate race is expected to be close."),
    ] {
        store
            .ingest(RACE_ID, ContentFragment::new(url, SourceType::News, text))
            .await
            .unwrap();
    }
    store.shared()
}

fn orchestrator(store: SharedCorpusStore, providers: Vec<Arc<dyn SummaryProvider>>) -> Orchestrator {
    let config = RaceAgentsConfig::default();
    let engine = SummarizationEngine::new(
        ProviderPool::from_providers(providers).shared(),
        UsageTracker::shared(),
    )
    .with_retry(RetryPolicy::new(
        3,
        Duration::from_millis(10),
        Duration::from_millis(100),
    ))
    .with_call_timeout(Duration::from_secs(5))
    .with_overall_budget(Duration::from_secs(30));
    Orchestrator::new(&config, store, engine).with_telemetry_log(None)
}

fn assert_full_matrix(summary: &RaceSummary) {
    assert_eq!(summary.candidates.len(), 2);
    for candidate in &summary.candidates {
        assert_eq!(candidate.issues.len(), CanonicalIssue::all().len());
        for issue in CanonicalIssue::all() {
            assert!(candidate.issues.contains_key(issue));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_agreeing_providers_yield_high() {
    let orchestrator = orchestrator(
        seeded_store().await,
        vec![
            Arc::new(MockProvider::new("openai").always(AGREE_A)),
            Arc::new(MockProvider::new("anthropic").always(AGREE_B)),
            Arc::new(MockProvider::new("gemini").always(AGREE_C)),
        ],
    );

    let (summary, report) = orchestrator.execute(&race(), &CancellationToken::new()).await;

    assert_full_matrix(&summary);
    let doe = summary.candidate("Jane Doe").unwrap();
    let health = &doe.issues[&CanonicalIssue::Healthcare];
    assert_eq!(health.confidence, ConfidenceLevel::High);
    assert_eq!(health.sources.len(), 3);
    assert!(health.stance.contains("public option"));
    assert_eq!(summary.overall_confidence, ConfidenceLevel::High);
    assert_eq!(summary.summary.agreement_method, AgreementMethod::ContentOverlap);
    assert_eq!(summary.generators.len(), 3);

    assert_eq!(report.unit_count(), 1 + 2 + 2 * 11);
    assert_eq!(report.count(ConfidenceLevel::High), report.unit_count());
    assert_eq!(report.usage.total_calls(), 3 * report.unit_count() as u64);
}

#[tokio::test(start_paused = true)]
async fn test_one_failing_two_disagreeing_yield_medium() {
    let openai = Arc::new(
        MockProvider::new("openai").failing(ProviderError::Timeout(Duration::from_secs(5))),
    );
    let orchestrator = orchestrator(
        seeded_store().await,
        vec![
            openai.clone(),
            Arc::new(MockProvider::new("anthropic").always(AGREE_B)),
            Arc::new(MockProvider::new("gemini").always(UNRELATED)),
        ],
    );

    let (summary, report) = orchestrator.execute(&race(), &CancellationToken::new()).await;

    let health = &summary.candidate("Jane Doe").unwrap().issues[&CanonicalIssue::Healthcare];
    assert_eq!(health.confidence, ConfidenceLevel::Medium);
    // Equal signals, so provider priority picks anthropic.
    assert_eq!(health.sources, vec!["anthropic".to_string()]);
    assert_eq!(health.stance, AGREE_B);
    assert_eq!(health.note.as_deref(), Some("sources disagree"));

    // Three attempts per unit, never more.
    assert_eq!(openai.call_count(), 3 * report.unit_count());
    assert_eq!(report.provider_failures["openai"], report.unit_count());
    assert_eq!(summary.overall_confidence, ConfidenceLevel::Medium);
}

#[tokio::test(start_paused = true)]
async fn test_single_provider_caps_at_low() {
    let orchestrator = orchestrator(
        seeded_store().await,
        vec![Arc::new(MockProvider::new("openai").always(AGREE_A))],
    );

    let (summary, _) = orchestrator.execute(&race(), &CancellationToken::new()).await;

    for candidate in &summary.candidates {
        for stance in candidate.issues.values() {
            assert_eq!(stance.confidence, ConfidenceLevel::Low);
            assert_eq!(stance.sources, vec!["openai".to_string()]);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_providers_still_produces_full_structure() {
    let orchestrator = orchestrator(seeded_store().await, vec![]);

    let (summary, report) = orchestrator.execute(&race(), &CancellationToken::new()).await;

    assert_full_matrix(&summary);
    assert!(summary.generators.is_empty());
    assert_eq!(summary.summary.confidence_level, ConfidenceLevel::Unknown);
    for candidate in &summary.candidates {
        assert_eq!(candidate.summary.final_text, PLACEHOLDER);
        for stance in candidate.issues.values() {
            assert_eq!(stance.confidence, ConfidenceLevel::Unknown);
            assert_eq!(stance.stance, PLACEHOLDER);
            assert!(stance.sources.is_empty());
        }
    }
    assert_eq!(summary.overall_confidence, ConfidenceLevel::Unknown);
    assert_eq!(report.count(ConfidenceLevel::Unknown), report.unit_count());
    assert_eq!(report.usage.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_prompts_carry_retrieved_sources() {
    let provider = Arc::new(MockProvider::new("openai").always(AGREE_A));
    let orchestrator = orchestrator(seeded_store().await, vec![provider.clone()]);

    orchestrator.execute(&race(), &CancellationToken::new()).await;

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 25);
    assert!(prompts.iter().all(|p| p.contains("[Source 1]")));
    assert!(prompts.iter().any(|p| p.contains("https://news.example/doe-health")));
}

struct UnavailableStore;

#[async_trait]
impl CorpusStore for UnavailableStore {
    async fn ingest(&self, _race_id: &str, _fragment: ContentFragment) -> StorageResult<IngestOutcome> {
        Err(StorageError::Unavailable("offline".into()))
    }

    async fn query(&self, _query: &CorpusQuery, _max_chars: usize) -> StorageResult<RetrievedContext> {
        Err(StorageError::Unavailable("offline".into()))
    }

    async fn fragment_count(&self, _race_id: &str) -> StorageResult<usize> {
        Err(StorageError::Unavailable("offline".into()))
    }

    fn backend_name(&self) -> &str {
        "unavailable"
    }
}

#[tokio::test(start_paused = true)]
async fn test_corpus_failure_degrades_to_empty_context() {
    let provider = Arc::new(MockProvider::new("openai").always(AGREE_A));
    let orchestrator = orchestrator(Arc::new(UnavailableStore), vec![provider.clone()]);

    let (summary, report) = orchestrator.execute(&race(), &CancellationToken::new()).await;

    assert_full_matrix(&summary);
    assert_eq!(report.count(ConfidenceLevel::Low), report.unit_count());
    assert!(provider
        .prompts()
        .iter()
        .all(|p| p.contains("no sources available")));
}

#[tokio::test(start_paused = true)]
async fn test_race_timeout_reports_remaining_units_unknown() {
    let slow = MockProvider::new("openai")
        .otherwise(triangulation::MockStep::ok_after(AGREE_A, Duration::from_secs(2)));
    let orchestrator = orchestrator(seeded_store().await, vec![Arc::new(slow)])
        .with_race_timeout(Duration::from_secs(7));

    let (summary, report) = orchestrator.execute(&race(), &CancellationToken::new()).await;

    assert_full_matrix(&summary);
    // Three units finish in 6s; the fourth is cut off mid-flight.
    assert_eq!(report.count(ConfidenceLevel::Low), 3);
    assert_eq!(report.timed_out_units, report.unit_count() - 3);
    let last = &summary.candidate("John Smith").unwrap().issues[&CanonicalIssue::ElectionReform];
    assert_eq!(last.confidence, ConfidenceLevel::Unknown);
    assert_eq!(last.note.as_deref(), Some(TIMEOUT_NOTE));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_marks_units_unknown() {
    let orchestrator = orchestrator(
        seeded_store().await,
        vec![Arc::new(MockProvider::new("openai").always(AGREE_A))],
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (summary, report) = orchestrator.execute(&race(), &cancel).await;

    assert_full_matrix(&summary);
    assert_eq!(summary.summary.note.as_deref(), Some(CANCELLED_NOTE));
    assert_eq!(report.count(ConfidenceLevel::Unknown), report.unit_count());
}

#[tokio::test(start_paused = true)]
async fn test_run_publishes_and_logs_report() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("runs.jsonl");
    let orchestrator = orchestrator(
        seeded_store().await,
        vec![
            Arc::new(MockProvider::new("openai").always(AGREE_A)),
            Arc::new(MockProvider::new("anthropic").always(AGREE_B)),
        ],
    )
    .with_publisher(Arc::new(JsonFilePublisher::new(dir.path().join("out"))))
    .with_telemetry_log(Some(log.clone()));

    let run = orchestrator.run(&race(), &CancellationToken::new()).await.unwrap();

    let published = run.published.unwrap();
    let raw = std::fs::read_to_string(&published).unwrap();
    let summary: RaceSummary = serde_json::from_str(&raw).unwrap();
    assert_eq!(summary, run.summary);
    assert_eq!(summary.overall_confidence, ConfidenceLevel::High);
    assert!(published.ends_with("mo-senate-2024.json"));

    let reader = race_agents::telemetry::TelemetryReader::read_from_file(&log).unwrap();
    assert_eq!(reader.reports().len(), 1);
    assert_eq!(reader.reports()[0].run_id, summary.run_id);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_runs_keep_separate_usage() {
    let tracker = UsageTracker::shared();
    let build = |providers: Vec<Arc<dyn SummaryProvider>>, store: SharedCorpusStore| {
        let engine = SummarizationEngine::new(
            ProviderPool::from_providers(providers).shared(),
            tracker.clone(),
        )
        .with_call_timeout(Duration::from_secs(5));
        Orchestrator::new(&RaceAgentsConfig::default(), store, engine).with_telemetry_log(None)
    };
    let fast = build(
        vec![
            Arc::new(MockProvider::new("openai").otherwise(triangulation::MockStep::ok_after(AGREE_A, Duration::from_secs(1)))),
            Arc::new(MockProvider::new("anthropic").otherwise(triangulation::MockStep::ok_after(AGREE_B, Duration::from_secs(1)))),
        ],
        seeded_store().await,
    );
    let slow = build(
        vec![Arc::new(MockProvider::new("gemini").otherwise(triangulation::MockStep::ok_after(AGREE_C, Duration::from_secs(3))))],
        seeded_store().await,
    );

    let cancel = CancellationToken::new();
    let race = race();
    let ((_, fast_report), (_, slow_report)) =
        tokio::join!(fast.execute(&race, &cancel), slow.execute(&race, &cancel));

    let units = fast_report.unit_count() as u64;
    assert_eq!(fast_report.usage.total_calls(), 2 * units);
    assert!(fast_report.usage.provider("gemini").is_none());
    assert_eq!(slow_report.usage.total_calls(), units);
    assert!(slow_report.usage.provider("openai").is_none());
    // The slower run finished last, so the shared tracker holds its counters.
    assert_eq!(tracker.snapshot(), slow_report.usage);
}
