//! Corpus store integration tests: ranked retrieval, character budget, and
//! idempotent ingestion across both backends.

use std::sync::Arc;

use tempfile::tempdir;
use triangulation::{
    ContentFragment, CorpusQuery, CorpusStore, HashingEmbedder, IngestOutcome, JsonlCorpusStore,
    MemoryCorpusStore, SourceType,
};

const RACE: &str = "mo-senate-2024";

fn fragments() -> Vec<ContentFragment> {
    vec![
        ContentFragment::new(
            "https://doe.example/health",
            SourceType::Website,
            "Jane Doe supports a public option for health insurance and lower prescription drug prices.",
        )
        .with_usefulness(0.9),
        ContentFragment::new(
            "https://news.example/doe-medicare",
            SourceType::News,
            "At a town hall Doe said health insurance should be affordable and defended Medicare expansion.",
        )
        .with_usefulness(0.7),
        ContentFragment::new(
            "https://news.example/health-costs",
            SourceType::News,
            "Health insurance premiums in Missouri rose again; both candidates were asked about a public option.",
        )
        .with_usefulness(0.5),
        ContentFragment::new(
            "https://news.example/fair",
            SourceType::News,
            "The state fair parade drew record crowds and a livestock auction on Saturday.",
        )
        .with_usefulness(0.2),
        ContentFragment::new(
            "https://smith.example/trade",
            SourceType::Website,
            "John Smith wants tariffs on imported steel to protect manufacturing jobs.",
        )
        .with_usefulness(0.6),
    ]
}

async fn seeded_memory_store() -> MemoryCorpusStore {
    let store = MemoryCorpusStore::new(Arc::new(HashingEmbedder::default()));
    for f in fragments() {
        assert_eq!(store.ingest(RACE, f).await.unwrap(), IngestOutcome::Inserted);
    }
    store
}

#[tokio::test]
async fn query_returns_top_k_most_similar_within_budget() {
    let store = seeded_memory_store().await;
    assert_eq!(store.fragment_count(RACE).await.unwrap(), 5);

    let query = CorpusQuery::new(RACE, "health insurance public option", 3);
    let ctx = store.query(&query, 4_000).await.unwrap();

    assert_eq!(ctx.len(), 3);
    assert!(ctx.total_chars() <= 4_000);
    let urls = ctx.source_urls();
    assert!(!urls.contains(&"https://news.example/fair".to_string()));
    assert!(!urls.contains(&"https://smith.example/trade".to_string()));
    for pair in ctx.fragments.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn tight_budget_drops_lowest_ranked_first() {
    let store = seeded_memory_store().await;
    let query = CorpusQuery::new(RACE, "health insurance public option", 3);
    let full = store.query(&query, 10_000).await.unwrap();

    let first_len = full.fragments[0].fragment.char_len();
    let trimmed = store.query(&query, first_len).await.unwrap();
    assert_eq!(trimmed.len(), 1);
    assert_eq!(trimmed.fragments[0].fragment, full.fragments[0].fragment);
    assert_eq!(trimmed.dropped, 2);

    let nothing = store.query(&query, 5).await.unwrap();
    assert!(nothing.is_empty());
    assert!(nothing.total_chars() <= 5);
}

#[tokio::test]
async fn budget_holds_for_every_budget_and_k() {
    let store = seeded_memory_store().await;
    for k in 1..=6 {
        for budget in [0usize, 50, 90, 120, 200, 400, 10_000] {
            let ctx = store
                .query(&CorpusQuery::new(RACE, "candidates", k), budget)
                .await
                .unwrap();
            assert!(ctx.total_chars() <= budget, "k={k} budget={budget}");
            assert!(ctx.len() <= k);
        }
    }
}

#[tokio::test]
async fn unknown_race_yields_empty_context() {
    let store = seeded_memory_store().await;
    let ctx = store
        .query(&CorpusQuery::new("tx-gov-2026", "education", 3), 1_000)
        .await
        .unwrap();
    assert!(ctx.is_empty());
    assert_eq!(ctx.render(), "");
}

#[tokio::test]
async fn reingest_is_duplicate_and_count_unchanged() {
    let store = seeded_memory_store().await;
    let again = fragments().remove(0);
    assert_eq!(store.ingest(RACE, again).await.unwrap(), IngestOutcome::Duplicate);
    assert_eq!(store.fragment_count(RACE).await.unwrap(), 5);

    // Same text is independent per race.
    let other = fragments().remove(0);
    assert_eq!(
        store.ingest("ks-house-2024", other).await.unwrap(),
        IngestOutcome::Inserted
    );
}

#[tokio::test]
async fn jsonl_store_deduplicates_across_restart() {
    let dir = tempdir().unwrap();
    {
        let store = JsonlCorpusStore::open(dir.path(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        for f in fragments() {
            store.ingest(RACE, f).await.unwrap();
        }
    }

    let store = JsonlCorpusStore::open(dir.path(), Arc::new(HashingEmbedder::default()))
        .await
        .unwrap();
    assert_eq!(store.fragment_count(RACE).await.unwrap(), 5);
    for f in fragments() {
        assert_eq!(store.ingest(RACE, f).await.unwrap(), IngestOutcome::Duplicate);
    }
    assert_eq!(store.fragment_count(RACE).await.unwrap(), 5);

    let ctx = store
        .query(&CorpusQuery::new(RACE, "tariffs steel manufacturing", 1), 1_000)
        .await
        .unwrap();
    assert_eq!(ctx.source_urls(), vec!["https://smith.example/trade".to_string()]);
}

#[tokio::test]
async fn concurrent_duplicate_ingest_inserts_once() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        JsonlCorpusStore::open(dir.path(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap(),
    );

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let s = Arc::clone(&store);
        set.spawn(async move { s.ingest(RACE, fragments().remove(0)).await.unwrap() });
    }
    let mut inserted = 0;
    while let Some(outcome) = set.join_next().await {
        if outcome.unwrap() == IngestOutcome::Inserted {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);

    let raw = std::fs::read_to_string(dir.path().join(format!("{RACE}.jsonl"))).unwrap();
    assert_eq!(raw.lines().count(), 1);
}
