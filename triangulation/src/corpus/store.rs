//! Corpus store: deduplicated fragments plus a similarity index.
//!
//! Ingestion is the only mutator. Queries are read-only and may run
//! concurrently with ingestion; a fragment ingested mid-query may or may not
//! be visible to that query.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::{CorpusQuery, RetrievedContext, ScoredFragment};
use super::embedding::{cosine_similarity, Embedder, HashingEmbedder};
use super::fragment::ContentFragment;

/// Error type for corpus storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Corpus I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corpus serialization error: {0}")]
    Serialization(String),

    #[error("Corpus backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for corpus storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of an ingest call. Duplicates are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Inserted,
    Duplicate,
}

/// Durable, queryable store of content fragments.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Insert a fragment for a race. Re-inserting a known checksum is a no-op.
    async fn ingest(&self, race_id: &str, fragment: ContentFragment)
        -> StorageResult<IngestOutcome>;

    /// Top-`k` fragments by similarity to the topic hint, trimmed to `max_chars`.
    ///
    /// A race with no content yields an empty context, not an error.
    async fn query(&self, query: &CorpusQuery, max_chars: usize)
        -> StorageResult<RetrievedContext>;

    /// Number of fragments stored for a race.
    async fn fragment_count(&self, race_id: &str) -> StorageResult<usize>;

    /// Backend name for logging.
    fn backend_name(&self) -> &str;
}

/// Shared reference to a corpus store
pub type SharedCorpusStore = Arc<dyn CorpusStore>;

#[derive(Debug, Default)]
struct RaceIndex {
    checksums: HashSet<String>,
    entries: Vec<IndexedFragment>,
}

#[derive(Debug)]
struct IndexedFragment {
    fragment: ContentFragment,
    embedding: Vec<f32>,
}

/// In-memory corpus store with brute-force nearest-neighbor search.
pub struct MemoryCorpusStore {
    races: RwLock<HashMap<String, RaceIndex>>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryCorpusStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            races: RwLock::new(HashMap::new()),
            embedder,
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedCorpusStore {
        Arc::new(self)
    }

    /// Whether a checksum is already present for a race.
    pub(crate) fn contains(&self, race_id: &str, checksum: &str) -> StorageResult<bool> {
        let races = self.races.read().map_err(|_| poisoned())?;
        Ok(races
            .get(race_id)
            .map(|r| r.checksums.contains(checksum))
            .unwrap_or(false))
    }

    /// Insert an already-validated fragment.
    pub(crate) fn insert_validated(
        &self,
        race_id: &str,
        fragment: ContentFragment,
    ) -> StorageResult<IngestOutcome> {
        let embedding = self.embedder.embed(&fragment.text);
        let mut races = self.races.write().map_err(|_| poisoned())?;
        let index = races.entry(race_id.to_string()).or_default();

        if !index.checksums.insert(fragment.checksum.clone()) {
            return Ok(IngestOutcome::Duplicate);
        }
        index.entries.push(IndexedFragment {
            fragment,
            embedding,
        });
        Ok(IngestOutcome::Inserted)
    }

    fn rank(&self, query: &CorpusQuery) -> StorageResult<Vec<ScoredFragment>> {
        let query_vec = self.embedder.embed(&query.topic_hint);
        let races = self.races.read().map_err(|_| poisoned())?;
        let Some(index) = races.get(&query.race_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(usize, ScoredFragment)> = index
            .entries
            .iter()
            .enumerate()
            .map(|(pos, e)| {
                (
                    pos,
                    ScoredFragment {
                        fragment: e.fragment.clone(),
                        score: cosine_similarity(&query_vec, &e.embedding),
                    },
                )
            })
            .collect();

        scored.sort_by(|(pa, a), (pb, b)| {
            b.score
                .total_cmp(&a.score)
                .then(b.fragment.usefulness_score.total_cmp(&a.fragment.usefulness_score))
                .then(pa.cmp(pb))
        });
        scored.truncate(query.k);
        Ok(scored.into_iter().map(|(_, s)| s).collect())
    }
}

impl Default for MemoryCorpusStore {
    fn default() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }
}

fn poisoned() -> StorageError {
    StorageError::Unavailable("index lock poisoned".to_string())
}

#[async_trait]
impl CorpusStore for MemoryCorpusStore {
    async fn ingest(
        &self,
        race_id: &str,
        fragment: ContentFragment,
    ) -> StorageResult<IngestOutcome> {
        let outcome = self.insert_validated(race_id, fragment.validated())?;
        debug!(race_id, outcome = ?outcome, "Fragment ingested");
        Ok(outcome)
    }

    async fn query(
        &self,
        query: &CorpusQuery,
        max_chars: usize,
    ) -> StorageResult<RetrievedContext> {
        let ranked = self.rank(query)?;
        let context = RetrievedContext::from_ranked(ranked, max_chars);
        debug!(
            race_id = %query.race_id,
            k = query.k,
            returned = context.len(),
            dropped = context.dropped,
            chars = context.total_chars(),
            "Corpus query"
        );
        Ok(context)
    }

    async fn fragment_count(&self, race_id: &str) -> StorageResult<usize> {
        let races = self.races.read().map_err(|_| poisoned())?;
        Ok(races.get(race_id).map(|r| r.entries.len()).unwrap_or(0))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
