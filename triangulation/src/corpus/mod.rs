//! Corpus Store: deduplicated content fragments and similarity retrieval.
//!
//! ```text
//! ingest(race_id, fragment) ──► checksum ──► duplicate? ──► index + embed
//! query(race_id, topic, k)  ──► embed topic ──► cosine top-k ──► trim to char budget
//! ```

pub mod context;
pub mod embedding;
pub mod file_store;
pub mod fragment;
pub mod store;

pub use context::{CorpusQuery, RetrievedContext, ScoredFragment};
pub use embedding::{cosine_similarity, Embedder, HashingEmbedder};
pub use file_store::JsonlCorpusStore;
pub use fragment::{checksum, normalize_text, ContentFragment, SourceType};
pub use store::{
    CorpusStore, IngestOutcome, MemoryCorpusStore, SharedCorpusStore, StorageError, StorageResult,
};
