//! Durable corpus backend: one append-only JSONL file per race.
//!
//! The similarity index lives in memory and is rebuilt from the files on
//! open. Appends are serialized so two concurrent ingests of the same
//! fragment cannot both be written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::context::{CorpusQuery, RetrievedContext};
use super::embedding::Embedder;
use super::fragment::ContentFragment;
use super::store::{
    CorpusStore, IngestOutcome, MemoryCorpusStore, SharedCorpusStore, StorageError, StorageResult,
};

/// JSONL-backed corpus store.
pub struct JsonlCorpusStore {
    dir: PathBuf,
    index: MemoryCorpusStore,
    write_gate: Mutex<()>,
}

impl JsonlCorpusStore {
    /// Open (or create) a store rooted at `dir`, loading every `<race_id>.jsonl`.
    pub async fn open(dir: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let index = MemoryCorpusStore::new(embedder);
        let mut loaded = 0usize;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(race_id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            let raw = tokio::fs::read_to_string(&path).await?;
            for (lineno, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ContentFragment>(line) {
                    Ok(fragment) => {
                        if index.insert_validated(&race_id, fragment.validated())?
                            == IngestOutcome::Inserted
                        {
                            loaded += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            file = %path.display(),
                            line = lineno + 1,
                            error = %e,
                            "Skipping unreadable corpus line"
                        );
                    }
                }
            }
        }

        info!(dir = %dir.display(), fragments = loaded, "Corpus store opened");
        Ok(Self {
            dir,
            index,
            write_gate: Mutex::new(()),
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedCorpusStore {
        Arc::new(self)
    }

    /// Directory holding the race files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn race_file(&self, race_id: &str) -> StorageResult<PathBuf> {
        let safe = !race_id.is_empty()
            && race_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(StorageError::Unavailable(format!(
                "race id '{race_id}' is not a valid file name"
            )));
        }
        Ok(self.dir.join(format!("{race_id}.jsonl")))
    }
}

#[async_trait]
impl CorpusStore for JsonlCorpusStore {
    async fn ingest(
        &self,
        race_id: &str,
        fragment: ContentFragment,
    ) -> StorageResult<IngestOutcome> {
        let fragment = fragment.validated();
        let path = self.race_file(race_id)?;

        let _gate = self.write_gate.lock().await;
        if self.index.contains(race_id, &fragment.checksum)? {
            debug!(race_id, checksum = %fragment.checksum, "Duplicate fragment");
            return Ok(IngestOutcome::Duplicate);
        }

        let mut line = serde_json::to_string(&fragment)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.index.insert_validated(race_id, fragment)
    }

    async fn query(
        &self,
        query: &CorpusQuery,
        max_chars: usize,
    ) -> StorageResult<RetrievedContext> {
        self.index.query(query, max_chars).await
    }

    async fn fragment_count(&self, race_id: &str) -> StorageResult<usize> {
        self.index.fragment_count(race_id).await
    }

    fn backend_name(&self) -> &str {
        "jsonl"
    }
}
