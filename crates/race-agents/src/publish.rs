//! Publishing seam. The race artifact leaves the pipeline through a
//! [`RacePublisher`]; the file publisher is the local default.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::race::RaceSummary;

/// Error type for publishing operations
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Publish serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Downstream consumer of finished race summaries.
#[async_trait]
pub trait RacePublisher: Send + Sync {
    /// Hand off a finished summary. Returns a locator for logs.
    async fn publish(&self, summary: &RaceSummary) -> Result<String, PublishError>;
}

/// Shared reference to a publisher
pub type SharedPublisher = Arc<dyn RacePublisher>;

/// Writes `<dir>/<race_id>.json`, replacing any previous version atomically.
pub struct JsonFilePublisher {
    dir: PathBuf,
}

impl JsonFilePublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, race_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(race_id)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn sanitize(race_id: &str) -> String {
    race_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl RacePublisher for JsonFilePublisher {
    async fn publish(&self, summary: &RaceSummary) -> Result<String, PublishError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&summary.race_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(summary)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        info!(race_id = %summary.race_id, path = %path.display(), "Published race summary");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_id_is_sanitized() {
        let publisher = JsonFilePublisher::new("/tmp/out");
        assert_eq!(
            publisher.path_for("../mo senate"),
            PathBuf::from("/tmp/out/___mo_senate.json")
        );
    }
}
