//! Decision persistence.
//!
//! The orchestrator hands every finished decision to an optional
//! [`DecisionStore`]. Store failures are logged by the caller and never fail a
//! decision.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::committee::CommitteeDecision;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid subject id: {0}")]
    InvalidSubject(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn save(&self, decision: &CommitteeDecision) -> StoreResult<()>;

    /// Most recent decision for `subject_id`, if any.
    async fn load_latest(&self, subject_id: &str) -> StoreResult<Option<CommitteeDecision>>;
}

/// One JSON file per decision under `<root>/<subject>/<decision-id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn subject_dir(&self, subject_id: &str) -> StoreResult<PathBuf> {
        let safe = subject_id.trim();
        if safe.is_empty()
            || safe == "."
            || safe == ".."
            || safe.contains(['/', '\\'])
            || safe.contains('\0')
        {
            return Err(StoreError::InvalidSubject(subject_id.to_string()));
        }
        Ok(self.root.join(safe))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl DecisionStore for JsonFileStore {
    async fn save(&self, decision: &CommitteeDecision) -> StoreResult<()> {
        let dir = self.subject_dir(&decision.subject_id)?;
        tokio::fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;

        let path = dir.join(format!("{}.json", decision.id));
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(decision)?;

        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(io_err(&temp_path))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(io_err(&path))?;

        debug!(
            subject_id = %decision.subject_id,
            decision_id = %decision.id,
            path = %path.display(),
            "Decision saved"
        );
        Ok(())
    }

    async fn load_latest(&self, subject_id: &str) -> StoreResult<Option<CommitteeDecision>> {
        let dir = self.subject_dir(subject_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&dir)(e)),
        };

        let mut latest: Option<CommitteeDecision> = None;
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(io_err(&path))?;
            let decision: CommitteeDecision = serde_json::from_slice(&bytes)?;
            if latest
                .as_ref()
                .map_or(true, |l| decision.decided_at > l.decided_at)
            {
                latest = Some(decision);
            }
        }
        Ok(latest)
    }
}

/// In-process store keyed by subject.
#[derive(Debug, Default)]
pub struct MemoryStore {
    decisions: Mutex<HashMap<String, Vec<CommitteeDecision>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self, subject_id: &str) -> Vec<CommitteeDecision> {
        let decisions = match self.decisions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        decisions.get(subject_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        let decisions = match self.decisions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        decisions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn save(&self, decision: &CommitteeDecision) -> StoreResult<()> {
        let mut decisions = match self.decisions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        decisions
            .entry(decision.subject_id.clone())
            .or_default()
            .push(decision.clone());
        Ok(())
    }

    async fn load_latest(&self, subject_id: &str) -> StoreResult<Option<CommitteeDecision>> {
        Ok(self.all(subject_id).pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_dir_rejects_traversal() {
        let store = JsonFileStore::new("/tmp/decisions");
        assert!(store.subject_dir("dispute-42").is_ok());
        assert!(store.subject_dir("..").is_err());
        assert!(store.subject_dir("a/b").is_err());
        assert!(store.subject_dir("  ").is_err());
    }

    #[tokio::test]
    async fn test_missing_subject_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load_latest("nobody").await.unwrap().is_none());
    }
}
