//! Persisted completion sets and exploration cursor.
//!
//! Three independent JSON records live in the data directory:
//! - `processed_cids.json`: sorted array of archived identifiers
//! - `errors_cids.json`: sorted array of identifiers whose submission failed
//! - `exploration_cursor.json`: `{seed, iteration_count, is_positive_direction}`
//!
//! Every mutation rewrites the affected record in full before returning.
//! Writes go to a temporary file that is then renamed over the record, so a
//! crash mid-write leaves the previous version intact. A record that is
//! missing or unreadable loads as empty without affecting the others.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::{ArtifactId, ExplorationCursor};

pub const PROCESSED_FILE: &str = "processed_cids.json";
pub const ERRORED_FILE: &str = "errors_cids.json";
pub const CURSOR_FILE: &str = "exploration_cursor.json";

/// Errors persisting a record
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct StateInner {
    processed: BTreeSet<ArtifactId>,
    errored: BTreeSet<ArtifactId>,
    cursor: Option<ExplorationCursor>,
}

/// Durable state shared by the main loop and completion tasks
#[derive(Debug)]
pub struct StateStore {
    processed_path: PathBuf,
    errored_path: PathBuf,
    cursor_path: PathBuf,
    inner: Mutex<StateInner>,
}

impl StateStore {
    /// Load all three records from `data_dir`.
    ///
    /// Never fails: unreadable records start empty and the problem is logged.
    pub async fn load(data_dir: &Path) -> Self {
        if let Err(e) = fs::create_dir_all(data_dir).await {
            error!(dir = %data_dir.display(), error = %e, "Failed to create data directory");
        }

        let processed_path = data_dir.join(PROCESSED_FILE);
        let errored_path = data_dir.join(ERRORED_FILE);
        let cursor_path = data_dir.join(CURSOR_FILE);

        let processed = load_id_set(&processed_path).await;
        let errored = load_id_set(&errored_path).await;
        let cursor = load_cursor(&cursor_path).await;

        info!(
            processed = processed.len(),
            errored = errored.len(),
            has_cursor = cursor.is_some(),
            "Loaded archive state"
        );

        Self {
            processed_path,
            errored_path,
            cursor_path,
            inner: Mutex::new(StateInner {
                processed,
                errored,
                cursor,
            }),
        }
    }

    /// Whether `id` has already been archived
    pub async fn is_processed(&self, id: &ArtifactId) -> bool {
        self.inner.lock().await.processed.contains(id)
    }

    /// Whether a submission for `id` has failed before
    pub async fn is_errored(&self, id: &ArtifactId) -> bool {
        self.inner.lock().await.errored.contains(id)
    }

    pub async fn processed_count(&self) -> usize {
        self.inner.lock().await.processed.len()
    }

    pub async fn errored_count(&self) -> usize {
        self.inner.lock().await.errored.len()
    }

    /// Last persisted (or saved this run) exploration cursor
    pub async fn cursor(&self) -> Option<ExplorationCursor> {
        self.inner.lock().await.cursor
    }

    /// Add `id` to the processed set and persist the whole set.
    ///
    /// On failure the in-memory set keeps the id.
    pub async fn mark_processed(&self, id: &ArtifactId) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.processed.insert(id.clone());
        persist(&self.processed_path, &inner.processed).await
    }

    /// Add `id` to the errored set and persist the whole set
    pub async fn mark_errored(&self, id: &ArtifactId) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.errored.insert(id.clone());
        persist(&self.errored_path, &inner.errored).await
    }

    /// Overwrite the cursor record
    pub async fn save_cursor(&self, cursor: ExplorationCursor) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.cursor = Some(cursor);
        persist(&self.cursor_path, &cursor).await
    }
}

/// Serialize `value` and replace the file at `path` with it
async fn persist<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_replace(path, &json).await.map_err(|source| {
        error!(path = %path.display(), error = %source, "Failed to persist state");
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

async fn write_replace(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await
}

async fn load_id_set(path: &Path) -> BTreeSet<ArtifactId> {
    let Some(content) = read_record(path).await else {
        return BTreeSet::new();
    };

    match serde_json::from_str::<Vec<serde_json::Value>>(&content) {
        Ok(values) => values
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(ArtifactId::normalize)
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable id set");
            BTreeSet::new()
        }
    }
}

async fn load_cursor(path: &Path) -> Option<ExplorationCursor> {
    let content = read_record(path).await?;

    match serde_json::from_str(&content) {
        Ok(cursor) => Some(cursor),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable cursor");
            None
        }
    }
}

async fn read_record(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read state record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> ArtifactId {
        ArtifactId::normalize(s).unwrap()
    }

    async fn read_ids(path: &Path) -> Vec<String> {
        let content = fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_empty_dir_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::load(temp.path()).await;

        assert_eq!(store.processed_count().await, 0);
        assert_eq!(store.errored_count().await, 0);
        assert!(store.cursor().await.is_none());
    }

    #[tokio::test]
    async fn test_mark_processed_persists_sorted() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::load(temp.path()).await;

        store.mark_processed(&id("QmZ")).await.unwrap();
        store.mark_processed(&id("QmA")).await.unwrap();
        store.mark_processed(&id("QmM")).await.unwrap();

        let persisted = read_ids(&temp.path().join(PROCESSED_FILE)).await;
        assert_eq!(persisted, vec!["QmA", "QmM", "QmZ"]);
        assert!(!temp.path().join("processed_cids.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_mark_processed_twice_is_single_entry() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::load(temp.path()).await;

        store.mark_processed(&id("QmA")).await.unwrap();
        store.mark_processed(&id("ipfs://QmA")).await.unwrap();

        let persisted = read_ids(&temp.path().join(PROCESSED_FILE)).await;
        assert_eq!(persisted, vec!["QmA"]);
    }

    #[tokio::test]
    async fn test_corrupt_record_does_not_block_others() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PROCESSED_FILE), "{not json")
            .await
            .unwrap();
        fs::write(temp.path().join(ERRORED_FILE), r#"["ipfs://QmErr", 7]"#)
            .await
            .unwrap();
        fs::write(
            temp.path().join(CURSOR_FILE),
            r#"{"seed": 10, "iteration_count": 2, "is_positive_direction": false}"#,
        )
        .await
        .unwrap();

        let store = StateStore::load(temp.path()).await;

        assert_eq!(store.processed_count().await, 0);
        assert!(store.is_errored(&id("QmErr")).await);
        assert_eq!(store.errored_count().await, 1);
        assert_eq!(
            store.cursor().await,
            Some(ExplorationCursor {
                seed: 10,
                iteration_count: 2,
                is_positive_direction: false,
            })
        );
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::load(temp.path()).await;

        // A directory where the record should be makes the rename fail
        fs::create_dir_all(temp.path().join(PROCESSED_FILE).join("blocker"))
            .await
            .unwrap();

        let result = store.mark_processed(&id("QmA")).await;
        assert!(matches!(result, Err(StateError::Io { .. })));
        assert!(store.is_processed(&id("QmA")).await);
    }

    #[tokio::test]
    async fn test_cursor_roundtrip_through_disk() {
        let temp = TempDir::new().unwrap();
        let cursor = ExplorationCursor {
            seed: 4_200_000,
            iteration_count: 17,
            is_positive_direction: true,
        };

        {
            let store = StateStore::load(temp.path()).await;
            store.save_cursor(cursor).await.unwrap();
        }

        let reloaded = StateStore::load(temp.path()).await;
        assert_eq!(reloaded.cursor().await, Some(cursor));
    }
}
