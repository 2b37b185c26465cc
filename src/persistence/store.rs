//! File-backed latest-deployment store.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/<owner>/<repo>/<root>/deployment.json
//! ```
//!
//! # Atomic Writes
//!
//! Records are written atomically using a write-to-temp-then-rename pattern:
//! 1. Write to `deployment.json.tmp`
//! 2. fsync the file
//! 3. Rename to `deployment.json`
//! 4. fsync the directory
//!
//! Readers see either the previous record or the new one, never a partial
//! write. Concurrent writers are last-writer-wins; only one workflow runs per
//! root, so there are none in practice.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::fsync::{fsync_dir, fsync_file};
use crate::activities::{
    ActivityError, DeploymentStore, FetchLatestDeploymentRequest, StoreLatestDeploymentRequest,
};
use crate::types::{DeploymentRecord, RECORD_SCHEMA_VERSION, record_key};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },

    #[error("invalid record key: {0}")]
    InvalidKey(String),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for ActivityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(io) => ActivityError::from(io),
            other => ActivityError::permanent(other.to_string()).with_source(other),
        }
    }
}

/// Writes `record` to `path` atomically, creating parent directories.
pub fn save_record_atomic(path: &Path, record: &DeploymentRecord) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(record)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

pub fn load_record(path: &Path) -> Result<DeploymentRecord> {
    let bytes = std::fs::read(path)?;
    let record: DeploymentRecord = serde_json::from_slice(&bytes)?;

    if record.version != RECORD_SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            expected: RECORD_SCHEMA_VERSION,
            got: record.version,
        });
    }

    Ok(record)
}

/// Like [`load_record`], but a missing file is `None`.
pub fn try_load_record(path: &Path) -> Result<Option<DeploymentRecord>> {
    match load_record(path) {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone)]
pub struct FileDeploymentStore {
    state_dir: PathBuf,
}

impl FileDeploymentStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        FileDeploymentStore {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Resolves a record key below the state directory.
    ///
    /// Keys come from repo and root names, so path traversal is rejected.
    pub fn path_for_key(&self, key: &str) -> Result<PathBuf> {
        let valid = key
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
        if !valid || key.contains('\\') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.state_dir.join(key))
    }
}

impl DeploymentStore for FileDeploymentStore {
    async fn fetch_latest_deployment(
        &self,
        request: FetchLatestDeploymentRequest,
    ) -> std::result::Result<Option<DeploymentRecord>, ActivityError> {
        let (owner, repo) = request
            .full_repository_name
            .split_once('/')
            .ok_or_else(|| StoreError::InvalidKey(request.full_repository_name.clone()))?;
        let path = self.path_for_key(&record_key(owner, repo, &request.root_name))?;

        let record = tokio::task::spawn_blocking(move || try_load_record(&path))
            .await
            .map_err(StoreError::from)??;
        Ok(record)
    }

    async fn store_latest_deployment(
        &self,
        request: StoreLatestDeploymentRequest,
    ) -> std::result::Result<(), ActivityError> {
        let record = request.deployment;
        let path = self.path_for_key(&record.key())?;
        debug!(path = %path.display(), revision = %record.revision, "storing latest deployment");

        tokio::task::spawn_blocking(move || save_record_atomic(&path, &record))
            .await
            .map_err(StoreError::from)??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::deployment;
    use crate::types::Trigger;
    use tempfile::tempdir;

    fn fetch_request(root: &str) -> FetchLatestDeploymentRequest {
        FetchLatestDeploymentRequest {
            full_repository_name: "acme/infra".to_string(),
            root_name: root.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = tempdir().unwrap();
        let store = FileDeploymentStore::new(dir.path());

        let got = store.fetch_latest_deployment(fetch_request("prod")).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn stored_record_is_fetched_back() {
        let dir = tempdir().unwrap();
        let store = FileDeploymentStore::new(dir.path());
        let record = deployment("abc", Trigger::Manual).to_record();

        store
            .store_latest_deployment(StoreLatestDeploymentRequest {
                deployment: record.clone(),
            })
            .await
            .unwrap();

        assert!(dir.path().join("acme/infra/prod/deployment.json").exists());
        assert!(!dir.path().join("acme/infra/prod/deployment.json.tmp").exists());
        let got = store.fetch_latest_deployment(fetch_request("prod")).await.unwrap();
        assert_eq!(got, Some(record));
    }

    #[tokio::test]
    async fn later_store_overwrites() {
        let dir = tempdir().unwrap();
        let store = FileDeploymentStore::new(dir.path());

        for rev in ["first", "second"] {
            store
                .store_latest_deployment(StoreLatestDeploymentRequest {
                    deployment: deployment(rev, Trigger::Merge).to_record(),
                })
                .await
                .unwrap();
        }

        let got = store.fetch_latest_deployment(fetch_request("prod")).await.unwrap();
        assert_eq!(got.unwrap().revision.as_str(), "second");
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deployment.json");
        let mut record = deployment("abc", Trigger::Merge).to_record();
        record.version = 99;
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

        assert!(matches!(
            load_record(&path),
            Err(StoreError::SchemaMismatch { expected: 1, got: 99 })
        ));
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let store = FileDeploymentStore::new("/var/lib/deploy-train");
        assert!(store.path_for_key("acme/../../etc/deployment.json").is_err());
        assert!(store.path_for_key("acme//deployment.json").is_err());
        assert_eq!(
            store.path_for_key("acme/infra/prod/deployment.json").unwrap(),
            PathBuf::from("/var/lib/deploy-train/acme/infra/prod/deployment.json")
        );
    }

    #[test]
    fn malformed_repository_name_maps_to_permanent_error() {
        let err: ActivityError = StoreError::InvalidKey("nope".to_string()).into();
        assert!(!err.is_transient());
    }
}
