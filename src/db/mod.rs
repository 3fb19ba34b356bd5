pub(crate) mod models;
pub(crate) mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::config::Settings;
use crate::db::models::{Exam, Question, Student, StudentSubmission};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store snapshot is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything the registries hold, as one serializable document.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Snapshot {
    #[serde(default)]
    pub(crate) students: Vec<Student>,
    #[serde(default)]
    pub(crate) exams: Vec<Exam>,
    #[serde(default)]
    pub(crate) questions: Vec<Question>,
    #[serde(default)]
    pub(crate) submissions: Vec<StudentSubmission>,
}

#[derive(Clone)]
pub(crate) struct Database {
    inner: Arc<InnerDatabase>,
}

struct InnerDatabase {
    snapshot: RwLock<Snapshot>,
    path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl Database {
    pub(crate) fn in_memory(snapshot: Snapshot) -> Self {
        Self::build(snapshot, None)
    }

    /// Loads the snapshot at `path`, starting empty when the file does not exist yet.
    pub(crate) async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Snapshot::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Store file missing; starting empty");
                Snapshot::default()
            }
            Err(source) => {
                return Err(StoreError::Io { path: path.display().to_string(), source });
            }
        };

        Ok(Self::build(snapshot, Some(path)))
    }

    fn build(snapshot: Snapshot, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(InnerDatabase {
                snapshot: RwLock::new(snapshot),
                path,
                persist_lock: Mutex::new(()),
            }),
        }
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.inner.snapshot.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.inner.snapshot.write().await
    }

    pub(crate) fn is_file_backed(&self) -> bool {
        self.inner.path.is_some()
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Rewrites the backing file with the current snapshot (temp file, then rename).
    pub(crate) async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = self.inner.path.as_ref() else {
            return Ok(());
        };

        let _guard = self.inner.persist_lock.lock().await;
        let bytes = {
            let snapshot = self.inner.snapshot.read().await;
            serde_json::to_vec_pretty(&*snapshot)?
        };

        let io_error =
            |source: std::io::Error| StoreError::Io { path: path.display().to_string(), source };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await.map_err(io_error)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_error)?;

        Ok(())
    }
}

pub(crate) async fn init_store(settings: &Settings) -> Result<Database, StoreError> {
    match settings.store().data_path.as_deref() {
        Some(path) => {
            let db = Database::open(path).await?;
            if tokio::fs::metadata(path).await.is_err() {
                db.persist().await?;
            }
            Ok(db)
        }
        None => {
            tracing::warn!("TUTOR_DATA_PATH is empty; registries are kept in memory only");
            Ok(Database::in_memory(Snapshot::default()))
        }
    }
}
