use crate::db::{Database, StoreError};

/// Confirms the snapshot directory is still reachable for file-backed stores.
pub(crate) async fn ping(db: &Database) -> Result<(), StoreError> {
    let Some(path) = db.path() else {
        return Ok(());
    };

    let dir = match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => std::path::PathBuf::from("."),
    };

    tokio::fs::metadata(&dir)
        .await
        .map(|_| ())
        .map_err(|source| StoreError::Io { path: dir.display().to_string(), source })
}
