//! JSON snapshot files written between pipeline stages.
//!
//! Category discovery writes `categories.json`; product collection reads it
//! back and writes `products.json`. Writes go to a temp file in the same
//! directory and are renamed into place so a reader never sees a partial file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

const CATEGORIES_FILE: &str = "categories.json";
const PRODUCTS_FILE: &str = "products.json";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode snapshot {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode snapshot {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot not found: {path}")]
    NotFound { path: String },
}

/// Serializes `items` as a pretty JSON array and atomically replaces `path`.
///
/// # Errors
///
/// Returns [`SnapshotError::Encode`] if serialization fails, or
/// [`SnapshotError::Io`] if the directory, temp file, or rename fails.
pub fn write_snapshot<T: Serialize>(path: &Path, items: &[T]) -> Result<(), SnapshotError> {
    let shown = path.display().to_string();
    let io_err = |source| SnapshotError::Io {
        path: shown.clone(),
        source,
    };

    let body = serde_json::to_vec_pretty(items).map_err(|source| SnapshotError::Encode {
        path: shown.clone(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp, &body).map_err(io_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(e));
    }

    tracing::info!(path = %shown, count = items.len(), "snapshot written");
    Ok(())
}

/// Reads a JSON array snapshot from `path`.
///
/// # Errors
///
/// Returns [`SnapshotError::NotFound`] if the file does not exist,
/// [`SnapshotError::Io`] for other read failures, and
/// [`SnapshotError::Decode`] if the content is not the expected array.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SnapshotError> {
    let shown = path.display().to_string();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::NotFound { path: shown });
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: shown,
                source,
            })
        }
    };

    let items: Vec<T> = serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Decode {
        path: shown.clone(),
        source,
    })?;
    tracing::debug!(path = %shown, count = items.len(), "snapshot read");
    Ok(items)
}

/// Fixed snapshot locations under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn categories_path(&self) -> PathBuf {
        self.dir.join(CATEGORIES_FILE)
    }

    #[must_use]
    pub fn products_path(&self) -> PathBuf {
        self.dir.join(PRODUCTS_FILE)
    }
}
