//! Ephemeral on-disk objects keyed by fingerprint names.
//!
//! Each object is created once, read once and deleted once. Deletion is
//! best effort: a missing object is not an error and other failures are
//! only logged, since cleanup may race with an earlier attempt.

use std::ffi::OsString;
use std::path::{PathBuf, MAIN_SEPARATOR_STR};

use tokio::fs::File;
use tracing::{debug, warn};

use crate::error::{Result, UploadError};

/// Directory-backed store for the temp objects of one or more conversions.
#[derive(Debug, Clone)]
pub struct TempObjectStore {
    dir: PathBuf,
}

impl TempObjectStore {
    /// Use `dir` as the backing directory. The directory must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: normalize_dir(dir.into()),
        }
    }

    /// Full path of the object called `name`.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Create (or truncate) the object and return a write handle.
    pub async fn create(&self, name: &str) -> Result<File> {
        let path = self.path_of(name);
        File::create(&path)
            .await
            .map_err(|e| UploadError::storage(path, e))
    }

    /// Open the object for reading from offset zero.
    pub async fn open_read(&self, name: &str) -> Result<File> {
        let path = self.path_of(name);
        File::open(&path)
            .await
            .map_err(|e| UploadError::storage(path, e))
    }

    /// Size of the object in bytes. Fails if it is missing or not a regular file.
    pub async fn len(&self, name: &str) -> Result<u64> {
        let path = self.path_of(name);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| UploadError::storage(&path, e))?;
        if !meta.is_file() {
            return Err(UploadError::storage(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(meta.len())
    }

    /// Remove the object. Idempotent.
    pub async fn delete(&self, name: &str) {
        let path = self.path_of(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Deleted temp object"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Failed to delete temp object"
            ),
        }
    }
}

/// Append a trailing path separator to `dir` if it lacks one.
pub fn normalize_dir(dir: PathBuf) -> PathBuf {
    if dir.as_os_str().to_string_lossy().ends_with(MAIN_SEPARATOR_STR) {
        return dir;
    }
    let mut raw: OsString = dir.into_os_string();
    raw.push(MAIN_SEPARATOR_STR);
    PathBuf::from(raw)
}
