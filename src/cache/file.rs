//! Durable tier: the snapshot as a single JSON file with no expiry.
//!
//! Writes go to a sibling temp file which is then renamed over the target, so
//! a reader opening the file mid-write still sees the previous document.

use crate::cache::{CacheError, decode_snapshot};
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_PATH: &str = "cache/auction_data.json";

pub struct FileTier {
    path: PathBuf,
    /// Serializes writers and remembers the newest snapshot written.
    written: Mutex<Option<DateTime<Utc>>>,
}

impl FileTier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Read the file. A missing file is a miss; an unreadable document is `Corrupt`.
    pub async fn load(&self) -> Result<Option<Arc<Snapshot>>, CacheError> {
        let body = match fs::read_to_string(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };
        decode_snapshot(&body).map(|snapshot| Some(Arc::new(snapshot)))
    }

    /// Atomically replace the file with `encoded`. Returns `false` without
    /// writing when a newer snapshot was already written.
    pub async fn store(&self, snapshot: &Snapshot, encoded: &str) -> Result<bool, CacheError> {
        let mut written = self.written.lock().await;
        if let Some(newest) = *written
            && newest > snapshot.last_refreshed
        {
            debug!(
                incoming = %snapshot.last_refreshed,
                %newest,
                "Ignoring snapshot older than the one on disk"
            );
            return Ok(false);
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(parent, e))?;
        }

        let temp = self.temp_path();
        fs::write(&temp, encoded)
            .await
            .map_err(|e| self.io_error(&temp, e))?;
        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.io_error(&self.path, e));
        }

        *written = Some(snapshot.last_refreshed);
        Ok(true)
    }
}
