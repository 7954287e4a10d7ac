//! Two-tier snapshot cache: an expiring fast tier over a durable JSON file.
//!
//! Both tiers hold exactly one document under [`CACHE_KEY`]. Writes replace the
//! whole document, so a reader sees either the previous snapshot or the new
//! one, never a mix. Tier failures are independent: a failed fast-tier write
//! does not stop the durable write and vice versa.

pub mod file;
pub mod memory;
pub mod redis;

pub use file::FileTier;
pub use memory::MemoryTier;
pub use redis::RedisTier;

use crate::snapshot::Snapshot;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Logical key of the cached snapshot.
pub const CACHE_KEY: &str = "auction_data";

/// Fast-tier expiry. Longer than the refresh period so a healthy scheduler
/// always replaces the entry before it lapses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(420);

/// Upper bound on any single tier operation.
pub const TIER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to encode snapshot")]
    Encode(#[source] serde_json::Error),
    #[error("cached snapshot is corrupt: {0}")]
    Corrupt(String),
    #[error("redis command failed")]
    Redis(#[from] ::redis::RedisError),
    #[error("i/o on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{tier} tier timed out after {after:?}")]
    Timeout { tier: Tier, after: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    Durable,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Tier::Fast => "fast",
            Tier::Durable => "durable",
        })
    }
}

/// The expiring tier in front of the durable file.
#[async_trait]
pub trait FastTier: Send + Sync {
    /// Short backend name for logs and status output.
    fn backend(&self) -> &'static str;

    /// The current entry, or `None` when absent or expired.
    async fn load(&self) -> Result<Option<Arc<Snapshot>>, CacheError>;

    /// Replace the entry. `encoded` is the JSON form of `snapshot`.
    ///
    /// Returns `false` without writing when the tier already holds a snapshot
    /// with a later `last_refreshed`.
    async fn store(
        &self,
        snapshot: Arc<Snapshot>,
        encoded: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;
}

/// Which tiers accepted a `put`. A tier that kept a newer snapshot did not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PutReport {
    pub fast: bool,
    pub durable: bool,
}

impl PutReport {
    pub fn any_written(&self) -> bool {
        self.fast || self.durable
    }
}

/// A snapshot found in one of the tiers.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub snapshot: Arc<Snapshot>,
    pub tier: Tier,
}

/// Decode a cached document, reporting the JSON path of the first bad field.
pub(crate) fn decode_snapshot(body: &str) -> Result<Snapshot, CacheError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        if path.is_empty() || path == "." {
            CacheError::Corrupt(inner.to_string())
        } else {
            CacheError::Corrupt(format!("at path '{path}': {inner}"))
        }
    })
}

/// Shared handle over both tiers. Clone-cheap.
#[derive(Clone)]
pub struct CacheStore {
    fast: Arc<dyn FastTier>,
    durable: Arc<FileTier>,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(fast: Arc<dyn FastTier>, durable: FileTier, ttl: Duration) -> Self {
        Self {
            fast,
            durable: Arc::new(durable),
            ttl,
        }
    }

    pub fn fast_backend(&self) -> &'static str {
        self.fast.backend()
    }

    pub fn durable_path(&self) -> &std::path::Path {
        self.durable.path()
    }

    /// Write `snapshot` to both tiers. Never fails; the report says which
    /// tiers took the write and each failure is logged on its own.
    pub async fn put(&self, snapshot: Arc<Snapshot>) -> PutReport {
        let encoded = match serde_json::to_string(&*snapshot) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = ?CacheError::Encode(e), "Failed to serialize snapshot");
                return PutReport::default();
            }
        };

        let fast_write = async {
            match timeout(
                TIER_TIMEOUT,
                self.fast.store(snapshot.clone(), &encoded, self.ttl),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout {
                    tier: Tier::Fast,
                    after: TIER_TIMEOUT,
                }),
            }
        };
        let durable_write = async {
            match timeout(TIER_TIMEOUT, self.durable.store(&snapshot, &encoded)).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout {
                    tier: Tier::Durable,
                    after: TIER_TIMEOUT,
                }),
            }
        };

        let (fast, durable) = tokio::join!(fast_write, durable_write);

        let fast = match fast {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    backend = self.fast.backend(),
                    incoming = %snapshot.last_refreshed,
                    "Fast tier holds a newer snapshot, write skipped"
                );
                false
            }
            Err(e) => {
                error!(backend = self.fast.backend(), error = ?e, "Fast tier write failed");
                false
            }
        };
        let durable = match durable {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    path = %self.durable.path().display(),
                    incoming = %snapshot.last_refreshed,
                    "Durable tier holds a newer snapshot, write skipped"
                );
                false
            }
            Err(e) => {
                error!(path = %self.durable.path().display(), error = ?e, "Durable tier write failed");
                false
            }
        };

        debug!(fast, durable, bytes = encoded.len(), "Snapshot written");
        PutReport { fast, durable }
    }

    /// Find the current snapshot: fast tier first, then the durable file.
    ///
    /// Errors and corrupt documents count as misses.
    pub async fn lookup(&self) -> Option<CacheHit> {
        match timeout(TIER_TIMEOUT, self.fast.load()).await {
            Ok(Ok(Some(snapshot))) => {
                return Some(CacheHit {
                    snapshot,
                    tier: Tier::Fast,
                });
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(backend = self.fast.backend(), error = ?e, "Fast tier read failed"),
            Err(_) => warn!(
                backend = self.fast.backend(),
                timeout = ?TIER_TIMEOUT,
                "Fast tier read timed out"
            ),
        }

        match timeout(TIER_TIMEOUT, self.durable.load()).await {
            Ok(Ok(Some(snapshot))) => Some(CacheHit {
                snapshot,
                tier: Tier::Durable,
            }),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(path = %self.durable.path().display(), error = ?e, "Durable tier read failed");
                None
            }
            Err(_) => {
                warn!(timeout = ?TIER_TIMEOUT, "Durable tier read timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot(secs: i64) -> Arc<Snapshot> {
        Arc::new(Snapshot::empty(Utc.timestamp_opt(secs, 0).unwrap()))
    }

    fn store(dir: &tempfile::TempDir) -> CacheStore {
        CacheStore::new(
            Arc::new(MemoryTier::new()),
            FileTier::new(dir.path().join("auction_data.json")),
            DEFAULT_TTL,
        )
    }

    #[tokio::test]
    async fn put_reports_both_tiers_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_eq!(
            store.put(snapshot(1_000)).await,
            PutReport {
                fast: true,
                durable: true
            }
        );
    }

    #[tokio::test]
    async fn older_put_is_reported_as_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.put(snapshot(2_000)).await;

        let report = store.put(snapshot(1_000)).await;
        assert!(!report.any_written(), "{report:?}");

        let hit = store.lookup().await.unwrap();
        assert_eq!(hit.snapshot.last_refreshed.timestamp(), 2_000);
    }

    #[test]
    fn decode_reports_path_of_bad_field() {
        let body = r#"{"kpis": {}, "grid": "oops", "last_refreshed": "2025-06-01T00:00:00Z"}"#;
        let err = decode_snapshot(body).unwrap_err().to_string();
        assert!(err.contains("grid"), "{err}");
    }

    #[test]
    fn decode_rejects_truncated_document() {
        assert!(matches!(
            decode_snapshot(r#"{"kpis": {"#),
            Err(CacheError::Corrupt(_))
        ));
        assert!(matches!(decode_snapshot(""), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn decode_requires_refresh_timestamp() {
        assert!(decode_snapshot(r#"{"kpis": {}}"#).is_err());
    }

    #[test]
    fn put_report_any_written() {
        assert!(!PutReport::default().any_written());
        assert!(
            PutReport {
                fast: false,
                durable: true
            }
            .any_written()
        );
    }
}
