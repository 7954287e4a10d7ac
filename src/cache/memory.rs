//! In-process fast tier.
//!
//! Holds the typed snapshot behind a `watch` channel, so reads are a cheap
//! `Arc` clone with no JSON round-trip and a write is a single pointer swap.

use crate::cache::{CacheError, FastTier};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Entry {
    snapshot: Arc<Snapshot>,
    expires_at: Instant,
}

pub struct MemoryTier {
    tx: watch::Sender<Option<Arc<Entry>>>,
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }
}

#[async_trait]
impl FastTier for MemoryTier {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Option<Arc<Snapshot>>, CacheError> {
        let snapshot = {
            let current = self.tx.borrow();
            current
                .as_ref()
                .filter(|entry| Instant::now() < entry.expires_at)
                .map(|entry| entry.snapshot.clone())
        };
        Ok(snapshot)
    }

    async fn store(
        &self,
        snapshot: Arc<Snapshot>,
        _encoded: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let incoming = snapshot.last_refreshed;
        let replaced = self.tx.send_if_modified(|current| {
            // Never let a slower writer roll the tier back to an older snapshot.
            if let Some(existing) = current
                && existing.snapshot.last_refreshed > incoming
            {
                return false;
            }
            *current = Some(Arc::new(Entry {
                snapshot,
                expires_at: Instant::now() + ttl,
            }));
            true
        });
        if !replaced {
            debug!(%incoming, "Ignoring snapshot older than the cached one");
        }
        Ok(replaced)
    }
}
