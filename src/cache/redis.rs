//! Redis-backed fast tier, for deployments that share the cache across processes.

use crate::cache::{CacheError, FastTier, decode_snapshot};
use crate::snapshot::Snapshot;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Writes the document only when its stamp is not older than the stored one.
/// KEYS: document, stamp. ARGV: encoded document, stamp millis, expiry secs.
const STORE_IF_NEWER: &str = r"
local current = redis.call('GET', KEYS[2])
if current and tonumber(current) > tonumber(ARGV[2]) then
  return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
return 1
";

/// The document lives under `key`; its `last_refreshed` in epoch millis lives
/// under `{key}:last_refreshed` with the same expiry, so processes sharing the
/// key never roll it back to an older snapshot.
pub struct RedisTier {
    conn: ConnectionManager,
    key: String,
    stamp_key: String,
    store_script: Script,
}

impl RedisTier {
    /// Open a reconnecting connection to `url`. Fails if the first connect fails.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let key = key.into();
        Ok(Self {
            conn,
            stamp_key: stamp_key(&key),
            key,
            store_script: Script::new(STORE_IF_NEWER),
        })
    }
}

fn stamp_key(key: &str) -> String {
    format!("{key}:last_refreshed")
}

/// Redis rejects `SET .. EX 0`; round sub-second TTLs up to one second.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl FastTier for RedisTier {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn load(&self) -> Result<Option<Arc<Snapshot>>, CacheError> {
        let mut conn = self.conn.clone();
        let body: Option<String> = conn.get(&self.key).await?;
        body.map(|body| decode_snapshot(&body).map(Arc::new))
            .transpose()
    }

    async fn store(
        &self,
        snapshot: Arc<Snapshot>,
        encoded: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let written: i64 = self
            .store_script
            .key(&self.key)
            .key(&self.stamp_key)
            .arg(encoded)
            .arg(snapshot.last_refreshed.timestamp_millis())
            .arg(expiry_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_rounds_up_to_one_second() {
        assert_eq!(expiry_secs(Duration::from_secs(420)), 420);
        assert_eq!(expiry_secs(Duration::from_millis(300)), 1);
        assert_eq!(expiry_secs(Duration::ZERO), 1);
    }

    #[test]
    fn stamp_sits_next_to_the_document() {
        assert_eq!(stamp_key("auction_data"), "auction_data:last_refreshed");
    }
}
