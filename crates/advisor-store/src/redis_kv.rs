//! Redis-backed `KvStore`, grounded on the connection-manager setup in
//! `dashflow-redis`'s vector store adapter.

use std::time::Duration;

use advisor_core::error::{Error, Result};
use advisor_core::kv::{CasOutcome, KvStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const SERVICE: &str = "redis";

/// Sentinel compared against by the CAS script when no prior value exists;
/// real profile/conversation JSON can never collide with it.
const ABSENT_SENTINEL: &str = "\u{0}NONE\u{0}";

const CAS_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
local expected = ARGV[1]
if expected == '\0NONE\0' then
  if current then return 0 end
else
  if current ~= expected then return 0 end
end
redis.call('SETEX', KEYS[1], tonumber(ARGV[3]), ARGV[2])
return 1
";

pub struct RedisKv {
    connection_manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisKv {
    /// Connect and verify reachability. `op_timeout` bounds every
    /// subsequent command (spec section 6's `REDIS_OP_TIMEOUT_MS`).
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::UpstreamUnavailable {
            service: SERVICE.to_string(),
            detail: format!("invalid redis url: {e}"),
        })?;
        let connection_manager =
            ConnectionManager::new(client)
                .await
                .map_err(|e| Error::UpstreamUnavailable {
                    service: SERVICE.to_string(),
                    detail: format!("failed to establish connection manager: {e}"),
                })?;
        Ok(Self {
            connection_manager,
            op_timeout,
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }

    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = redis::RedisResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::UpstreamUnavailable {
                service: SERVICE.to_string(),
                detail: e.to_string(),
            }),
            Err(_) => Err(Error::UpstreamTimeout {
                service: SERVICE.to_string(),
                elapsed_ms: self.op_timeout.as_millis() as u64,
            }),
        }
    }

    /// Cheap reachability probe for `/health`.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn();
        self.with_timeout(redis::cmd("PING").query_async::<String>(&mut conn))
            .await
            .is_ok()
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        self.with_timeout(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        self.with_timeout(conn.set(key, value)).await
    }

    async fn setex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn();
        self.with_timeout(conn.set_ex(key, value, ttl_seconds)).await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn();
        self.with_timeout(conn.incr(key, 1)).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn();
        self.with_timeout(conn.expire(key, ttl_seconds as i64)).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn();
        let added: i64 = self.with_timeout(conn.sadd(key, member)).await?;
        Ok(added > 0)
    }

    async fn scard(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn();
        self.with_timeout(conn.scard(key)).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        self.with_timeout(conn.del(key)).await
    }

    /// Optimistic CAS via a Lua `EVAL` script: read the current value,
    /// compute the merge in Rust (`merge` runs exactly once, satisfying its
    /// `FnOnce` bound), then swap only if nothing changed underneath us. A
    /// losing race surfaces as `Error::CasConflict`, distinct from
    /// infrastructure failure, so `ProfileStore` can retry the atomic path.
    async fn merge_atomic(
        &self,
        key: &str,
        ttl_seconds: u64,
        merge: Box<dyn FnOnce(Option<String>) -> String + Send>,
    ) -> Result<CasOutcome> {
        let existing = self.get(key).await?;
        let created = existing.is_none();
        let expected = existing.clone().unwrap_or_else(|| ABSENT_SENTINEL.to_string());
        let merged_value = merge(existing);

        let mut conn = self.conn();
        let script = redis::Script::new(CAS_SCRIPT);
        let swapped: i64 = self
            .with_timeout(
                script
                    .key(key)
                    .arg(&expected)
                    .arg(&merged_value)
                    .arg(ttl_seconds)
                    .invoke_async(&mut conn),
            )
            .await?;

        if swapped == 1 {
            Ok(if created { CasOutcome::Created } else { CasOutcome::Merged })
        } else {
            Err(Error::CasConflict(key.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_sentinel_cannot_collide_with_json() {
        let profile_json = r#"{"id":"s1","major":null}"#;
        assert_ne!(profile_json, ABSENT_SENTINEL);
    }
}
