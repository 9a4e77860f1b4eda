//! The `KvStore` trait: the minimal atomic contract every durable-state
//! component (`TagCache`, `ProvenanceStore`, `ProfileStore`,
//! `ConversationStore`) is built against. `advisor-store` supplies the
//! Redis-backed implementation; tests use an in-memory one.

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of a CAS-style merge script invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// No prior value existed; the incoming value was stored as-is.
    Created,
    /// A prior value existed and was merged with the incoming value.
    Merged,
}

/// Atomic key-value contract over the external store (spec section 6:
/// `GET, SET, SETEX, INCR, EXPIRE, DEL, SCARD, SADD`, atomic script
/// evaluation).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn setex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;
    async fn incr(&self, key: &str) -> Result<i64>;
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;
    async fn scard(&self, key: &str) -> Result<i64>;
    async fn del(&self, key: &str) -> Result<()>;

    /// Run the server-side atomic merge script used by `ProfileStore`. The
    /// `merge` closure computes the new value from the (optional) existing
    /// one; implementations must execute `get` + `merge` + `set`
    /// atomically (a Lua `EVAL` script over Redis). Returns whether a prior
    /// value existed.
    async fn merge_atomic(
        &self,
        key: &str,
        ttl_seconds: u64,
        merge: Box<dyn FnOnce(Option<String>) -> String + Send>,
    ) -> Result<CasOutcome>;
}
