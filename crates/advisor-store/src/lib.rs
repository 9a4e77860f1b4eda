//! Redis-backed durable state for the academic advisor backend.

pub mod redis_kv;

pub use redis_kv::RedisKv;

/// `ProfileStore` specialized over the Redis-backed `KvStore`.
pub type RedisProfileStore = advisor_core::profile_store::ProfileStore<RedisKv>;

/// `ConversationStore` specialized over the Redis-backed `KvStore`.
pub type RedisConversationStore = advisor_core::conversation_store::ConversationStore<RedisKv>;

/// `TagCache` specialized over the Redis-backed `KvStore`.
pub type RedisTagCache = advisor_core::tag_cache::TagCache<RedisKv>;

/// `ProvenanceStore` specialized over the Redis-backed `KvStore`.
pub type RedisProvenanceStore = advisor_core::provenance::ProvenanceStore<RedisKv>;
