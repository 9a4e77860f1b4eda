//! `ConversationStore` — spec section 4.12.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::types::{ConversationMessage, ConversationState, StudentProfile, MAX_CONVERSATION_MESSAGES};

const DEFAULT_TTL_DAYS: u64 = 7;

fn key(id: &str) -> String {
    format!("conversation:{id}")
}

/// Conversation history, bounded to the last [`MAX_CONVERSATION_MESSAGES`]
/// turns, with its profile mirrored under the shared `student_profile:{sid}`
/// key so `ProfileStore` sees the same state.
pub struct ConversationStore<K: KvStore> {
    kv: Arc<K>,
    ttl_seconds: u64,
}

impl<K: KvStore> Clone for ConversationStore<K> {
    fn clone(&self) -> Self {
        Self { kv: Arc::clone(&self.kv), ttl_seconds: self.ttl_seconds }
    }
}

impl<K: KvStore> ConversationStore<K> {
    #[must_use]
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            ttl_seconds: DEFAULT_TTL_DAYS * 86_400,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ConversationState>> {
        match self.kv.get(&key(id)).await? {
            Some(raw) => {
                let mut state: ConversationState = serde_json::from_str(&raw)
                    .map_err(|e| Error::Internal(format!("corrupt conversation {id}: {e}")))?;
                while state.messages.len() > MAX_CONVERSATION_MESSAGES {
                    state.messages.remove(0);
                }
                self.kv.expire(&key(id), self.ttl_seconds).await?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Load an existing conversation or start a fresh one for `profile`.
    pub async fn get_or_create(&self, id: &str, profile: StudentProfile) -> Result<ConversationState> {
        match self.get(id).await? {
            Some(state) => Ok(state),
            None => Ok(ConversationState::new(id, profile)),
        }
    }

    pub async fn put(&self, state: &ConversationState) -> Result<()> {
        let serialized = serde_json::to_string(state)
            .map_err(|e| Error::Internal(format!("failed to serialize conversation: {e}")))?;
        self.kv
            .setex(&key(&state.id), &serialized, self.ttl_seconds)
            .await?;
        self.mirror_profile_update(&state.id, &state.profile).await
    }

    /// Append a single message and persist, without re-serializing the
    /// whole conversation twice.
    pub async fn append(&self, id: &str, profile: StudentProfile, message: ConversationMessage) -> Result<ConversationState> {
        let mut state = self.get_or_create(id, profile).await?;
        state.push_message(message);
        self.put(&state).await?;
        Ok(state)
    }

    async fn mirror_profile_update(&self, conversation_id: &str, profile: &StudentProfile) -> Result<()> {
        let mirror_key = format!("student_profile:{}", profile.id);
        let serialized = serde_json::to_string(profile)
            .map_err(|e| Error::Internal(format!("failed to serialize mirrored profile: {e}")))?;
        tracing::trace!(conversation_id, profile_id = %profile.id, "mirroring profile update");
        self.kv.setex(&mirror_key, &serialized, self.ttl_seconds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::CasOutcome;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc as StdArc;

    #[derive(Default)]
    struct MemKv {
        data: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KvStore for MemKv {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.data.lock().get(key).cloned())
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.data.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn setex(&self, key: &str, value: &str, _ttl_seconds: u64) -> Result<()> {
            self.set(key, value).await
        }
        async fn incr(&self, key: &str) -> Result<i64> {
            let mut data = self.data.lock();
            let next = data
                .get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
                + 1;
            data.insert(key.to_string(), next.to_string());
            Ok(next)
        }
        async fn expire(&self, _key: &str, _ttl_seconds: u64) -> Result<()> {
            Ok(())
        }
        async fn sadd(&self, _key: &str, _member: &str) -> Result<bool> {
            Ok(true)
        }
        async fn scard(&self, _key: &str) -> Result<i64> {
            Ok(0)
        }
        async fn del(&self, key: &str) -> Result<()> {
            self.data.lock().remove(key);
            Ok(())
        }
        async fn merge_atomic(
            &self,
            key: &str,
            _ttl_seconds: u64,
            merge: Box<dyn FnOnce(Option<String>) -> String + Send>,
        ) -> Result<CasOutcome> {
            let mut data = self.data.lock();
            let existing = data.get(key).cloned();
            let created = existing.is_none();
            let merged = merge(existing);
            data.insert(key.to_string(), merged);
            Ok(if created { CasOutcome::Created } else { CasOutcome::Merged })
        }
    }

    fn message(role: crate::types::MessageRole, text: &str) -> ConversationMessage {
        ConversationMessage {
            role,
            content: text.to_string(),
            ts: chrono::Utc::now(),
            tokens: None,
        }
    }

    #[tokio::test]
    async fn append_persists_and_reads_back() {
        let kv = StdArc::new(MemKv::default());
        let store = ConversationStore::new(kv);
        let profile = StudentProfile::default_for("s1");

        store
            .append("conv1", profile.clone(), message(crate::types::MessageRole::User, "hi"))
            .await
            .unwrap();

        let state = store.get("conv1").await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "hi");
    }

    #[tokio::test]
    async fn history_stays_bounded_at_twenty() {
        let kv = StdArc::new(MemKv::default());
        let store = ConversationStore::new(kv);
        let profile = StudentProfile::default_for("s1");

        let mut state = ConversationState::new("conv1", profile);
        for i in 0..30 {
            state.push_message(message(crate::types::MessageRole::User, &format!("msg {i}")));
        }
        store.put(&state).await.unwrap();

        let reloaded = store.get("conv1").await.unwrap().unwrap();
        assert_eq!(reloaded.messages.len(), MAX_CONVERSATION_MESSAGES);
        assert_eq!(reloaded.messages.first().unwrap().content, "msg 10");
        assert_eq!(reloaded.messages.last().unwrap().content, "msg 29");
    }

    #[tokio::test]
    async fn put_mirrors_profile_under_shared_key() {
        let kv = StdArc::new(MemKv::default());
        let store = ConversationStore::new(StdArc::clone(&kv));
        let mut profile = StudentProfile::default_for("s7");
        profile.major = Some("CS".to_string());
        let state = ConversationState::new("conv7", profile);
        store.put(&state).await.unwrap();

        let mirrored = kv.get("student_profile:s7").await.unwrap();
        assert!(mirrored.is_some());
    }
}
