//! `ChatOrchestrator` — spec section 4.1.
//!
//! Fans context providers out under a shared deadline, assembles a
//! token-bounded prompt, streams the primary/fallback completion through
//! the resilient event channel, and enforces the response envelope before
//! persisting the turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::{info, instrument, warn};

use crate::config::AdvisorConfig;
use crate::context_provider::ContextProvider;
use crate::conversation_store::ConversationStore;
use crate::error::Result;
use crate::event_channel::{self, ChannelConfig, DisconnectSignal, Frame, ProducerItem, ProducerResult};
use crate::kv::KvStore;
use crate::llm::LlmRouter;
use crate::metrics;
use crate::profile_store::ProfileStore;
use crate::schema_enforcer;
use crate::token_budget::TokenBudgetManager;
use crate::types::{
    ChatAdvisorResponse, ConversationMessage, ConversationState, MessageRole, Recommendation, StudentProfile,
};

const RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "required": ["recommendations"],
  "properties": {
    "recommendations": {"type": "array", "maxItems": 5, "items": {
      "type": "object",
      "required": ["course_code", "title", "rationale", "priority", "next_action"],
      "properties": {
        "course_code": {"type": "string"},
        "title": {"type": "string"},
        "rationale": {"type": "string"},
        "priority": {"type": "integer"},
        "next_action": {"enum": ["add_to_plan", "check_prereqs", "consider_alternative", "waitlist_monitor"]},
        "difficulty_warning": {"type": ["string", "null"]}
      }
    }},
    "constraints": {"type": "array", "items": {"type": "string"}},
    "next_actions": {"type": "array", "items": {"type": "object"}},
    "notes": {"type": ["string", "null"]},
    "provenance": {"type": "array", "items": {"type": "string"}}
  }
}"#;

/// Composes the context, completion, and enforcement stages behind a single
/// chat turn.
pub struct ChatOrchestrator<K: KvStore> {
    providers: Vec<Arc<dyn ContextProvider>>,
    llm: Arc<dyn LlmRouter>,
    conversations: ConversationStore<K>,
    profiles: ProfileStore<K>,
    budget: TokenBudgetManager,
    config: AdvisorConfig,
}

impl<K: KvStore> ChatOrchestrator<K> {
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn ContextProvider>>,
        llm: Arc<dyn LlmRouter>,
        kv: Arc<K>,
        config: AdvisorConfig,
    ) -> Self {
        let budget = TokenBudgetManager::new(config.prompt_token_ceiling);
        Self {
            providers,
            llm,
            conversations: ConversationStore::new(Arc::clone(&kv)),
            profiles: ProfileStore::new(kv),
            budget,
            config,
        }
    }

    /// Run every provider under `context_timeout_ms`, discarding any that
    /// time out or decline to answer.
    #[instrument(skip(self, message, profile), fields(provider_count = self.providers.len()))]
    async fn gather_context(
        &self,
        message: &str,
        profile: &StudentProfile,
    ) -> HashMap<String, (serde_json::Value, u64)> {
        let deadline = Duration::from_millis(self.config.context_timeout_ms);
        let futures = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let message = message.to_string();
            let profile = profile.clone();
            async move {
                let started = Instant::now();
                let result = tokio::time::timeout(deadline, provider.fetch(&message, &profile)).await;
                metrics::observe_context_provider_ms(started.elapsed().as_secs_f64() * 1000.0);
                match result {
                    Ok(Some(output)) => Some((provider.kind().as_str().to_string(), output)),
                    Ok(None) => None,
                    Err(_) => {
                        warn!(provider = provider.kind().as_str(), "context provider timed out");
                        None
                    }
                }
            }
        });

        futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .map(|(name, output)| (name, (output.data, output.version)))
            .collect()
    }

    fn build_sections(
        &self,
        profile: &StudentProfile,
        history: &[ConversationMessage],
        context: &HashMap<String, (serde_json::Value, u64)>,
    ) -> HashMap<String, String> {
        let mut sections = HashMap::new();
        sections.insert(
            "student_profile".to_string(),
            serde_json::to_string(profile).unwrap_or_default(),
        );
        let history_text = history
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        sections.insert("conversation_history".to_string(), history_text);
        sections.insert(
            "system_template".to_string(),
            "You are an academic advisor. Respond with a single JSON object matching the \
             required schema. Use only the provided context; do not invent course codes."
                .to_string(),
        );
        for (name, (data, _version)) in context {
            sections.insert(name.clone(), data.to_string());
        }
        sections
    }

    /// Stream one chat turn. The caller owns the `DisconnectSignal` and
    /// flips it when the client connection drops. Emits `context_info`
    /// progress chunks, then `token` chunks, then a single `done` chunk
    /// carrying the enforced recommendations, provenance, and SLA flags.
    #[instrument(skip(self, message, disconnect), fields(conversation_id, student_id))]
    pub async fn chat(
        &self,
        conversation_id: &str,
        student_id: &str,
        message: String,
        disconnect: DisconnectSignal,
    ) -> Result<impl futures::Stream<Item = Frame>>
    where
        K: 'static,
    {
        let profile = self
            .profiles
            .get(student_id)
            .await?
            .unwrap_or_else(|| StudentProfile::default_for(student_id));
        let mut conversation = self
            .conversations
            .get_or_create(conversation_id, profile.clone())
            .await?;

        conversation.push_message(ConversationMessage {
            role: MessageRole::User,
            content: message.clone(),
            ts: chrono::Utc::now(),
            tokens: None,
        });
        self.conversations.put(&conversation).await?;

        let context = self.gather_context(&message, &profile).await;
        let context_timeout_hit = context.len() < self.providers.len();
        let providers_seen: Vec<String> = context.keys().cloned().collect();
        let sections = self.build_sections(&profile, conversation.tail(20), &context);
        let prompt = self.budget.assemble(sections, conversation.messages.len());

        let llm_messages = vec![
            ("system".to_string(), prompt.clone()),
            ("user".to_string(), message.clone()),
        ];
        let token_stream = self.llm.stream_chat(&llm_messages).await?;

        let llm = Arc::clone(&self.llm);
        let conversations = self.conversations.clone();
        let conversation_id = conversation_id.to_string();
        let first_token_deadline_ms = self.config.first_token_deadline_ms;
        let started = Instant::now();

        let producer = async_stream::stream! {
            yield Ok(ProducerItem {
                event: "context_info".to_string(),
                data: serde_json::json!({ "status": "loading_context" }).to_string(),
            });
            yield Ok(ProducerItem {
                event: "context_info".to_string(),
                data: serde_json::json!({
                    "status": "building_prompt",
                    "providers": providers_seen,
                    "context_timeout_hit": context_timeout_hit,
                }).to_string(),
            });

            let mut full_text = String::new();
            let mut stream = token_stream;
            let mut saw_first = false;
            let mut first_token_ms: f64 = 0.0;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(token) => {
                        if !saw_first {
                            saw_first = true;
                            first_token_ms = started.elapsed().as_secs_f64() * 1000.0;
                            metrics::observe_chat_first_token_ms(first_token_ms);
                        }
                        full_text.push_str(&token.text);
                        yield Ok(ProducerItem { event: "token".to_string(), data: token.text });
                    }
                    Err(e) => {
                        yield Err(e.to_string());
                        return;
                    }
                }
            }

            let enforced = enforce_response(llm.as_ref(), &full_text).await;

            if let Err(e) = conversations.append(
                &conversation_id,
                profile.clone(),
                ConversationMessage {
                    role: MessageRole::Assistant,
                    content: full_text,
                    ts: chrono::Utc::now(),
                    tokens: None,
                },
            ).await {
                warn!(error = %e, "failed to persist assistant turn");
            }

            let done_payload = serde_json::json!({
                "recommended_courses": enforced.recommendations,
                "provenance_info": enforced.provenance,
                "constraints": enforced.constraints,
                "next_actions": enforced.next_actions,
                "notes": enforced.notes,
                "sla": {
                    "first_token_ms": first_token_ms,
                    "first_token_deadline_ms": first_token_deadline_ms,
                    "first_token_deadline_met": first_token_ms <= first_token_deadline_ms as f64,
                    "context_timeout_hit": context_timeout_hit,
                },
            });
            yield Ok(ProducerItem { event: "done".to_string(), data: done_payload.to_string() });
        };

        let channel_config = ChannelConfig {
            heartbeat_interval: self.config.heartbeat_interval,
            disconnect_poll_interval: self.config.disconnect_poll_interval,
        };

        Ok(event_channel::run(Box::pin(producer), disconnect, channel_config))
    }

    /// Non-streaming detail request for a single course recommendation.
    #[instrument(skip(self, message))]
    pub async fn explain(&self, student_id: &str, course_code: &str, message: &str) -> Result<String> {
        let profile = self
            .profiles
            .get(student_id)
            .await?
            .unwrap_or_else(|| StudentProfile::default_for(student_id));
        let context = self.gather_context(message, &profile).await;
        let sections = self.build_sections(&profile, &[], &context);
        let base_prompt = self.budget.assemble(sections, 0);
        let prompt = format!(
            "{base_prompt}\n\nExplain the recommendation for {course_code} in two or three sentences, referencing only the provided context."
        );

        let mut stream = self
            .llm
            .stream_chat(&[("system".to_string(), prompt), ("user".to_string(), message.to_string())])
            .await?;

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item?.text);
        }
        Ok(out)
    }

    /// Fetch a conversation's current state, for `/api/chat/conversation/{id}`.
    pub async fn conversation(&self, id: &str) -> Result<Option<ConversationState>> {
        self.conversations.get(id).await
    }

    /// Persist a completed turn's assistant message and recommendations.
    pub async fn record_turn(
        &self,
        conversation_id: &str,
        profile: StudentProfile,
        assistant_text: String,
        recommendations: Vec<Recommendation>,
    ) -> Result<()> {
        let mut conversation = self.conversations.get_or_create(conversation_id, profile).await?;
        conversation.push_message(ConversationMessage {
            role: MessageRole::Assistant,
            content: assistant_text,
            ts: chrono::Utc::now(),
            tokens: None,
        });
        conversation.active_recommendations = recommendations;
        self.conversations.put(&conversation).await
    }
}

/// Decode/validate/sanitize the accumulated completion, re-asking once on
/// failure and falling back to the regex extractor on a second failure.
async fn enforce_response(llm: &dyn LlmRouter, raw: &str) -> ChatAdvisorResponse {
    let started = Instant::now();

    let result = match schema_enforcer::decode_and_validate(raw) {
        Ok(response) => {
            metrics::record_json_pass("chat");
            schema_enforcer::sanitize(response)
        }
        Err(e) => {
            info!(reason = %e, "schema enforcement failed, re-asking");
            let reask_prompt = schema_enforcer::build_reask_prompt(raw, RESPONSE_SCHEMA);
            match llm.complete_json_structured(&reask_prompt, RESPONSE_SCHEMA, 512).await {
                Ok(retry_raw) => match schema_enforcer::decode_and_validate(&retry_raw) {
                    Ok(response) => {
                        metrics::record_json_retry_pass("chat");
                        schema_enforcer::sanitize(response)
                    }
                    Err(e) => {
                        warn!(error = %e, "re-ask failed schema validation, using regex fallback");
                        metrics::record_json_fail("chat");
                        metrics::record_json_fallback("chat");
                        fallback_response(raw)
                    }
                },
                Err(e) => {
                    warn!(error = %e, "re-ask completion failed, using regex fallback");
                    metrics::record_json_fail("chat");
                    metrics::record_json_fallback("chat");
                    fallback_response(raw)
                }
            }
        }
    };

    metrics::observe_json_enforce_ms(started.elapsed().as_secs_f64() * 1000.0);
    result
}

fn fallback_response(raw: &str) -> ChatAdvisorResponse {
    ChatAdvisorResponse {
        recommendations: schema_enforcer::regex_fallback_recommendations(raw),
        constraints: vec![],
        next_actions: vec![],
        notes: Some("Response reconstructed from unstructured model output.".to_string()),
        provenance: vec![],
    }
}
