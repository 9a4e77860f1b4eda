//! `LLMRouter` contract — spec section 4.8. The concrete primary/fallback
//! race lives in `advisor-llm`; this module defines the seam the
//! orchestrator depends on.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;

/// A single streamed token, tagged with which backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamToken {
    pub text: String,
    pub provider: String,
    pub is_fallback: bool,
}

/// A boxed stream of tokens, terminating normally or with an `Err`.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamToken>> + Send>>;

/// Router over a primary and fallback OpenAI-compatible streaming chat
/// completion backend.
#[async_trait]
pub trait LlmRouter: Send + Sync {
    /// Start streaming a completion for `messages`. Internally races the
    /// primary backend's first token against `first_token_deadline`,
    /// falling back on timeout.
    async fn stream_chat(&self, messages: &[(String, String)]) -> Result<TokenStream>;

    /// Non-streaming structured JSON completion, used by the schema
    /// enforcer's re-ask pass.
    async fn complete_json_structured(
        &self,
        prompt: &str,
        schema_json: &str,
        max_tokens: u32,
    ) -> Result<String>;
}
