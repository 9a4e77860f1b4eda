//! `OpenAiRouter` — the concrete `LlmRouter`: races a primary backend's
//! first token against `first_token_deadline`, falling back on timeout or
//! immediate failure (spec section 4.8).

use std::sync::Arc;
use std::time::Duration;

use advisor_core::error::Result;
use advisor_core::llm::{LlmRouter, StreamToken, TokenStream};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::warn;

use crate::backend::CompletionBackend;

pub struct OpenAiRouter {
    primary: Arc<CompletionBackend>,
    fallback: Arc<CompletionBackend>,
    first_token_deadline: Duration,
}

impl OpenAiRouter {
    #[must_use]
    pub fn new(primary: CompletionBackend, fallback: CompletionBackend, first_token_deadline: Duration) -> Self {
        Self {
            primary: Arc::new(primary),
            fallback: Arc::new(fallback),
            first_token_deadline,
        }
    }
}

#[async_trait]
impl LlmRouter for OpenAiRouter {
    async fn stream_chat(&self, messages: &[(String, String)]) -> Result<TokenStream> {
        let primary = self.primary.clone();
        let fallback = self.fallback.clone();
        let deadline = self.first_token_deadline;
        let messages = messages.to_vec();

        let stream = async_stream::stream! {
            let primary_name = primary.name.clone();
            let attempt = async {
                let mut inner = primary.stream_completion(&messages).await?;
                let first = inner.next().await;
                Result::Ok((inner, first))
            };

            let raced = tokio::time::timeout(deadline, attempt).await;
            let mut used_primary = false;

            if let Ok(Ok((mut inner, Some(Ok(first_text))))) = raced {
                used_primary = true;
                yield Ok(StreamToken { text: first_text, provider: primary_name.clone(), is_fallback: false });
                while let Some(item) = inner.next().await {
                    match item {
                        Ok(text) => yield Ok(StreamToken { text, provider: primary_name.clone(), is_fallback: false }),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if used_primary {
                return;
            }

            warn!(backend = %primary_name, "primary stream missed first-token deadline, switching to fallback");
            let fallback_name = fallback.name.clone();
            match fallback.stream_completion(&messages).await {
                Ok(mut inner) => {
                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(text) => yield Ok(StreamToken { text, provider: fallback_name.clone(), is_fallback: true }),
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                }
                Err(e) => yield Err(e),
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete_json_structured(&self, prompt: &str, schema_json: &str, max_tokens: u32) -> Result<String> {
        match self.primary.complete_json(prompt, schema_json, max_tokens).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(error = %e, "primary non-streaming completion failed, trying fallback");
                self.fallback.complete_json(prompt, schema_json, max_tokens).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_construction_holds_distinct_backend_names() {
        let primary = CompletionBackend::new("local-vllm", "http://127.0.0.1:8000/v1", "local-model", None);
        let fallback = CompletionBackend::new("openai-fallback", "https://api.openai.com/v1", "gpt-4o-mini", None);
        let router = OpenAiRouter::new(primary, fallback, Duration::from_millis(200));
        assert_eq!(router.primary.name, "local-vllm");
        assert_eq!(router.fallback.name, "openai-fallback");
    }
}
