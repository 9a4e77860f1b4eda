//! `CompletionBackend` — a single OpenAI-chat-completions-compatible HTTP
//! endpoint, streaming or not. `OpenAiRouter` (in `router.rs`) holds two of
//! these (primary, fallback) and races them per spec section 4.8.

use std::pin::Pin;
use std::time::Duration;

use advisor_core::error::{Error, Result};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DONE_MARKER: &str = "[DONE]";

/// A persistent HTTP client scoped to one OpenAI-compatible backend. Reused
/// across requests; never rebuilt per call.
#[derive(Clone)]
pub struct CompletionBackend {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl CompletionBackend {
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            name: name.into(),
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Stream content deltas from `/chat/completions` with `stream:true`.
    pub async fn stream_completion(
        &self,
        messages: &[(String, String)],
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String>> + Send>>> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "stream": true,
            "messages": messages
                .iter()
                .map(|(role, content)| ChatMessage { role, content })
                .collect::<Vec<_>>(),
        });

        let response = self
            .request(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable { service: self.name.clone(), detail: e.to_string() })?;

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable {
                service: self.name.clone(),
                detail: format!("status {}", response.status()),
            });
        }

        let backend_name = self.name.clone();
        let mut events = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if event.data == DONE_MARKER {
                            return;
                        }
                        match serde_json::from_str::<StreamChunk>(&event.data) {
                            Ok(chunk) => {
                                for choice in chunk.choices {
                                    if let Some(content) = choice.delta.content {
                                        if !content.is_empty() {
                                            yield Ok(content);
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                yield Err(Error::UpstreamUnavailable {
                                    service: backend_name.clone(),
                                    detail: format!("malformed SSE payload: {e}"),
                                });
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(Error::UpstreamUnavailable { service: backend_name.clone(), detail: e.to_string() });
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Non-streaming structured JSON completion used by the schema
    /// enforcer's re-ask pass.
    pub async fn complete_json(&self, prompt: &str, schema_json: &str, max_tokens: u32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let system = format!("Respond with a single JSON object conforming to this schema:\n{schema_json}");
        let body = json!({
            "model": self.model,
            "stream": false,
            "max_tokens": max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .request(&url)
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable { service: self.name.clone(), detail: e.to_string() })?;

        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable {
                service: self.name.clone(),
                detail: format!("status {}", response.status()),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable { service: self.name.clone(), detail: e.to_string() })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::UpstreamUnavailable { service: self.name.clone(), detail: "empty completion".to_string() })
    }
}
