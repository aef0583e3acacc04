//! Ollama native provider.
//!
//! Talks to `/api/chat` with `stream: true`; the response is newline
//! delimited JSON, one object per line:
//!
//! ```text
//! {"message":{"role":"assistant","content":"Hel"},"done":false}
//! {"message":{"role":"assistant","content":"lo"},"done":false}
//! {"done":true,"done_reason":"stop"}
//! ```
//!
//! No response timeout is set: local models on slow hardware can take as
//! long as they need. Cancellation is the caller dropping the receiver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use veracity_core::error::ProviderError;
use veracity_core::message::Message;
use veracity_core::provider::{ProviderRequest, StreamReceiver};

use crate::check_status;
use crate::lines::{pump_lines, LineEvent};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        // Tolerate OpenAI-style base URLs in config
        let base_url = base_url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .to_string();
        Self {
            base_url,
            client: reqwest::Client::builder().build().unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let messages: Vec<WireMessage<'_>> = request
            .messages
            .iter()
            .map(WireMessage::from)
            .collect();

        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(n) = request.max_tokens {
            options["num_predict"] = serde_json::json!(n);
        }

        serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "options": options,
        })
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: m.role.as_str(),
            content: &m.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<ChatLineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatLineMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_line(line: &str) -> LineEvent {
    let Ok(parsed) = serde_json::from_str::<ChatLine>(line) else {
        return LineEvent::Skip;
    };
    if let Some(error) = parsed.error {
        return LineEvent::Error(error);
    }
    let content = parsed
        .message
        .and_then(|m| m.content)
        .unwrap_or_default();
    match (content.is_empty(), parsed.done) {
        (false, _) => LineEvent::Delta(content),
        (true, true) => LineEvent::Done,
        (true, false) => LineEvent::Skip,
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[async_trait]
impl veracity_core::Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<StreamReceiver, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(&request);

        debug!(model = %request.model, messages = request.messages.len(), "Sending Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = check_status(response, "ollama", &request.model).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            pump_lines(response.bytes_stream(), tx, "ollama", parse_line).await;
        });
        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = check_status(response, "ollama", "").await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}
