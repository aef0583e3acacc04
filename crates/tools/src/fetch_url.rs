//! `fetch_url` — fetch a web page and return it as plain text.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use veracity_core::error::ToolError;
use veracity_core::tool::{Capability, RiskLevel, Tool, ToolArguments, ToolResult};

use crate::{optional_u64, required_str};

pub(crate) const FETCH_TIMEOUT_SECS: u64 = 8;
const MAX_BODY_BYTES: usize = 512 * 1024;
const DEFAULT_MAX_CHARS: u64 = 12_000;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; veracity/0.1)";
const TEXT_WIDTH: usize = 120;

/// Render an HTML document as wrapped plain text.
///
/// Entities are decoded once; `<script>` and `<style>` bodies are dropped.
pub fn html_to_text(html: &[u8]) -> Result<String, String> {
    let text = html2text::from_read(html, TEXT_WIDTH).map_err(|e| format!("html2text error: {e}"))?;
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    Ok(lines.join("\n").trim().to_string())
}

/// Truncate to `max_chars` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// GET `url` and return its plain text, or a reason it could not be read.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    max_chars: usize,
) -> Result<String, String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL must start with http:// or https://".into());
    }
    let response = client
        .get(url)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| format!("read failed: {e}"))?;
    if body.len() > MAX_BODY_BYTES {
        return Err(format!("page too large (max {MAX_BODY_BYTES} bytes)"));
    }
    let text = html_to_text(&body)?;
    if text.is_empty() {
        return Err("page returned no text".into());
    }
    Ok(truncate_chars(&text, max_chars))
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

pub struct FetchUrlTool {
    client: reqwest::Client,
}

impl FetchUrlTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return the page content as plain text. Use when the user gives you a link to summarize or explain."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": { "type": "string", "description": "Full URL to fetch (e.g. https://example.com/article)" },
                "max_chars": { "type": "integer", "minimum": 500, "maximum": 20000, "default": 12000 }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Network
    }

    fn capability(&self) -> Capability {
        Capability::Web
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let url = required_str(arguments, "url")?.trim();
        let max_chars = optional_u64(arguments, "max_chars")
            .unwrap_or(DEFAULT_MAX_CHARS)
            .clamp(500, 20_000) as usize;

        debug!(url = %url, max_chars, "Fetching page");

        match fetch_text(&self.client, url, max_chars).await {
            Ok(text) => Ok(ToolResult::success(format!("Page content from {url}:\n\n{text}"))),
            Err(reason) => Ok(ToolResult::failure(format!("fetch_url failed: {reason}"))),
        }
    }
}
