//! `web_search` — search the web through the DuckDuckGo Instant Answer API.
//!
//! When DuckDuckGo has nothing for a query that is not time-sensitive, the
//! top matching Wikipedia page is used instead. The tool output is a JSON
//! envelope ([`WebSearchOutput`]) that the truthfulness ledger reads back:
//! `provider`, `result_count` and `results[].url` are load-bearing.

use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use veracity_core::error::ToolError;
use veracity_core::tool::{Capability, RiskLevel, Tool, ToolArguments, ToolResult};

use crate::fetch_url::{fetch_text, http_client};
use crate::{optional_u64, required_str};

pub const PROVIDER_DUCKDUCKGO: &str = "duckduckgo";
pub const PROVIDER_WIKIPEDIA: &str = "wikipedia_fallback";

const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const WIKIPEDIA_SEARCH_URL: &str = "https://en.wikipedia.org/w/rest.php/v1/search/page";
const WIKIPEDIA_SUMMARY_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
const DEFAULT_RECENCY_DAYS: u32 = 30;
const PAGE_EXCERPT_MAX_CHARS: usize = 2200;
const PAGE_EXCERPT_MAX_RESULTS: usize = 4;
const TITLE_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub snippet: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_excerpt: Option<String>,
}

/// One diagnostic step of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStep {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl SearchStep {
    fn new(name: &str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            ok,
            detail: detail.into(),
        }
    }
}

/// Structured tool output. `result_count` always equals `results.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchOutput {
    pub ok: bool,
    pub provider: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_rewritten: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency_days: Option<u32>,
    pub status: u16,
    pub results: Vec<SearchResultItem>,
    pub result_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<SearchStep>,
}

impl WebSearchOutput {
    fn new(original: &str, rewritten: &str) -> Self {
        Self {
            ok: false,
            provider: PROVIDER_DUCKDUCKGO.to_string(),
            query: rewritten.to_string(),
            query_original: Some(original.to_string()),
            query_rewritten: Some(rewritten.to_string()),
            recency_days: Some(DEFAULT_RECENCY_DAYS),
            status: 0,
            results: Vec::new(),
            result_count: 0,
            error: None,
            steps: vec![SearchStep::new("validate", true, "config ok")],
        }
    }

    fn fail(mut self, status: u16, error: String, step: SearchStep) -> ToolResult {
        self.status = status;
        self.steps.push(step);
        self.steps.push(SearchStep::new("done", false, error.clone()));
        self.error = Some(error.clone());
        warn!(query = %self.query, error = %error, "web_search failed");
        let json = serde_json::to_string(&self).unwrap_or_else(|_| "{}".into());
        ToolResult::failure_with_content(json, error)
    }

    fn succeed(mut self, provider: &str, results: Vec<SearchResultItem>) -> ToolResult {
        self.ok = true;
        self.provider = provider.to_string();
        self.result_count = results.len();
        self.results = results;
        self.steps.push(SearchStep::new(
            "done",
            true,
            format!("{} result(s)", self.result_count),
        ));
        info!(provider, results = self.result_count, "web_search completed");
        let json = serde_json::to_string(&self).unwrap_or_else(|_| "{}".into());
        ToolResult::success(json)
    }
}

/// True if the query implies recency ("today", "latest", "winner", ...).
pub fn is_time_sensitive_query(query: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "today",
        "yesterday",
        "few days ago",
        "latest",
        "current",
        "this week",
        "this month",
        "this year",
        "recent",
        "just",
        "super bowl",
        "superbowl",
        "winner",
        "champion",
        "score",
        "result",
    ];
    let lower = query.to_lowercase();
    PATTERNS.iter().any(|p| lower.contains(p))
}

/// Append `year` to time-sensitive queries so the index favours fresh pages.
pub fn rewrite_query(query: &str, year: i32) -> String {
    let q = query.trim();
    if q.is_empty() || !is_time_sensitive_query(q) || q.contains(&year.to_string()) {
        return q.to_string();
    }
    format!("{q} {year}")
}

#[derive(Debug, Default, Deserialize)]
pub struct DuckDuckGoResponse {
    #[serde(rename = "Abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(rename = "AbstractURL", default)]
    pub abstract_url: Option<String>,
    #[serde(rename = "RelatedTopics", default)]
    pub related_topics: Vec<serde_json::Value>,
}

fn title_from(text: &str) -> String {
    let first = text.lines().next().unwrap_or(text).trim();
    if first.chars().count() > TITLE_MAX_CHARS {
        let cut: String = first.chars().take(TITLE_MAX_CHARS - 3).collect();
        format!("{cut}…")
    } else {
        first.to_string()
    }
}

fn topic_result(obj: &serde_json::Map<String, serde_json::Value>) -> Option<SearchResultItem> {
    let text = obj
        .get("Text")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())?;
    let url = obj
        .get("FirstURL")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())?;
    Some(SearchResultItem {
        title: title_from(text),
        snippet: text.to_string(),
        url: url.to_string(),
        page_excerpt: None,
    })
}

/// Flatten an Instant Answer response: the abstract first, then related
/// topics including nested topic groups, up to `max_results`.
pub fn parse_duckduckgo_results(
    body: &DuckDuckGoResponse,
    max_results: usize,
) -> Vec<SearchResultItem> {
    let mut results = Vec::new();

    if let (Some(text), Some(url)) = (&body.abstract_text, &body.abstract_url)
        && !text.trim().is_empty()
        && !url.trim().is_empty()
    {
        results.push(SearchResultItem {
            title: title_from(text),
            snippet: text.trim().to_string(),
            url: url.trim().to_string(),
            page_excerpt: None,
        });
    }

    let topics = body.related_topics.iter().filter_map(|v| v.as_object());
    for obj in topics {
        if let Some(group) = obj.get("Topics").and_then(|x| x.as_array()) {
            results.extend(
                group
                    .iter()
                    .filter_map(|item| item.as_object())
                    .filter_map(topic_result),
            );
        } else if let Some(item) = topic_result(obj) {
            results.push(item);
        }
    }

    results.truncate(max_results);
    results
}

async fn wikipedia_fallback(client: &reqwest::Client, query: &str) -> Vec<SearchResultItem> {
    let search: serde_json::Value = match client
        .get(WIKIPEDIA_SEARCH_URL)
        .query(&[("q", query), ("limit", "10")])
        .send()
        .await
    {
        Ok(r) if r.status().is_success() => match r.json().await {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    let Some(title) = search["pages"]
        .as_array()
        .and_then(|pages| pages.first())
        .and_then(|p| p["title"].as_str())
    else {
        return Vec::new();
    };

    let slug = title.replace(' ', "_");
    let summary: serde_json::Value =
        match client.get(format!("{WIKIPEDIA_SUMMARY_URL}/{slug}")).send().await {
            Ok(r) if r.status().is_success() => r.json().await.unwrap_or_default(),
            _ => return Vec::new(),
        };

    vec![SearchResultItem {
        title: title.to_string(),
        snippet: summary["extract"].as_str().unwrap_or_default().to_string(),
        url: format!("https://en.wikipedia.org/wiki/{slug}"),
        page_excerpt: None,
    }]
}

pub struct WebSearchTool {
    client: reqwest::Client,
    default_max_results: u32,
}

impl WebSearchTool {
    pub fn new(default_max_results: u32) -> Self {
        Self {
            client: http_client(),
            default_max_results: default_max_results.clamp(1, 10),
        }
    }

    async fn attach_excerpts(&self, results: &mut [SearchResultItem]) {
        let fetches = results
            .iter()
            .take(PAGE_EXCERPT_MAX_RESULTS)
            .map(|r| fetch_text(&self.client, &r.url, PAGE_EXCERPT_MAX_CHARS));
        let excerpts = futures::future::join_all(fetches).await;
        for (result, excerpt) in results.iter_mut().zip(excerpts) {
            result.page_excerpt = excerpt.ok();
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web (DuckDuckGo). Returns title, snippet, URL, and optional page excerpts. Use for current information and cite the result URLs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "max_results": { "type": "integer", "minimum": 1, "maximum": 10, "default": self.default_max_results },
                "include_page_excerpts": { "type": "boolean", "default": true, "description": "Fetch each result page and include a text excerpt" }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Network
    }

    fn capability(&self) -> Capability {
        Capability::WebSearch
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let query = required_str(arguments, "query")?.trim();
        let max_results = optional_u64(arguments, "max_results")
            .unwrap_or(self.default_max_results as u64)
            .clamp(1, 10) as usize;
        let include_excerpts = arguments
            .get("include_page_excerpts")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let rewritten = rewrite_query(query, chrono::Utc::now().year());
        let mut output = WebSearchOutput::new(query, &rewritten);
        debug!(query = %query, rewritten = %rewritten, max_results, "Running web_search");

        let response = match self
            .client
            .get(DUCKDUCKGO_URL)
            .query(&[("q", rewritten.as_str()), ("format", "json"), ("no_html", "1")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let error = format!("web_search request failed: {e}");
                return Ok(output.fail(0, error, SearchStep::new("request", false, e.to_string())));
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Ok(output.fail(
                status,
                format!("HTTP {status}"),
                SearchStep::new("request", false, format!("HTTP {status}")),
            ));
        }
        output.status = status;
        output.steps.push(SearchStep::new("request", true, format!("HTTP {status}")));

        let body: DuckDuckGoResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                return Ok(output.fail(
                    status,
                    format!("could not parse search response: {e}"),
                    SearchStep::new("parse", false, e.to_string()),
                ));
            }
        };

        let mut results = parse_duckduckgo_results(&body, max_results);
        let mut provider = PROVIDER_DUCKDUCKGO;
        output.steps.push(SearchStep::new(
            "parse",
            true,
            format!("result_count {}", results.len()),
        ));

        if results.is_empty() {
            if is_time_sensitive_query(query) {
                output.steps.push(SearchStep::new(
                    "fallback_skipped",
                    false,
                    "time-sensitive query: encyclopedia fallback not used",
                ));
            } else {
                results = wikipedia_fallback(&self.client, query).await;
                output.steps.push(SearchStep::new(
                    "wikipedia_fallback",
                    !results.is_empty(),
                    format!("{} result(s)", results.len()),
                ));
                if !results.is_empty() {
                    provider = PROVIDER_WIKIPEDIA;
                }
            }
        }

        if include_excerpts && !results.is_empty() {
            self.attach_excerpts(&mut results).await;
        }

        Ok(output.succeed(provider, results))
    }
}
