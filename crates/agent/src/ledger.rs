//! Truthfulness ledger: the per-turn audit trail of tool use.
//!
//! One ledger is created when a turn starts and dropped when it ends. It
//! answers two questions for the turn engine:
//!
//! - did a web search actually succeed in this turn (so a claim of having
//!   looked something up is supported)?
//! - what provenance should be attached to content a tool writes?
//!
//! Every operation is total. Tool output that cannot be parsed degrades to
//! "no structured result"; nothing here fails the turn.

use chrono::{DateTime, SecondsFormat, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use veracity_core::tool::{ToolArguments, ToolResult};

use crate::WEB_SEARCH_TOOL;
use crate::claims::FakeClaimDetector;

/// Upper bound on the URLs reported by [`ToolLedger::sources_used`].
pub const MAX_SOURCES: usize = 20;

/// Marker used in the footer when no web source backs the content.
pub const OFFLINE_MARKER: &str = "None (offline)";

/// Fixed closing line of every provenance footer.
pub const CAPABILITY_DISCLAIMER: &str = "This assistant cannot browse the internet unless a web search tool was enabled and actually invoked.";

/// Prepended to written content that claims a lookup the ledger cannot back.
pub const UNVERIFIED_CLAIM_NOTICE: &str = "> **Note:** No web search was performed while writing this. Statements below about searching or finding information online are not backed by any lookup.";

/// Prepended when the last web search ran but came back empty.
pub const NO_RESULTS_NOTICE: &str = "> **Note:** A web search was run but returned no results, so claims below could not be verified.";

const SUMMARY_MAX_CHARS: usize = 160;

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>()\[\]{}]+"#).ok());

/// Outcome of a single invocation, mirroring [`ToolResult::ok`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Success,
    Error,
}

/// One tool invocation recorded during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokedToolEntry {
    pub name: String,
    /// The arguments exactly as dispatched
    pub arguments: ToolArguments,
    pub status: InvocationStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// First line of the output, shortened
    pub summary: String,
    pub raw_output: String,
    /// The model round that requested this invocation
    pub round: u32,
}

impl InvokedToolEntry {
    /// Build an entry from a dispatched tool result.
    pub fn from_result(
        name: impl Into<String>,
        arguments: ToolArguments,
        result: &ToolResult,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        round: u32,
    ) -> Self {
        let status = if result.ok {
            InvocationStatus::Success
        } else {
            InvocationStatus::Error
        };
        Self {
            name: name.into(),
            arguments,
            status,
            started_at,
            ended_at,
            summary: summarize(result),
            raw_output: result.content.clone(),
            round,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == InvocationStatus::Success
    }

    fn is_successful_web_search(&self) -> bool {
        self.name == WEB_SEARCH_TOOL && self.succeeded()
    }
}

fn summarize(result: &ToolResult) -> String {
    let text = if result.ok {
        result.content.as_str()
    } else {
        result.error.as_deref().unwrap_or(&result.content)
    };
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = line.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

/// What the most recent successful web search returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSearchSummary {
    pub result_count: usize,
    pub provider: String,
    pub urls: Vec<String>,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    provider: String,
    results: Vec<SearchHit>,
    #[serde(default)]
    result_count: Option<usize>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: Option<String>,
}

impl SearchEnvelope {
    fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw.trim()).ok()
    }

    fn urls(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter_map(|hit| hit.url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

fn scan_urls(raw: &str) -> Vec<&str> {
    let Some(pattern) = URL_PATTERN.as_ref() else {
        return Vec::new();
    };
    pattern
        .find_iter(raw)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']))
        .collect()
}

/// Per-turn record of available and invoked tools.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolLedger {
    available: Vec<String>,
    entries: Vec<InvokedToolEntry>,
}

impl ToolLedger {
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
            entries: Vec::new(),
        }
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.available.iter().any(|n| n == name)
    }

    /// Append an invocation. Entries are never removed; rounds are
    /// strictly increasing.
    pub fn record(&mut self, entry: InvokedToolEntry) {
        debug_assert!(
            self.entries.last().is_none_or(|last| last.round < entry.round),
            "one invocation per round"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[InvokedToolEntry] {
        &self.entries
    }

    pub fn raw_outputs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.raw_output.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn web_search_succeeded(&self) -> bool {
        self.entries.iter().any(InvokedToolEntry::is_successful_web_search)
    }

    /// The structured outcome of the newest successful web search, if its
    /// output can be read as one.
    pub fn last_web_search_result(&self) -> Option<WebSearchSummary> {
        let entry = self
            .entries
            .iter()
            .rev()
            .find(|e| e.is_successful_web_search())?;
        let envelope = SearchEnvelope::parse(&entry.raw_output)?;
        Some(WebSearchSummary {
            result_count: envelope.result_count.unwrap_or(envelope.results.len()),
            urls: envelope.urls().map(str::to_string).collect(),
            provider: envelope.provider,
        })
    }

    /// URLs from every successful web search, deduplicated in first-seen
    /// order and capped at [`MAX_SOURCES`].
    ///
    /// Structured `results[].url` fields are preferred; output that is not
    /// a search envelope is scanned for URL-shaped tokens instead.
    pub fn sources_used(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.is_successful_web_search()) {
            let urls: Vec<String> = match SearchEnvelope::parse(&entry.raw_output) {
                Some(envelope) => envelope.urls().map(str::to_string).collect(),
                None => scan_urls(&entry.raw_output)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            };
            for url in urls {
                if sources.len() >= MAX_SOURCES {
                    return sources;
                }
                if !sources.contains(&url) {
                    sources.push(url);
                }
            }
        }
        sources
    }

    /// Distinct invoked tool names, in order of first invocation.
    pub fn tools_used(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.name.as_str()) {
                names.push(&entry.name);
            }
        }
        names
    }

    pub fn build_provenance_footer(&self) -> String {
        self.build_provenance_footer_at(Utc::now())
    }

    /// The provenance block, stamped with `generated_at`.
    ///
    /// Output depends only on the ledger and the timestamp.
    pub fn build_provenance_footer_at(&self, generated_at: DateTime<Utc>) -> String {
        let mut lines = vec![
            "---".to_string(),
            "Provenance".to_string(),
            format!(
                "Generated: {}",
                generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        ];

        let tools = self.tools_used();
        if tools.is_empty() {
            lines.push("Tools used: none".to_string());
        } else {
            lines.push(format!("Tools used: {}", tools.join(", ")));
        }

        if self.web_search_succeeded() {
            let provider = self
                .last_web_search_result()
                .map(|r| r.provider)
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "unknown".to_string());
            lines.push(format!("Search provider: {provider}"));
        }

        let sources = self.sources_used();
        if sources.is_empty() {
            lines.push(format!("Sources: {OFFLINE_MARKER}"));
        } else {
            lines.push("Sources:".to_string());
            lines.extend(sources.iter().map(|url| format!("- {url}")));
        }

        lines.push(format!("Disclaimer: {CAPABILITY_DISCLAIMER}"));
        lines.join("\n")
    }
}

/// Content about to be persisted by a content-writing tool.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedContent {
    pub content: String,
    /// Pattern of an unsupported lookup claim found in the original text
    pub unsupported_claim: Option<String>,
}

/// Prepare model-authored content for a write.
///
/// Unsupported lookup claims get [`UNVERIFIED_CLAIM_NOTICE`] prepended; an
/// empty last search gets [`NO_RESULTS_NOTICE`]; the provenance footer is
/// always appended.
pub fn annotate_written_content(
    content: &str,
    ledger: &ToolLedger,
    detector: &FakeClaimDetector,
    generated_at: DateTime<Utc>,
) -> AnnotatedContent {
    let unsupported_claim = if ledger.web_search_succeeded() {
        None
    } else {
        detector.detect(content).map(str::to_string)
    };

    let mut notices = Vec::new();
    if unsupported_claim.is_some() {
        notices.push(UNVERIFIED_CLAIM_NOTICE);
    }
    if ledger
        .last_web_search_result()
        .is_some_and(|r| r.result_count == 0)
    {
        notices.push(NO_RESULTS_NOTICE);
    }

    let mut annotated = String::new();
    for notice in notices {
        annotated.push_str(notice);
        annotated.push_str("\n\n");
    }
    annotated.push_str(content.trim_end());
    annotated.push_str("\n\n");
    annotated.push_str(&ledger.build_provenance_footer_at(generated_at));
    annotated.push('\n');

    AnnotatedContent {
        content: annotated,
        unsupported_claim,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn search_output(provider: &str, urls: &[&str]) -> String {
        let results: Vec<_> = urls
            .iter()
            .map(|u| serde_json::json!({"title": "t", "snippet": "s", "url": u}))
            .collect();
        serde_json::json!({
            "ok": true,
            "provider": provider,
            "query": "q",
            "results": results,
            "result_count": urls.len(),
            "steps": []
        })
        .to_string()
    }

    fn record(ledger: &mut ToolLedger, name: &str, result: ToolResult, round: u32) {
        ledger.record(InvokedToolEntry::from_result(
            name,
            ToolArguments::new(),
            &result,
            at(0),
            at(1),
            round,
        ));
    }

    #[test]
    fn availability() {
        let ledger = ToolLedger::new(["read_file", "web_search"]);
        assert!(ledger.is_available("web_search"));
        assert!(!ledger.is_available("run_command"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn web_search_success_requires_ok_status() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL]);
        record(&mut ledger, WEB_SEARCH_TOOL, ToolResult::failure("HTTP 500"), 1);
        assert!(!ledger.web_search_succeeded());
        assert!(ledger.last_web_search_result().is_none());

        record(&mut ledger, "read_file", ToolResult::success("x"), 2);
        assert!(!ledger.web_search_succeeded());

        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output("duckduckgo", &[])),
            3,
        );
        assert!(ledger.web_search_succeeded());
    }

    #[test]
    fn last_web_search_is_newest_success() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL]);
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output("duckduckgo", &["https://a.example"])),
            1,
        );
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output("wikipedia_fallback", &["https://b.example", "https://c.example"])),
            2,
        );
        record(&mut ledger, WEB_SEARCH_TOOL, ToolResult::failure("boom"), 3);

        let last = ledger.last_web_search_result().unwrap();
        assert_eq!(last.provider, "wikipedia_fallback");
        assert_eq!(last.result_count, 2);
        assert_eq!(last.urls, vec!["https://b.example", "https://c.example"]);
    }

    #[test]
    fn malformed_search_output_degrades() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL]);
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success("Top hit: https://example.com/1. Also see (https://example.com/2)"),
            1,
        );
        assert!(ledger.last_web_search_result().is_none());
        assert_eq!(
            ledger.sources_used(),
            vec!["https://example.com/1", "https://example.com/2"]
        );
    }

    #[test]
    fn single_search_source_reaches_footer() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL]);
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output("duckduckgo", &["https://example.com/1"])),
            1,
        );
        assert_eq!(ledger.sources_used(), vec!["https://example.com/1"]);

        let footer = ledger.build_provenance_footer();
        assert!(footer.contains("https://example.com/1"));
        assert!(footer.contains("Tools used: web_search"));
        assert!(footer.contains("Search provider: duckduckgo"));
        assert!(!footer.contains(OFFLINE_MARKER));
    }

    #[test]
    fn sources_are_deduplicated_and_capped() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL]);
        let first: Vec<String> = (0..15).map(|i| format!("https://x.example/{i}")).collect();
        let second: Vec<String> = (10..30).map(|i| format!("https://x.example/{i}")).collect();
        for (round, urls) in [(1, &first), (2, &second)] {
            let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
            record(
                &mut ledger,
                WEB_SEARCH_TOOL,
                ToolResult::success(search_output("duckduckgo", &refs)),
                round,
            );
        }
        let sources = ledger.sources_used();
        assert_eq!(sources.len(), MAX_SOURCES);
        assert_eq!(sources[14], "https://x.example/14");
        assert_eq!(sources[15], "https://x.example/15");
    }

    #[test]
    fn failed_searches_contribute_no_sources() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL]);
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::failure_with_content(search_output("duckduckgo", &["https://x.example"]), "HTTP 503"),
            1,
        );
        assert!(ledger.sources_used().is_empty());
    }

    #[test]
    fn structured_and_scanned_sources_merge() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL]);
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output("duckduckgo", &["https://a.example", "https://b.example"])),
            1,
        );
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success("see https://b.example and https://c.example"),
            2,
        );
        assert_eq!(
            ledger.sources_used(),
            vec!["https://a.example", "https://b.example", "https://c.example"]
        );
    }

    #[test]
    fn empty_ledger_footer_is_offline() {
        let ledger = ToolLedger::new(Vec::<String>::new());
        let footer = ledger.build_provenance_footer_at(at(1_700_000_000));
        assert_eq!(
            footer,
            format!(
                "---\nProvenance\nGenerated: 2023-11-14T22:13:20Z\nTools used: none\nSources: {OFFLINE_MARKER}\nDisclaimer: {CAPABILITY_DISCLAIMER}"
            )
        );
    }

    #[test]
    fn footer_is_stable_apart_from_timestamp() {
        let mut ledger = ToolLedger::new(["read_file", WEB_SEARCH_TOOL]);
        record(&mut ledger, "read_file", ToolResult::success("abc"), 1);
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output("duckduckgo", &["https://example.com/1"])),
            2,
        );
        record(&mut ledger, "read_file", ToolResult::success("def"), 3);

        let strip = |footer: String| -> Vec<String> {
            footer
                .lines()
                .filter(|l| !l.starts_with("Generated:"))
                .map(str::to_string)
                .collect()
        };
        let first = ledger.build_provenance_footer_at(at(10));
        let second = ledger.build_provenance_footer_at(at(99));
        assert_ne!(first, second);
        assert_eq!(strip(first.clone()), strip(second));
        assert!(first.contains("Tools used: read_file, web_search\n"));
    }

    #[test]
    fn entry_summary_is_first_line() {
        let entry = InvokedToolEntry::from_result(
            "run_command",
            ToolArguments::new(),
            &ToolResult::success("\nCommand: ls\n\nExit code: 0"),
            at(0),
            at(1),
            1,
        );
        assert_eq!(entry.summary, "Command: ls");
        assert!(entry.succeeded());

        let failed = InvokedToolEntry::from_result(
            "read_file",
            ToolArguments::new(),
            &ToolResult::failure("File not found: a.txt"),
            at(0),
            at(1),
            2,
        );
        assert_eq!(failed.status, InvocationStatus::Error);
        assert_eq!(failed.summary, "File not found: a.txt");
    }

    #[test]
    fn written_claim_without_search_gets_notice_and_footer() {
        let ledger = ToolLedger::new(["write_file"]);
        let detector = FakeClaimDetector::standard();
        let annotated = annotate_written_content(
            "After searching, I found the answer is 42.",
            &ledger,
            &detector,
            at(0),
        );
        assert!(annotated.unsupported_claim.is_some());
        assert!(annotated.content.starts_with(UNVERIFIED_CLAIM_NOTICE));
        assert!(annotated.content.contains("the answer is 42."));
        assert!(annotated.content.trim_end().ends_with(CAPABILITY_DISCLAIMER));
    }

    #[test]
    fn honest_content_only_gets_footer() {
        let ledger = ToolLedger::new(["write_file"]);
        let annotated = annotate_written_content(
            "# Shopping\n- milk",
            &ledger,
            &FakeClaimDetector::standard(),
            at(0),
        );
        assert!(annotated.unsupported_claim.is_none());
        assert!(annotated.content.starts_with("# Shopping\n- milk\n\n---\nProvenance"));
    }

    #[test]
    fn supported_claim_is_kept_but_empty_search_is_noted() {
        let mut ledger = ToolLedger::new([WEB_SEARCH_TOOL, "write_note"]);
        record(
            &mut ledger,
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output("duckduckgo", &[])),
            1,
        );
        let annotated = annotate_written_content(
            "After searching, nothing came up.",
            &ledger,
            &FakeClaimDetector::standard(),
            at(0),
        );
        assert!(annotated.unsupported_claim.is_none());
        assert!(annotated.content.starts_with(NO_RESULTS_NOTICE));
        assert!(!annotated.content.contains(UNVERIFIED_CLAIM_NOTICE));
        assert!(annotated.content.contains("Search provider: duckduckgo"));
    }
}
