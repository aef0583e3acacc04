//! Shared test doubles for the turn engine.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::{Notify, mpsc};
use veracity_core::error::{ProviderError, ToolError};
use veracity_core::provider::{Provider, ProviderRequest, StreamChunk, StreamReceiver};
use veracity_core::tool::{
    Capability, RiskLevel, ToolArguments, ToolDefinition, ToolDispatcher, ToolResult,
};

/// One scripted model reply.
pub enum Script {
    /// Send these items, then close the stream.
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
    /// Send these items, then keep the stream open until the receiver
    /// goes away.
    Hang(Vec<Result<StreamChunk, ProviderError>>),
}

impl Script {
    /// `text` split into a few deltas followed by a `done` chunk.
    pub fn text(text: &str) -> Self {
        let mut chunks: Vec<_> = split_deltas(text).into_iter().map(Ok).collect();
        chunks.push(Ok(StreamChunk::finished()));
        Script::Chunks(chunks)
    }
}

fn split_deltas(text: &str) -> Vec<StreamChunk> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(7)
        .map(|c| StreamChunk::delta(c.iter().collect::<String>()))
        .collect()
}

/// A provider that replays one [`Script`] per `stream` call and keeps the
/// requests it was given.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One text reply per round.
    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Script::text(r)).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<StreamReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let (items, hang) = match script {
                Script::Chunks(items) => (items, false),
                Script::Hang(items) => (items, true),
            };
            for item in items {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            if hang {
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

/// A dispatcher that records every call and answers from a per-tool table
/// (default: a generic success).
#[derive(Default)]
pub struct RecordingDispatcher {
    results: HashMap<String, ToolResult>,
    calls: Mutex<Vec<(String, ToolArguments)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, tool: &str, result: ToolResult) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    pub fn calls(&self) -> Vec<(String, ToolArguments)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolDispatcher for RecordingDispatcher {
    async fn dispatch(&self, name: &str, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        Ok(self
            .results
            .get(name)
            .cloned()
            .unwrap_or_else(|| ToolResult::success(format!("{name} ok"))))
    }
}

/// A dispatcher whose boundary always faults.
pub struct FaultyDispatcher;

#[async_trait]
impl ToolDispatcher for FaultyDispatcher {
    async fn dispatch(&self, name: &str, _arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: name.to_string(),
            reason: "executor crashed".into(),
        })
    }
}

/// A dispatcher that never returns. `started` fires once a dispatch is
/// in flight.
#[derive(Default)]
pub struct HangingDispatcher {
    pub started: Notify,
}

#[async_trait]
impl ToolDispatcher for HangingDispatcher {
    async fn dispatch(&self, _name: &str, _arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        self.started.notify_one();
        std::future::pending().await
    }
}

/// A minimal definition for `name`; `write` makes it a content writer.
pub fn definition(name: &str, capability: Capability, write: bool) -> ToolDefinition {
    let (risk, parameters) = if write {
        (
            RiskLevel::Write,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                }
            }),
        )
    } else {
        (
            RiskLevel::ReadOnly,
            serde_json::json!({
                "type": "object",
                "properties": { "path": { "type": "string" } }
            }),
        )
    };
    ToolDefinition {
        name: name.to_string(),
        description: format!("{name} for tests"),
        parameters,
        risk,
        capability,
    }
}

/// A JSON search envelope as produced by `web_search`.
pub fn search_output(urls: &[&str]) -> String {
    let results: Vec<_> = urls
        .iter()
        .map(|u| serde_json::json!({ "title": "Result", "snippet": "...", "url": u }))
        .collect();
    serde_json::json!({
        "ok": true,
        "provider": "duckduckgo",
        "query": "test",
        "results": results,
        "result_count": urls.len(),
        "steps": []
    })
    .to_string()
}
