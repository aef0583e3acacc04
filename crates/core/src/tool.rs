//! Tool trait — the abstraction over side-effecting capabilities.
//!
//! Tools are what let the model act in the world: read/write files and
//! notes, search the web, run shell commands. The turn engine only sees
//! the [`ToolDispatcher`] boundary; [`ToolRegistry`] is the stock
//! implementation of it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use crate::error::ToolError;

/// Free-form tool arguments as emitted by the model.
///
/// Values are tagged JSON values; each tool validates its own shape.
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// How dangerous a tool is to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    ReadOnly,
    Write,
    Network,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::ReadOnly => "read_only",
            RiskLevel::Write => "write",
            RiskLevel::Network => "network",
            RiskLevel::High => "high",
        }
    }
}

/// The user-facing capability group a tool belongs to.
///
/// Capabilities are switched on and off as a unit; the prompt tells the
/// model explicitly which ones are unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Filesystem,
    Notes,
    WebSearch,
    Web,
    Terminal,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Filesystem,
        Capability::Notes,
        Capability::WebSearch,
        Capability::Web,
        Capability::Terminal,
    ];

    /// Human-readable name used in prompts and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Capability::Filesystem => "file access",
            Capability::Notes => "note storage",
            Capability::WebSearch => "web search",
            Capability::Web => "web page fetching",
            Capability::Terminal => "shell commands",
        }
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name, unique within a turn
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    /// Risk classification
    pub risk: RiskLevel,

    /// Capability group
    pub capability: Capability,
}

impl ToolDefinition {
    /// Whether this tool persists model-authored text (and therefore gets a
    /// provenance footer appended to its `content` argument).
    pub fn is_content_writer(&self) -> bool {
        self.risk == RiskLevel::Write && self.parameters["properties"]["content"].is_object()
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub ok: bool,

    /// The output content
    pub content: String,

    /// Failure description when `ok` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            ok: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }

    /// A failure that still carries structured content (e.g. a search
    /// result envelope with `ok: false`).
    pub fn failure_with_content(content: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            content: content.into(),
            error: Some(error.into()),
        }
    }

    /// The text fed back to the model: content, else the error.
    pub fn model_text(&self) -> &str {
        if self.content.is_empty() {
            self.error.as_deref().unwrap_or("")
        } else {
            &self.content
        }
    }
}

/// The core Tool trait.
///
/// Each built-in tool implements this trait and is registered in a
/// [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file", "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    fn risk(&self) -> RiskLevel;

    fn capability(&self) -> Capability;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: &ToolArguments) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            risk: self.risk(),
            capability: self.capability(),
        }
    }
}

/// The executor boundary consumed by the turn engine.
///
/// Implementations report tool failure through `ToolResult { ok: false }`.
/// An `Err` means the boundary itself faulted; the engine surfaces it to the
/// caller and does not start another round. Dispatch is not idempotent:
/// retrying after a fault may repeat side effects.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        name: &str,
        arguments: &ToolArguments,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// A registry of available tools.
///
/// The turn engine uses this to:
/// 1. Get tool definitions to describe to the model
/// 2. Look up and execute tools when the model requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    async fn dispatch(
        &self,
        name: &str,
        arguments: &ToolArguments,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        match tool.execute(arguments).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool reported an error");
                Ok(ToolResult::failure(e.to_string()))
            }
        }
    }
}
