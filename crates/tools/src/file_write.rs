//! `write_file` — write a text file inside the filesystem root.
//!
//! This is a content-writing tool: the turn engine stamps a provenance
//! footer onto `content` before it reaches this tool.

use async_trait::async_trait;
use std::path::PathBuf;
use veracity_core::error::ToolError;
use veracity_core::tool::{Capability, RiskLevel, Tool, ToolArguments, ToolResult};

use crate::fs::{check_root, write_text};
use crate::required_str;

pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a UTF-8 text file. Only within the selected root. Creates parent directories if needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": { "type": "string", "description": "Relative path from the root" },
                "content": { "type": "string", "description": "File content" }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Write
    }

    fn capability(&self) -> Capability {
        Capability::Filesystem
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let root = check_root(&self.root, "filesystem")?;
        let path = required_str(arguments, "path")?;
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        write_text(root, path, content).await
    }
}
