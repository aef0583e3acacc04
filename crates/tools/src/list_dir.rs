//! `list_dir` — list a directory inside the filesystem root.

use async_trait::async_trait;
use std::path::PathBuf;
use veracity_core::error::ToolError;
use veracity_core::tool::{Capability, RiskLevel, Tool, ToolArguments, ToolResult};

use crate::fs::{check_root, list_tree, ListFilter};
use crate::optional_u64;

pub struct ListDirTool {
    root: PathBuf,
}

impl ListDirTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List directory contents (names, with / for directories). Only within the selected root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": { "type": "string", "description": "Relative path to the directory from the root ('.' for the root)" },
                "depth": { "type": "integer", "minimum": 1, "maximum": 3, "default": 1 }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }

    fn capability(&self) -> Capability {
        Capability::Filesystem
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let root = check_root(&self.root, "filesystem")?;
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        list_tree(root, path, optional_u64(arguments, "depth"), ListFilter::All).await
    }
}
