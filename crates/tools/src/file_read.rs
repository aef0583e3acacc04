//! `read_file` — read a text file inside the filesystem root.

use async_trait::async_trait;
use std::path::PathBuf;
use veracity_core::error::ToolError;
use veracity_core::tool::{Capability, RiskLevel, Tool, ToolArguments, ToolResult};

use crate::fs::{check_root, read_text};
use crate::{optional_u64, required_str};

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file. Only within the selected root directory. Use a path relative to the root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": { "type": "string", "description": "Relative path to the file from the root" },
                "head": { "type": "integer", "minimum": 1, "description": "Return only the first N lines" },
                "tail": { "type": "integer", "minimum": 1, "description": "Return only the last N lines" }
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
        let path = required_str(arguments, "path")?;
        read_text(
            root,
            path,
            optional_u64(arguments, "head"),
            optional_u64(arguments, "tail"),
        )
        .await
    }
}
