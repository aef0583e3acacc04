//! Markdown note tools: `read_note`, `write_note`, `list_notes`.
//!
//! Notes live in a vault directory. Paths are vault-relative; a path with
//! no extension gets `.md` appended.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use veracity_core::error::ToolError;
use veracity_core::tool::{Capability, RiskLevel, Tool, ToolArguments, ToolResult};

use crate::fs::{check_root, list_tree, read_text, write_text, ListFilter};
use crate::{optional_u64, required_str};

/// Append `.md` when the note path has no extension.
pub fn note_path(path: &str) -> String {
    let trimmed = path.trim();
    if Path::new(trimmed).extension().is_some() {
        trimmed.to_string()
    } else {
        format!("{trimmed}.md")
    }
}

pub struct ReadNoteTool {
    vault: PathBuf,
}

impl ReadNoteTool {
    pub fn new(vault: impl Into<PathBuf>) -> Self {
        Self {
            vault: vault.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read a Markdown note from the vault. Path is vault-relative (e.g. 'Daily/2026-02-10.md'). Frontmatter is preserved."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": { "type": "string", "description": "Vault-relative path, e.g. 'Daily/2026-02-10.md'" }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }

    fn capability(&self) -> Capability {
        Capability::Notes
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let vault = check_root(&self.vault, "notes")?;
        let path = note_path(required_str(arguments, "path")?);
        read_text(vault, &path, None, None).await
    }
}

pub struct WriteNoteTool {
    vault: PathBuf,
}

impl WriteNoteTool {
    pub fn new(vault: impl Into<PathBuf>) -> Self {
        Self {
            vault: vault.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteNoteTool {
    fn name(&self) -> &str {
        "write_note"
    }

    fn description(&self) -> &str {
        "Write a Markdown note to the vault. Include frontmatter in the content if desired."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": { "type": "string", "description": "Vault-relative path" },
                "content": { "type": "string", "description": "Markdown content" }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Write
    }

    fn capability(&self) -> Capability {
        Capability::Notes
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let vault = check_root(&self.vault, "notes")?;
        let path = note_path(required_str(arguments, "path")?);
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        write_text(vault, &path, content).await
    }
}

pub struct ListNotesTool {
    vault: PathBuf,
}

impl ListNotesTool {
    pub fn new(vault: impl Into<PathBuf>) -> Self {
        Self {
            vault: vault.into(),
        }
    }
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }

    fn description(&self) -> &str {
        "List Markdown notes and folders in a vault folder. Path is vault-relative."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Vault-relative folder ('.' for the vault root)" },
                "depth": { "type": "integer", "minimum": 1, "maximum": 3, "default": 1 }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }

    fn capability(&self) -> Capability {
        Capability::Notes
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let vault = check_root(&self.vault, "notes")?;
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        list_tree(vault, path, optional_u64(arguments, "depth"), ListFilter::Markdown).await
    }
}
