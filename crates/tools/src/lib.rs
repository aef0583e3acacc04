//! Built-in tool implementations for Veracity.
//!
//! Tools give the assistant the ability to interact with the world:
//! read and write files and notes inside a sandbox root, search the web,
//! fetch pages, and run shell commands. Each capability group is opt-in
//! through [`veracity_config::ToolsConfig`].

pub mod fetch_url;
pub mod file_read;
pub mod file_write;
mod fs;
pub mod list_dir;
pub mod notes;
pub mod shell;
pub mod web_search;

pub use fs::{MAX_FILE_SIZE_BYTES, MAX_LIST_DEPTH, MAX_READ_LINES};

use std::path::PathBuf;
use std::time::Duration;
use veracity_config::ToolsConfig;
use veracity_core::error::ToolError;
use veracity_core::tool::{ToolArguments, ToolRegistry};

/// Create a tool registry holding exactly the tools the config enables.
///
/// Filesystem and notes tools are skipped when their root is blank.
pub fn registry_from_config(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    if config.filesystem_active() {
        let root = PathBuf::from(config.filesystem_root.trim());
        registry.register(Box::new(file_read::ReadFileTool::new(root.clone())));
        registry.register(Box::new(file_write::WriteFileTool::new(root.clone())));
        registry.register(Box::new(list_dir::ListDirTool::new(root)));
    }

    if config.notes_active() {
        let vault = PathBuf::from(config.notes_vault.trim());
        registry.register(Box::new(notes::ReadNoteTool::new(vault.clone())));
        registry.register(Box::new(notes::WriteNoteTool::new(vault.clone())));
        registry.register(Box::new(notes::ListNotesTool::new(vault)));
    }

    if config.web_search_enabled {
        registry.register(Box::new(web_search::WebSearchTool::new(config.web_max_results)));
        registry.register(Box::new(fetch_url::FetchUrlTool::new()));
    }

    if config.terminal_enabled {
        registry.register(Box::new(shell::RunCommandTool::new(Duration::from_secs(
            config.command_timeout_secs,
        ))));
    }

    registry
}

/// A required, non-blank string argument.
pub(crate) fn required_str<'a>(args: &'a ToolArguments, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

pub(crate) fn optional_u64(args: &ToolArguments, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

#[cfg(test)]
pub(crate) fn args(value: serde_json::Value) -> ToolArguments {
    value.as_object().cloned().unwrap_or_default()
}
