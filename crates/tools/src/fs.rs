//! Sandboxed filesystem helpers shared by the file and note tools.

use std::path::Path;
use veracity_core::error::ToolError;
use veracity_core::tool::ToolResult;
use veracity_security::{resolve_under_root, resolve_under_root_for_write};

pub const MAX_FILE_SIZE_BYTES: u64 = 512 * 1024;
pub const MAX_READ_LINES: usize = 2000;
pub const MAX_LIST_DEPTH: u32 = 3;

/// Which entries a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListFilter {
    All,
    /// Directories and `.md` files
    Markdown,
}

pub(crate) fn check_root<'a>(root: &'a Path, group: &str) -> Result<&'a Path, ToolError> {
    if root.as_os_str().is_empty() {
        return Err(ToolError::RootNotConfigured(group.to_string()));
    }
    Ok(root)
}

fn sandbox_error(e: veracity_security::PathValidationError) -> ToolError {
    ToolError::SandboxViolation(e.to_string())
}

/// Read a UTF-8 text file under `root`, optionally only the first or last
/// `n` lines. Unbounded reads are capped at [`MAX_READ_LINES`].
pub(crate) async fn read_text(
    root: &Path,
    path: &str,
    head: Option<u64>,
    tail: Option<u64>,
) -> Result<ToolResult, ToolError> {
    let full = resolve_under_root(root, path).map_err(sandbox_error)?;
    if !full.is_file() {
        return Err(ToolError::InvalidArguments(format!("'{path}' is not a file")));
    }

    let meta = match tokio::fs::metadata(&full).await {
        Ok(m) => m,
        Err(e) => return Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
    };
    if meta.len() > MAX_FILE_SIZE_BYTES {
        return Ok(ToolResult::failure(format!(
            "File too large (max {MAX_FILE_SIZE_BYTES} bytes)"
        )));
    }

    let content = match tokio::fs::read_to_string(&full).await {
        Ok(c) => c,
        Err(e) => return Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
    };

    Ok(ToolResult::success(slice_lines(&content, head, tail)))
}

fn slice_lines(content: &str, head: Option<u64>, tail: Option<u64>) -> String {
    let cap = |n: u64| (n as usize).min(MAX_READ_LINES);
    let lines: Vec<&str> = content.lines().collect();

    if let Some(n) = head {
        return lines.into_iter().take(cap(n)).collect::<Vec<_>>().join("\n");
    }
    if let Some(n) = tail {
        let start = lines.len().saturating_sub(cap(n));
        return lines[start..].join("\n");
    }
    if lines.len() > MAX_READ_LINES {
        return format!(
            "{}\n... (truncated, max {MAX_READ_LINES} lines)",
            lines[..MAX_READ_LINES].join("\n")
        );
    }
    content.to_string()
}

/// Write a UTF-8 text file under `root`, creating parent directories.
pub(crate) async fn write_text(
    root: &Path,
    path: &str,
    content: &str,
) -> Result<ToolResult, ToolError> {
    let full = resolve_under_root_for_write(root, path).map_err(sandbox_error)?;
    if full.is_dir() {
        return Err(ToolError::InvalidArguments(format!("'{path}' is a directory")));
    }

    if let Some(parent) = full.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        return Ok(ToolResult::failure(format!("Failed to create directory: {e}")));
    }

    match tokio::fs::write(&full, content).await {
        Ok(()) => Ok(ToolResult::success(format!(
            "Wrote {} bytes to {}",
            content.len(),
            path.trim()
        ))),
        Err(e) => Ok(ToolResult::failure(format!("Failed to write file: {e}"))),
    }
}

/// List a directory under `root` as an indented tree, `/` marking
/// directories. `depth` 1 means direct children only.
pub(crate) async fn list_tree(
    root: &Path,
    path: &str,
    depth: Option<u64>,
    filter: ListFilter,
) -> Result<ToolResult, ToolError> {
    let path = if path.trim().is_empty() { "." } else { path };
    let full = resolve_under_root(root, path).map_err(sandbox_error)?;
    if !full.is_dir() {
        return Err(ToolError::InvalidArguments(format!("'{path}' is not a directory")));
    }
    let depth = depth.unwrap_or(1).clamp(1, MAX_LIST_DEPTH as u64) as u32;

    let listing = tokio::task::spawn_blocking(move || {
        let mut out = Vec::new();
        walk(&full, 0, depth, filter, &mut out).map(|_| out)
    })
    .await
    .map_err(|e| ToolError::ExecutionFailed {
        tool_name: "list".into(),
        reason: e.to_string(),
    })?;

    match listing {
        Ok(lines) if lines.is_empty() => Ok(ToolResult::success("(empty directory)")),
        Ok(lines) => Ok(ToolResult::success(lines.join("\n"))),
        Err(e) => Ok(ToolResult::failure(format!("Failed to list directory: {e}"))),
    }
}

fn walk(
    dir: &Path,
    current: u32,
    max_depth: u32,
    filter: ListFilter,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    if current >= max_depth {
        return Ok(());
    }
    let prefix = "  ".repeat(current as usize);
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let is_dir = path.is_dir();
        if filter == ListFilter::Markdown
            && !is_dir
            && path.extension().and_then(|e| e.to_str()) != Some("md")
        {
            continue;
        }
        let name = entry.file_name();
        let marker = if is_dir { "/" } else { "" };
        out.push(format!("{prefix}{}{marker}", name.to_string_lossy()));
        if is_dir {
            walk(&path, current + 1, max_depth, filter, out)?;
        }
    }
    Ok(())
}
