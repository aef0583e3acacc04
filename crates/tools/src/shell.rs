//! `run_command` — execute a shell command and capture its output.
//!
//! Commands are screened against a destructive-command blocklist and
//! killed when they exceed the configured timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use veracity_core::error::ToolError;
use veracity_core::tool::{Capability, RiskLevel, Tool, ToolArguments, ToolResult};

use crate::required_str;

pub struct RunCommandTool {
    timeout: Duration,
}

impl RunCommandTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn default_working_dir() -> PathBuf {
        let home = if cfg!(target_os = "windows") {
            std::env::var("USERPROFILE")
        } else {
            std::env::var("HOME")
        };
        home.map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
    }

    fn working_dir(arguments: &ToolArguments) -> Result<PathBuf, ToolError> {
        match arguments
            .get("working_directory")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(dir) => {
                let path = Path::new(dir);
                if !path.is_dir() {
                    return Err(ToolError::InvalidArguments(format!(
                        "Working directory does not exist or is not a directory: {dir}"
                    )));
                }
                Ok(path.to_path_buf())
            }
            None => Ok(Self::default_working_dir()),
        }
    }
}

fn format_output(command: &str, dir: &Path, code: i32, stdout: &[u8], stderr: &[u8]) -> String {
    let mut sections = vec![
        format!("Command: {command}"),
        format!("Working directory: {}", dir.display()),
        format!("Exit code: {code}"),
    ];
    if !stdout.is_empty() {
        sections.push(format!("STDOUT:\n{}", String::from_utf8_lossy(stdout).trim_end()));
    }
    if !stderr.is_empty() {
        sections.push(format!("STDERR:\n{}", String::from_utf8_lossy(stderr).trim_end()));
    }
    if stdout.is_empty() && stderr.is_empty() {
        sections.push("(No output)".into());
    }
    sections.join("\n\n")
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its exit code, stdout and stderr. Destructive system commands are blocked."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" },
                "working_directory": { "type": "string", "description": "Absolute directory to run in (defaults to the home directory)" }
            },
            "additionalProperties": false
        })
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    fn capability(&self) -> Capability {
        Capability::Terminal
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<ToolResult, ToolError> {
        let command = required_str(arguments, "command")?;

        if let Some(pattern) = veracity_security::blocked_pattern(command) {
            warn!(command = %command, pattern, "Blocked command");
            return Err(ToolError::PermissionDenied {
                tool_name: "run_command".into(),
                reason: format!("command matches blocked pattern '{pattern}'"),
            });
        }

        let dir = Self::working_dir(arguments)?;
        debug!(command = %command, dir = %dir.display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&dir).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "run_command".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "run_command".into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let code = output.status.code().unwrap_or(-1);
        let text = format_output(command, &dir, code, &output.stdout, &output.stderr);
        if output.status.success() {
            Ok(ToolResult::success(text))
        } else {
            Ok(ToolResult::failure_with_content(
                text,
                format!("command exited with code {code}"),
            ))
        }
    }
}
