//! Command screening for the shell tool.
//!
//! A substring blocklist, matched case-insensitively. It catches the
//! obvious destructive commands; it is not a sandbox.

const BLOCKED_COMMAND_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "del /s /q c:\\",
    "format c:",
    "format d:",
    "mkfs",
    ":(){:|:&};:",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
    "dd if=",
    "diskpart",
    "bcdedit",
    "reg delete",
    "net user",
    "net localgroup",
    "schtasks /delete",
    "wmic os delete",
    "cipher /w:",
];

/// The first blocklist entry the command contains, if any.
pub fn blocked_pattern(command: &str) -> Option<&'static str> {
    let lower = command.to_lowercase();
    let pattern = BLOCKED_COMMAND_PATTERNS
        .iter()
        .copied()
        .find(|p| lower.contains(p))?;
    tracing::warn!(pattern, "Command matches the blocklist");
    Some(pattern)
}

pub fn is_command_blocked(command: &str) -> bool {
    blocked_pattern(command).is_some()
}
