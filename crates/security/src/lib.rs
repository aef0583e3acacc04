//! Security module for Veracity: sandboxing for side-effecting tools.
//!
//! Provides:
//! - **Path validation**: confine file and note tools to a configured root
//! - **Command screening**: refuse obviously destructive shell commands

pub mod command;
pub mod path;

pub use command::{blocked_pattern, is_command_blocked};
pub use path::{resolve_under_root, resolve_under_root_for_write, PathValidationError};
