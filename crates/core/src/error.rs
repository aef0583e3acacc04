//! Errors that can end a turn.
//!
//! Failures a model can react to (a tool reporting `ok=false`, an
//! unparseable reply) are not errors. What remains are faults at the two
//! collaborator boundaries plus bad configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Faults reaching or streaming from a model backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Any non-success status without a more specific variant
    #[error("Model backend returned HTTP {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by the model backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model '{0}' is not available on this backend")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider '{0}' is not configured")]
    NotConfigured(String),

    #[error("Cannot reach the model backend: {0}")]
    Network(String),
}

/// Errors raised at the tool boundary.
///
/// Inside a [`crate::tool::ToolRegistry`] these are folded into failed
/// [`crate::tool::ToolResult`]s; only a missing tool escapes as an error.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("No tool named '{0}'")]
    NotFound(String),

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("{tool_name} refused: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Root directory not configured for {0}")]
    RootNotConfigured(String),
}
