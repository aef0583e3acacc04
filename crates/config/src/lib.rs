//! Configuration loading, validation, and management for Veracity.
//!
//! Loads configuration from `~/.veracity/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Turn-level knobs (temperature, strict tool mode, message window, round
//! cap) live in [`TurnConfig`] and are handed to the turn engine explicitly;
//! nothing in the engine reads ambient settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.veracity/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model backend
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Base system prompt; the tool block is appended per turn
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Turn engine settings
    #[serde(default)]
    pub turn: TurnConfig,

    /// Which tool groups are enabled and where they may act
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Fake-claim detection settings
    #[serde(default)]
    pub truthfulness: TruthfulnessConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.1:8b".into()
}
fn default_system_prompt() -> String {
    "You are a helpful local assistant. Answer accurately and concisely. \
     Never claim to have done something you did not actually do."
        .into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("system_prompt", &self.system_prompt)
            .field("turn", &self.turn)
            .field("tools", &self.tools)
            .field("truthfulness", &self.truthfulness)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Per-turn settings for the turn engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Sampling temperature for ordinary replies
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Use `strict_tool_temperature` whenever tools are enabled
    #[serde(default = "default_true")]
    pub strict_tool_mode: bool,

    /// Sampling temperature while tool calling is active in strict mode
    #[serde(default = "default_strict_tool_temperature")]
    pub strict_tool_temperature: f32,

    /// Maximum tokens per model response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// How many of the most recent history messages are sent each round
    #[serde(default = "default_message_window")]
    pub message_window: usize,

    /// Maximum tool rounds per turn before the last buffer is taken as the
    /// final answer
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_strict_tool_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_message_window() -> usize {
    20
}
fn default_max_tool_rounds() -> u32 {
    8
}

impl TurnConfig {
    /// The temperature for a turn with or without tools.
    pub fn effective_temperature(&self, tools_enabled: bool) -> f32 {
        if tools_enabled && self.strict_tool_mode {
            self.strict_tool_temperature
        } else {
            self.temperature
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            strict_tool_mode: true,
            strict_tool_temperature: default_strict_tool_temperature(),
            max_output_tokens: default_max_output_tokens(),
            message_window: default_message_window(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Tool group switches.
///
/// Filesystem and notes tools are only offered when their root is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub filesystem_enabled: bool,

    /// Sandbox root for `read_file`, `write_file`, `list_dir`
    #[serde(default)]
    pub filesystem_root: String,

    #[serde(default)]
    pub notes_enabled: bool,

    /// Markdown vault for `read_note`, `write_note`, `list_notes`
    #[serde(default)]
    pub notes_vault: String,

    /// Enables `web_search` and `fetch_url`
    #[serde(default)]
    pub web_search_enabled: bool,

    /// Enables `run_command`
    #[serde(default)]
    pub terminal_enabled: bool,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_web_max_results")]
    pub web_max_results: u32,
}

fn default_command_timeout() -> u64 {
    30
}
fn default_web_max_results() -> u32 {
    5
}

impl ToolsConfig {
    pub fn filesystem_active(&self) -> bool {
        self.filesystem_enabled && !self.filesystem_root.trim().is_empty()
    }

    pub fn notes_active(&self) -> bool {
        self.notes_enabled && !self.notes_vault.trim().is_empty()
    }
}

/// Fake-claim detection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TruthfulnessConfig {
    /// Additional case-insensitive regexes that count as claiming a web
    /// lookup, on top of the built-in set
    #[serde(default)]
    pub extra_claim_patterns: Vec<String>,

    /// Replaces the built-in corrective message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrective_message: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.veracity/config.toml).
    ///
    /// Also checks environment variables:
    /// - `VERACITY_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `VERACITY_PROVIDER`
    /// - `VERACITY_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("VERACITY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("VERACITY_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("VERACITY_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".veracity")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("turn.temperature", self.turn.temperature),
            ("turn.strict_tool_temperature", self.turn.strict_tool_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.turn.message_window == 0 {
            return Err(ConfigError::ValidationError(
                "turn.message_window must be > 0".into(),
            ));
        }

        if self.turn.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "turn.max_tool_rounds must be > 0".into(),
            ));
        }

        for pattern in &self.truthfulness.extra_claim_patterns {
            if let Err(e) = regex_lite::Regex::new(pattern) {
                return Err(ConfigError::ValidationError(format!(
                    "invalid claim pattern '{pattern}': {e}"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            system_prompt: default_system_prompt(),
            turn: TurnConfig::default(),
            tools: ToolsConfig {
                command_timeout_secs: default_command_timeout(),
                web_max_results: default_web_max_results(),
                ..ToolsConfig::default()
            },
            truthfulness: TruthfulnessConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
