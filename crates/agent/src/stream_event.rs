//! Turn-level streaming events.
//!
//! `TurnEvent` lifts provider chunks and orchestration steps into events a
//! front end can render as they happen.

use serde::{Deserialize, Serialize};

use crate::turn::TurnStatus;

/// Events emitted while a turn runs.
///
/// - `round_started`   — a new model stream is starting
/// - `delta`           — partial text from the model
/// - `tool_call`       — a tool is about to be dispatched
/// - `tool_result`     — the dispatched tool returned
/// - `claim_corrected` — an unsupported lookup claim was rewritten
/// - `final`           — the turn's answer
/// - `aborted`         — the turn was canceled
/// - `error`           — the turn ended with an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    RoundStarted { round: u32 },

    Delta { content: String },

    ToolCall {
        round: u32,
        name: String,
        arguments: serde_json::Value,
    },

    ToolResult {
        round: u32,
        name: String,
        ok: bool,
        output: String,
    },

    ClaimCorrected { pattern: String },

    Final {
        content: String,
        status: TurnStatus,
        rounds: u32,
    },

    Aborted { partial: String },

    Error { message: String },
}

impl TurnEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoundStarted { .. } => "round_started",
            Self::Delta { .. } => "delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ClaimCorrected { .. } => "claim_corrected",
            Self::Final { .. } => "final",
            Self::Aborted { .. } => "aborted",
            Self::Error { .. } => "error",
        }
    }
}
