//! Domain events: observable facts about turns.
//!
//! The orchestrator publishes one of these at each turn milestone. Logging
//! sinks, front ends and tests subscribe to the bus without being wired
//! into the engine itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Turn milestones, each tagged with the conversation it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    TurnStarted {
        conversation_id: String,
        tools_enabled: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was dispatched; `success` mirrors the tool's `ok` flag
    ToolExecuted {
        conversation_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A final answer or written artifact claimed a web lookup that the
    /// ledger does not support, and was rewritten
    ClaimCorrected {
        conversation_id: String,
        pattern: String,
        timestamp: DateTime<Utc>,
    },

    TurnAborted {
        conversation_id: String,
        partial_chars: usize,
        timestamp: DateTime<Utc>,
    },

    TurnCompleted {
        conversation_id: String,
        rounds: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// The turn ended with a provider or dispatcher fault
    ErrorOccurred {
        conversation_id: String,
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::TurnStarted { conversation_id, .. }
            | Self::ToolExecuted { conversation_id, .. }
            | Self::ClaimCorrected { conversation_id, .. }
            | Self::TurnAborted { conversation_id, .. }
            | Self::TurnCompleted { conversation_id, .. }
            | Self::ErrorOccurred { conversation_id, .. } => conversation_id,
        }
    }
}

/// Fan-out of [`DomainEvent`]s over `tokio::sync::broadcast`.
///
/// Slow subscribers lag and lose the oldest events; publishing never blocks.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // Nobody listening
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
