//! # Veracity Core
//!
//! Domain types, traits, and error definitions for the Veracity runtime.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the turn engine is defined as a trait here:
//! the model backend ([`Provider`]) and the tool executor ([`ToolDispatcher`]).
//! Implementations live in their respective crates, so the engine can be
//! driven by scripted stand-ins in tests.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, StreamChunk, StreamReceiver};
pub use tool::{
    Capability, RiskLevel, Tool, ToolArguments, ToolDefinition, ToolDispatcher, ToolRegistry,
    ToolResult,
};
