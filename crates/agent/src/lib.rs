//! The tool-calling turn engine at the heart of Veracity.
//!
//! A turn follows a **Stream → Parse → Act** cycle:
//!
//! 1. **Stream** a completion from the model (system prompt + tool block +
//!    a bounded window of recent messages)
//! 2. **Parse** the buffered text into a structured intent
//! 3. **If tool request**: dispatch exactly one tool, record it in the
//!    ledger, append the request and the result, loop back to step 1
//! 4. **If final answer**: check it against the ledger and emit it
//!
//! The loop ends on a final answer, on cancellation, or when the configured
//! tool-round cap is reached.

pub mod claims;
pub mod ledger;
pub mod parser;
pub mod prompt;
pub mod stream_event;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use claims::FakeClaimDetector;
pub use ledger::{InvocationStatus, InvokedToolEntry, ToolLedger, WebSearchSummary};
pub use parser::{ParsedIntent, parse};
pub use stream_event::TurnEvent;
pub use turn::{DEFAULT_CORRECTIVE_MESSAGE, TurnOrchestrator, TurnOutcome, TurnStatus};

/// Name of the tool whose successful invocations back web-lookup claims.
pub const WEB_SEARCH_TOOL: &str = "web_search";
