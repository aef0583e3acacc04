//! The turn orchestrator.
//!
//! One call to [`TurnOrchestrator::run_turn`] drives a single user turn:
//!
//! ```text
//! Streaming ─▶ Parsed ─┬─▶ Dispatching ─▶ Streaming (next round)
//!                      └─▶ Finalizing ─▶ Done
//!      (Aborted from Streaming or Dispatching on cancellation)
//! ```
//!
//! Rounds are strictly sequential and dispatch at most one tool each. The
//! [`ToolLedger`] is the only state carried between rounds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use veracity_config::{AppConfig, TurnConfig};
use veracity_core::error::{Error, ProviderError, Result};
use veracity_core::event::{DomainEvent, EventBus};
use veracity_core::message::{Conversation, Message, Role};
use veracity_core::provider::{Provider, ProviderRequest};
use veracity_core::tool::{ToolArguments, ToolDefinition, ToolDispatcher, ToolResult};

use crate::claims::FakeClaimDetector;
use crate::ledger::{InvokedToolEntry, ToolLedger, annotate_written_content};
use crate::parser::{self, ParsedIntent};
use crate::prompt;
use crate::stream_event::TurnEvent;

/// Replaces a final answer that claims a web lookup which never happened.
pub const DEFAULT_CORRECTIVE_MESSAGE: &str = "I can't browse the internet in this conversation, so I haven't searched for or looked up anything online. Anything I tell you comes from my built-in knowledge, which may be incomplete or out of date. If you need current information, enable web search and ask again.";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The model's answer was emitted verbatim
    Completed,
    /// The answer claimed an unsupported lookup and was replaced
    Corrected,
    /// The tool-round cap was hit; the last reply became the answer
    RoundLimit,
    /// Canceled by the caller or by a deadline
    Aborted,
}

/// The result of a turn that did not fail.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final answer, or the partial buffer when aborted
    pub content: String,
    pub status: TurnStatus,
    /// Model rounds streamed
    pub rounds: u32,
    pub ledger: ToolLedger,
}

#[derive(Default)]
struct StreamedRound {
    buffer: String,
    chunks: usize,
    canceled: bool,
    error: Option<ProviderError>,
}

/// Drives tool-calling turns against a provider and a tool dispatcher.
pub struct TurnOrchestrator {
    /// The model backend
    provider: Arc<dyn Provider>,

    /// Executes tool requests
    dispatcher: Arc<dyn ToolDispatcher>,

    /// The model to request
    model: String,

    /// Temperature, window and round settings
    config: TurnConfig,

    /// Base system prompt; the tool block is appended per turn
    system_prompt: String,

    /// Patterns for unsupported lookup claims
    detector: FakeClaimDetector,

    /// Text substituted for a final answer with an unsupported claim
    corrective_message: String,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl TurnOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        dispatcher: Arc<dyn ToolDispatcher>,
        model: impl Into<String>,
        config: TurnConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            model: model.into(),
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            detector: FakeClaimDetector::standard(),
            corrective_message: DEFAULT_CORRECTIVE_MESSAGE.to_string(),
            event_bus,
        }
    }

    /// Build an orchestrator from application config: turn settings,
    /// system prompt, model and truthfulness overrides.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        dispatcher: Arc<dyn ToolDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let detector = FakeClaimDetector::with_extra(&config.truthfulness.extra_claim_patterns)
            .map_err(|e| Error::Config {
                message: format!("invalid extra claim pattern: {e}"),
            })?;

        let mut orchestrator = Self::new(
            provider,
            dispatcher,
            config.default_model.clone(),
            config.turn.clone(),
            event_bus,
        )
        .with_system_prompt(config.system_prompt.clone())
        .with_detector(detector);

        if let Some(message) = config
            .truthfulness
            .corrective_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
        {
            orchestrator = orchestrator.with_corrective_message(message);
        }
        Ok(orchestrator)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_detector(mut self, detector: FakeClaimDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_corrective_message(mut self, message: impl Into<String>) -> Self {
        self.corrective_message = message.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Run one turn over `conversation` with `tools` enabled.
    ///
    /// The conversation should end with the user's message. Assistant
    /// replies and tool-result messages are appended to it as the turn
    /// progresses; a partial reply is kept when the turn is aborted or the
    /// provider fails mid-stream.
    ///
    /// Returns `Err` only when the provider or the dispatcher boundary
    /// faults. Cancellation is an `Ok` outcome with [`TurnStatus::Aborted`].
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Result<TurnOutcome> {
        let conversation_id = conversation.id.to_string();
        let mut ledger = ToolLedger::new(tools.iter().map(|t| t.name.clone()));
        let temperature = self.config.effective_temperature(!tools.is_empty());
        let system = prompt::system_prompt(&self.system_prompt, tools);
        let turn_start = conversation.messages.len();
        let events = &EventSink { tx: events, cancel };

        info!(
            conversation_id = %conversation_id,
            tools_enabled = tools.len(),
            temperature,
            "Turn started"
        );
        self.event_bus.publish(DomainEvent::TurnStarted {
            conversation_id: conversation_id.clone(),
            tools_enabled: tools.len(),
            timestamp: Utc::now(),
        });

        let mut round: u32 = 0;
        let mut tool_rounds: u32 = 0;

        loop {
            round += 1;
            debug!(conversation_id = %conversation_id, round, "Round started");
            events.emit(TurnEvent::RoundStarted { round }).await;

            let request = self.build_request(&system, conversation, turn_start, temperature);
            let streamed = self.stream_round(request, cancel, events).await;
            debug!(
                conversation_id = %conversation_id,
                round,
                chunks = streamed.chunks,
                canceled = streamed.canceled,
                "Stream finished"
            );

            if let Some(error) = streamed.error {
                if !streamed.buffer.trim().is_empty() {
                    conversation.push(Message::assistant(streamed.buffer));
                }
                return Err(self
                    .fail(&conversation_id, "provider stream", error.into(), events)
                    .await);
            }

            if streamed.canceled || cancel.is_cancelled() {
                return Ok(self
                    .abort(conversation, streamed.buffer, round, ledger, events)
                    .await);
            }

            let buffer = streamed.buffer;
            match parser::parse(&buffer) {
                ParsedIntent::FinalAnswer { content } => {
                    return Ok(self
                        .finalize(conversation, content, round, ledger, false, events)
                        .await);
                }

                ParsedIntent::ToolRequest {
                    tool_name,
                    arguments,
                } if ledger.is_available(&tool_name) => {
                    if tool_rounds >= self.config.max_tool_rounds {
                        warn!(
                            conversation_id = %conversation_id,
                            max_tool_rounds = self.config.max_tool_rounds,
                            tool = %tool_name,
                            "Tool round limit reached, using the last reply as the answer"
                        );
                        let content = buffer.trim().to_string();
                        return Ok(self
                            .finalize(conversation, content, round, ledger, true, events)
                            .await);
                    }

                    let arguments = self
                        .annotate_arguments(tools, &tool_name, arguments, &ledger, &conversation_id, events)
                        .await;
                    events
                        .emit(TurnEvent::ToolCall {
                            round,
                            name: tool_name.clone(),
                            arguments: serde_json::Value::Object(arguments.clone()),
                        })
                        .await;

                    let started_at = Utc::now();
                    let timer = Instant::now();
                    let dispatched = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = self.dispatcher.dispatch(&tool_name, &arguments) => Some(result),
                    };
                    let duration_ms = timer.elapsed().as_millis() as u64;

                    let Some(dispatched) = dispatched else {
                        return Ok(self.abort(conversation, buffer, round, ledger, events).await);
                    };

                    conversation.push(Message::assistant(&buffer));

                    let result = match dispatched {
                        Ok(result) => result,
                        Err(error) => {
                            warn!(tool = %tool_name, error = %error, duration_ms, "Tool dispatch faulted");
                            self.publish_tool_executed(&conversation_id, &tool_name, false, duration_ms);
                            return Err(self
                                .fail(&conversation_id, "tool dispatch", error.into(), events)
                                .await);
                        }
                    };

                    info!(tool = %tool_name, ok = result.ok, duration_ms, "Tool dispatched");
                    self.publish_tool_executed(&conversation_id, &tool_name, result.ok, duration_ms);

                    let feedback = tool_feedback(&result);
                    events
                        .emit(TurnEvent::ToolResult {
                            round,
                            name: tool_name.clone(),
                            ok: result.ok,
                            output: feedback.clone(),
                        })
                        .await;

                    ledger.record(InvokedToolEntry::from_result(
                        &tool_name,
                        arguments,
                        &result,
                        started_at,
                        Utc::now(),
                        round,
                    ));
                    conversation.push(Message::tool_result(&tool_name, &feedback));
                    tool_rounds += 1;
                }

                intent => {
                    match intent {
                        ParsedIntent::ToolRequest { tool_name, .. } => debug!(
                            tool = %tool_name,
                            "Requested tool is not enabled, treating reply as the answer"
                        ),
                        _ => debug!("Reply has no structured intent, treating it as the answer"),
                    }
                    let content = buffer.trim().to_string();
                    return Ok(self
                        .finalize(conversation, content, round, ledger, false, events)
                        .await);
                }
            }
        }
    }

    /// [`run_turn`](Self::run_turn) that aborts once `deadline` elapses.
    ///
    /// Canceling `cancel` still aborts early.
    pub async fn run_turn_with_deadline(
        &self,
        conversation: &mut Conversation,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
        deadline: Duration,
        events: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Result<TurnOutcome> {
        let token = cancel.child_token();
        let timer = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::time::sleep(deadline).await;
                debug!(deadline_ms = deadline.as_millis() as u64, "Turn deadline reached");
                token.cancel();
            }
        });

        let outcome = self.run_turn(conversation, tools, &token, events).await;
        timer.abort();
        outcome
    }

    /// System prompt, the most recent `message_window` messages from
    /// before the turn, then every message this turn has appended.
    fn build_request(
        &self,
        system: &str,
        conversation: &Conversation,
        turn_start: usize,
        temperature: f32,
    ) -> ProviderRequest {
        let history = conversation.window_before(turn_start, self.config.message_window);
        let this_turn = conversation.messages.get(turn_start..).unwrap_or_default();

        let mut messages = Vec::with_capacity(history.len() + this_turn.len() + 1);
        messages.push(Message::system(system));
        messages.extend(
            history
                .iter()
                .chain(this_turn)
                .filter(|m| m.role != Role::System)
                .cloned(),
        );

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: Some(self.config.max_output_tokens),
        }
    }

    /// Consume one model stream, sampling `cancel` before every chunk.
    async fn stream_round(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
        events: &EventSink<'_>,
    ) -> StreamedRound {
        let mut round = StreamedRound::default();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                round.canceled = true;
                return round;
            }
            opened = self.provider.stream(request) => opened,
        };
        let mut rx = match opened {
            Ok(rx) => rx,
            Err(e) => {
                round.error = Some(e);
                return round;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    round.canceled = true;
                    break;
                }
                next = rx.recv() => match next {
                    None => break,
                    Some(Err(e)) => {
                        round.error = Some(e);
                        break;
                    }
                    Some(Ok(chunk)) => {
                        round.chunks += 1;
                        if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                            round.buffer.push_str(&text);
                            events.emit(TurnEvent::Delta { content: text }).await;
                        }
                        if chunk.canceled {
                            round.canceled = true;
                            break;
                        }
                        if chunk.done {
                            break;
                        }
                    }
                }
            }
        }
        round
    }

    /// Rewrite the `content` argument of a content-writing tool: notices
    /// for unsupported or unverifiable claims, then the provenance footer.
    async fn annotate_arguments(
        &self,
        tools: &[ToolDefinition],
        tool_name: &str,
        mut arguments: ToolArguments,
        ledger: &ToolLedger,
        conversation_id: &str,
        events: &EventSink<'_>,
    ) -> ToolArguments {
        let is_writer = tools
            .iter()
            .any(|t| t.name == tool_name && t.is_content_writer());
        // A missing or non-string `content` is left for the tool to reject
        let original = match arguments.get("content") {
            Some(serde_json::Value::String(content)) if is_writer => content,
            _ => return arguments,
        };
        let annotated = annotate_written_content(original, ledger, &self.detector, Utc::now());

        if let Some(pattern) = annotated.unsupported_claim {
            warn!(
                conversation_id = %conversation_id,
                tool = %tool_name,
                pattern = %pattern,
                "Unsupported lookup claim in written content, prepending notice"
            );
            self.publish_claim_corrected(conversation_id, &pattern);
            events.emit(TurnEvent::ClaimCorrected { pattern }).await;
        }

        arguments.insert("content".into(), annotated.content.into());
        arguments
    }

    async fn finalize(
        &self,
        conversation: &mut Conversation,
        content: String,
        rounds: u32,
        ledger: ToolLedger,
        round_limited: bool,
        events: &EventSink<'_>,
    ) -> TurnOutcome {
        let conversation_id = conversation.id.to_string();
        let unsupported = if ledger.web_search_succeeded() {
            None
        } else {
            self.detector.detect(&content).map(str::to_string)
        };

        let (content, mut status) = match unsupported {
            Some(pattern) => {
                warn!(
                    conversation_id = %conversation_id,
                    pattern = %pattern,
                    "Unsupported lookup claim in final answer, substituting corrective message"
                );
                self.publish_claim_corrected(&conversation_id, &pattern);
                events.emit(TurnEvent::ClaimCorrected { pattern }).await;
                (self.corrective_message.clone(), TurnStatus::Corrected)
            }
            None => (content, TurnStatus::Completed),
        };
        if round_limited {
            status = TurnStatus::RoundLimit;
        }

        conversation.push(Message::assistant(&content));

        info!(
            conversation_id = %conversation_id,
            rounds,
            tool_calls = ledger.entries().len(),
            status = ?status,
            "Turn completed"
        );
        self.event_bus.publish(DomainEvent::TurnCompleted {
            conversation_id,
            rounds,
            tool_calls: ledger.entries().len(),
            timestamp: Utc::now(),
        });
        events
            .emit(TurnEvent::Final {
                content: content.clone(),
                status,
                rounds,
            })
            .await;

        TurnOutcome {
            content,
            status,
            rounds,
            ledger,
        }
    }

    async fn abort(
        &self,
        conversation: &mut Conversation,
        buffer: String,
        rounds: u32,
        ledger: ToolLedger,
        events: &EventSink<'_>,
    ) -> TurnOutcome {
        let partial_chars = buffer.chars().count();
        if !buffer.trim().is_empty() {
            conversation.push(Message::assistant(&buffer));
        }

        info!(conversation_id = %conversation.id, rounds, partial_chars, "Turn aborted");
        self.event_bus.publish(DomainEvent::TurnAborted {
            conversation_id: conversation.id.to_string(),
            partial_chars,
            timestamp: Utc::now(),
        });
        events
            .emit(TurnEvent::Aborted {
                partial: buffer.clone(),
            })
            .await;

        TurnOutcome {
            content: buffer,
            status: TurnStatus::Aborted,
            rounds,
            ledger,
        }
    }

    async fn fail(
        &self,
        conversation_id: &str,
        context: &str,
        error: Error,
        events: &EventSink<'_>,
    ) -> Error {
        warn!(conversation_id = %conversation_id, context, error = %error, "Turn failed");
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            conversation_id: conversation_id.to_string(),
            context: context.to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
        events
            .emit(TurnEvent::Error {
                message: error.to_string(),
            })
            .await;
        error
    }

    fn publish_tool_executed(
        &self,
        conversation_id: &str,
        tool_name: &str,
        success: bool,
        duration_ms: u64,
    ) {
        self.event_bus.publish(DomainEvent::ToolExecuted {
            conversation_id: conversation_id.to_string(),
            tool_name: tool_name.to_string(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    fn publish_claim_corrected(&self, conversation_id: &str, pattern: &str) {
        self.event_bus.publish(DomainEvent::ClaimCorrected {
            conversation_id: conversation_id.to_string(),
            pattern: pattern.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// The text fed back to the model for a tool result.
fn tool_feedback(result: &ToolResult) -> String {
    match (&result.error, result.ok) {
        (Some(error), false) if result.content.is_empty() => format!("Error: {error}"),
        (Some(error), false) => format!("{}\n\nError: {error}", result.content),
        _ => result.model_text().to_string(),
    }
}

/// Where a turn reports [`TurnEvent`]s.
///
/// A full channel applies backpressure until the turn is canceled; after
/// that, events that do not fit are dropped.
struct EventSink<'a> {
    tx: Option<&'a mpsc::Sender<TurnEvent>>,
    cancel: &'a CancellationToken,
}

impl EventSink<'_> {
    async fn emit(&self, event: TurnEvent) {
        let Some(tx) = self.tx else { return };
        tokio::select! {
            biased;
            // A dropped receiver only means nobody is watching
            _ = tx.send(event) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WEB_SEARCH_TOOL;
    use crate::ledger::{CAPABILITY_DISCLAIMER, InvocationStatus, UNVERIFIED_CLAIM_NOTICE};
    use crate::test_helpers::{
        FaultyDispatcher, HangingDispatcher, RecordingDispatcher, ScriptedProvider, Script,
        definition, search_output,
    };
    use veracity_core::error::ToolError;
    use veracity_core::provider::StreamChunk;
    use veracity_core::tool::Capability;

    fn orchestrator(
        provider: &Arc<ScriptedProvider>,
        dispatcher: Arc<dyn ToolDispatcher>,
    ) -> TurnOrchestrator {
        TurnOrchestrator::new(
            provider.clone(),
            dispatcher,
            "test-model",
            TurnConfig::default(),
            Arc::new(EventBus::default()),
        )
    }

    fn conversation(user: &str) -> Conversation {
        let mut conv = Conversation::new();
        conv.push(Message::user(user));
        conv
    }

    fn final_json(content: &str) -> String {
        serde_json::json!({"type": "final_answer", "content": content}).to_string()
    }

    fn tool_json(name: &str, arguments: serde_json::Value) -> String {
        serde_json::json!({"type": "tool_request", "tool_name": name, "arguments": arguments})
            .to_string()
    }

    #[tokio::test]
    async fn final_answer_is_emitted_verbatim() {
        let provider = Arc::new(ScriptedProvider::texts(&[&final_json("Paris.")]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));

        let mut conv = conversation("Capital of France?");
        let outcome = engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.content, "Paris.");
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.last().unwrap().role, Role::Assistant);
        assert_eq!(conv.last().unwrap().content, "Paris.");
    }

    #[tokio::test]
    async fn plain_text_falls_back_to_final_answer() {
        let provider = Arc::new(ScriptedProvider::texts(&["  Just some prose.\n"]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));

        let mut conv = conversation("hi");
        let outcome = engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(outcome.content, "Just some prose.");
        assert_eq!(outcome.status, TurnStatus::Completed);
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let request = tool_json("read_file", serde_json::json!({"path": "a.txt"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("It says hello.")]));
        let dispatcher = Arc::new(
            RecordingDispatcher::new().with_result("read_file", ToolResult::success("hello")),
        );
        let engine = orchestrator(&provider, dispatcher.clone());
        let tools = vec![definition("read_file", Capability::Filesystem, false)];

        let mut conv = conversation("What is in a.txt?");
        let outcome = engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.content, "It says hello.");
        assert_eq!(outcome.rounds, 2);
        assert_eq!(dispatcher.calls().len(), 1);
        assert_eq!(dispatcher.calls()[0].1["path"], "a.txt");

        let entries = outcome.ledger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "read_file");
        assert_eq!(entries[0].status, InvocationStatus::Success);
        assert_eq!(entries[0].round, 1);

        // user, assistant tool request, tool result, final answer
        let contents: Vec<_> = conv.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1], request);
        assert_eq!(contents[2], "Tool result (read_file):\nhello");
        assert_eq!(conv.messages[2].role, Role::User);
        assert_eq!(contents[3], "It says hello.");

        let second = &provider.requests()[1];
        assert!(second
            .messages
            .iter()
            .any(|m| m.content == "Tool result (read_file):\nhello"));
    }

    #[tokio::test]
    async fn failed_tool_result_is_fed_back() {
        let request = tool_json("read_file", serde_json::json!({"path": "missing.txt"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("No such file.")]));
        let dispatcher = Arc::new(
            RecordingDispatcher::new()
                .with_result("read_file", ToolResult::failure("File not found: missing.txt")),
        );
        let engine = orchestrator(&provider, dispatcher);
        let tools = vec![definition("read_file", Capability::Filesystem, false)];

        let mut conv = conversation("read missing.txt");
        let outcome = engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.ledger.entries()[0].status, InvocationStatus::Error);
        assert_eq!(
            conv.messages[2].content,
            "Tool result (read_file):\nError: File not found: missing.txt"
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_treated_as_text() {
        let request = tool_json("delete_everything", serde_json::json!({}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request]));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = orchestrator(&provider, dispatcher.clone());
        let tools = vec![definition("read_file", Capability::Filesystem, false)];

        let mut conv = conversation("go");
        let outcome = engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.content, request);
        assert!(dispatcher.calls().is_empty());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn fake_claim_without_tools_is_corrected() {
        let provider = Arc::new(ScriptedProvider::texts(&["After searching, the capital is Paris."]));
        let bus = Arc::new(EventBus::default());
        let mut bus_rx = bus.subscribe();
        let engine = TurnOrchestrator::new(
            provider.clone(),
            Arc::new(RecordingDispatcher::new()),
            "test-model",
            TurnConfig::default(),
            bus,
        );

        let mut conv = conversation("Capital of France?");
        let outcome = engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.content, DEFAULT_CORRECTIVE_MESSAGE);
        assert_eq!(outcome.status, TurnStatus::Corrected);
        assert_eq!(conv.last().unwrap().content, DEFAULT_CORRECTIVE_MESSAGE);

        let mut saw_correction = false;
        while let Ok(event) = bus_rx.try_recv() {
            if matches!(event.as_ref(), DomainEvent::ClaimCorrected { .. }) {
                saw_correction = true;
            }
        }
        assert!(saw_correction);
    }

    #[tokio::test]
    async fn custom_corrective_message() {
        let provider = Arc::new(ScriptedProvider::texts(&[&final_json("I looked it up: 42.")]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()))
            .with_corrective_message("No lookup happened.");

        let mut conv = conversation("?");
        let outcome = engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(outcome.content, "No lookup happened.");
    }

    #[tokio::test]
    async fn claim_backed_by_successful_search_is_kept() {
        let request = tool_json(WEB_SEARCH_TOOL, serde_json::json!({"query": "eiffel tower height"}));
        let answer = "After searching, the tower is 330 m tall.";
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json(answer)]));
        let dispatcher = Arc::new(RecordingDispatcher::new().with_result(
            WEB_SEARCH_TOOL,
            ToolResult::success(search_output(&["https://example.com/eiffel"])),
        ));
        let engine = orchestrator(&provider, dispatcher);
        let tools = vec![definition(WEB_SEARCH_TOOL, Capability::WebSearch, false)];

        let mut conv = conversation("How tall is the Eiffel tower?");
        let outcome = engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.content, answer);
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert!(outcome.ledger.web_search_succeeded());
    }

    #[tokio::test]
    async fn written_content_gets_notice_and_footer() {
        let request = tool_json(
            "write_file",
            serde_json::json!({"path": "notes.md", "content": "I searched the web and Rust 2.0 is out."}),
        );
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("Saved.")]));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = orchestrator(&provider, dispatcher.clone());
        let tools = vec![definition("write_file", Capability::Filesystem, true)];

        let mut conv = conversation("write a note");
        engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        let calls = dispatcher.calls();
        let content = calls[0].1["content"].as_str().unwrap();
        assert!(content.starts_with(UNVERIFIED_CLAIM_NOTICE));
        assert!(content.contains("I searched the web and Rust 2.0 is out."));
        assert!(content.contains("Sources: None (offline)"));
        assert!(content.trim_end().ends_with(CAPABILITY_DISCLAIMER));
        assert_eq!(calls[0].1["path"], "notes.md");
    }

    #[tokio::test]
    async fn non_writer_arguments_are_untouched() {
        let request = tool_json("read_file", serde_json::json!({"path": "a", "content": "x"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("ok")]));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = orchestrator(&provider, dispatcher.clone());
        let tools = vec![definition("read_file", Capability::Filesystem, false)];

        let mut conv = conversation("go");
        engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(dispatcher.calls()[0].1["content"], "x");
    }

    #[tokio::test]
    async fn writer_without_content_is_dispatched_unchanged() {
        let request = tool_json("write_file", serde_json::json!({"path": "a.md"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("Failed.")]));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = orchestrator(&provider, dispatcher.clone());
        let tools = vec![definition("write_file", Capability::Filesystem, true)];

        let mut conv = conversation("write a.md");
        engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.get("content").is_none());
        assert_eq!(calls[0].1.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_fault_ends_the_turn() {
        let request = tool_json("read_file", serde_json::json!({"path": "a"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("never")]));
        let engine = orchestrator(&provider, Arc::new(FaultyDispatcher));
        let tools = vec![definition("read_file", Capability::Filesystem, false)];

        let mut conv = conversation("go");
        let err = engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Tool(ToolError::ExecutionFailed { .. })));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.last().unwrap().content, request);
    }

    #[tokio::test]
    async fn provider_error_keeps_partial_reply() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::Chunks(vec![
            Ok(StreamChunk::delta("The answer")),
            Err(ProviderError::StreamInterrupted("connection reset".into())),
        ])]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));

        let mut conv = conversation("?");
        let err = engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::StreamInterrupted(_))));
        assert_eq!(conv.last().unwrap().content, "The answer");
    }

    #[tokio::test]
    async fn precanceled_turn_commits_nothing() {
        let provider = Arc::new(ScriptedProvider::texts(&[&final_json("unused")]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut conv = conversation("?");
        let outcome = engine.run_turn(&mut conv, &[], &cancel, None).await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert!(outcome.content.is_empty());
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancel_marker_keeps_partial_reply() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::Chunks(vec![
            Ok(StreamChunk::delta("Half an ans")),
            Ok(StreamChunk::canceled()),
        ])]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));

        let mut conv = conversation("?");
        let outcome = engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert_eq!(outcome.content, "Half an ans");
        assert_eq!(conv.last().unwrap().content, "Half an ans");
    }

    #[tokio::test]
    async fn cancel_during_stream() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::Hang(vec![Ok(
            StreamChunk::delta("partial"),
        )])]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(64);

        let canceler = cancel.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, TurnEvent::Delta { .. }) {
                    canceler.cancel();
                }
                if matches!(event, TurnEvent::Aborted { .. }) {
                    return true;
                }
            }
            false
        });

        let mut conv = conversation("?");
        let outcome = engine.run_turn(&mut conv, &[], &cancel, Some(&tx)).await.unwrap();
        drop(tx);

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert_eq!(outcome.content, "partial");
        assert!(watcher.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_a_stalled_stream() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::Hang(vec![Ok(
            StreamChunk::delta("thinking"),
        )])]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));
        let cancel = CancellationToken::new();

        let mut conv = conversation("?");
        let outcome = engine
            .run_turn_with_deadline(&mut conv, &[], &cancel, Duration::from_secs(30), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert_eq!(outcome.content, "thinking");
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_during_dispatch_aborts() {
        let request = tool_json("read_file", serde_json::json!({"path": "huge.log"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("never")]));
        let dispatcher = Arc::new(HangingDispatcher::default());
        let engine = orchestrator(&provider, dispatcher.clone());
        let tools = vec![definition("read_file", Capability::Filesystem, false)];
        let cancel = CancellationToken::new();

        let canceler = tokio::spawn({
            let cancel = cancel.clone();
            let dispatcher = dispatcher.clone();
            async move {
                dispatcher.started.notified().await;
                cancel.cancel();
            }
        });

        let mut conv = conversation("read huge.log");
        let outcome = engine.run_turn(&mut conv, &tools, &cancel, None).await.unwrap();
        canceler.await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert_eq!(outcome.content, request);
        assert!(outcome.ledger.is_empty());
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.last().unwrap().content, request);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_event_channel_does_not_block_cancel() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::Hang(vec![
            Ok(StreamChunk::delta("one")),
            Ok(StreamChunk::delta("two")),
        ])]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));
        let cancel = CancellationToken::new();
        // Nobody reads: round_started fills the channel
        let (tx, _rx) = mpsc::channel(1);

        let canceler = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        });

        let mut conv = conversation("?");
        let outcome = engine.run_turn(&mut conv, &[], &cancel, Some(&tx)).await.unwrap();
        canceler.await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert_eq!(outcome.content, "one");
    }

    #[tokio::test]
    async fn round_limit_uses_last_reply() {
        let request = tool_json("list_dir", serde_json::json!({"path": "."}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &request, &request]));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = TurnOrchestrator::new(
            provider.clone(),
            dispatcher.clone(),
            "test-model",
            TurnConfig {
                max_tool_rounds: 2,
                ..TurnConfig::default()
            },
            Arc::new(EventBus::default()),
        );
        let tools = vec![definition("list_dir", Capability::Filesystem, false)];

        let mut conv = conversation("loop forever");
        let outcome = engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::RoundLimit);
        assert_eq!(outcome.content, request);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(dispatcher.calls().len(), 2);
        assert_eq!(outcome.ledger.entries().len(), 2);
    }

    #[tokio::test]
    async fn request_carries_prompt_window_and_temperature() {
        let provider = Arc::new(ScriptedProvider::texts(&["a", "b"]));
        let engine = TurnOrchestrator::new(
            provider.clone(),
            Arc::new(RecordingDispatcher::new()),
            "test-model",
            TurnConfig {
                message_window: 4,
                ..TurnConfig::default()
            },
            Arc::new(EventBus::default()),
        )
        .with_system_prompt("Base prompt.");

        let mut conv = Conversation::new();
        for i in 0..10 {
            conv.push(Message::user(format!("m{i}")));
        }
        let tools = vec![definition("read_file", Capability::Filesystem, false)];
        engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();
        engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap();

        let requests = provider.requests();
        let with_tools = &requests[0];
        assert_eq!(with_tools.model, "test-model");
        assert_eq!(with_tools.max_tokens, Some(2048));
        assert!((with_tools.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(with_tools.messages.len(), 5);
        assert_eq!(with_tools.messages[0].role, Role::System);
        assert!(with_tools.messages[0].content.starts_with("Base prompt.\n\n## Tools"));
        assert_eq!(with_tools.messages[1].content, "m6");

        let without_tools = &requests[1];
        assert!((without_tools.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(without_tools.messages[0].content, "Base prompt.");
        assert_eq!(without_tools.messages[4].content, "a");
    }

    #[tokio::test]
    async fn tool_rounds_keep_the_question_in_the_window() {
        let first = tool_json("read_file", serde_json::json!({"path": "a.txt"}));
        let second = tool_json("read_file", serde_json::json!({"path": "b.txt"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&first, &second, &final_json("done")]));
        let engine = TurnOrchestrator::new(
            provider.clone(),
            Arc::new(RecordingDispatcher::new()),
            "test-model",
            TurnConfig {
                message_window: 4,
                ..TurnConfig::default()
            },
            Arc::new(EventBus::default()),
        );
        let tools = vec![definition("read_file", Capability::Filesystem, false)];

        let mut conv = Conversation::new();
        for i in 0..5 {
            conv.push(Message::user(format!("m{i}")));
        }
        conv.push(Message::user("THE QUESTION"));
        engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), None)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        for request in &requests {
            assert!(request.messages.iter().any(|m| m.content == "THE QUESTION"));
            assert_eq!(request.messages[1].content, "m2");
        }
        // system, four history messages, then two requests and two results
        let last = &requests[2].messages;
        assert_eq!(last.len(), 9);
        assert_eq!(last[4].content, "THE QUESTION");
        assert_eq!(last[5].content, first);
        assert_eq!(last[8].content, "Tool result (read_file):\nread_file ok");
    }

    #[tokio::test]
    async fn events_trace_the_turn() {
        let request = tool_json("read_file", serde_json::json!({"path": "a"}));
        let provider = Arc::new(ScriptedProvider::texts(&[&request, &final_json("done")]));
        let engine = orchestrator(&provider, Arc::new(RecordingDispatcher::new()));
        let tools = vec![definition("read_file", Capability::Filesystem, false)];
        let (tx, mut rx) = mpsc::channel(1024);

        let mut conv = conversation("go");
        engine
            .run_turn(&mut conv, &tools, &CancellationToken::new(), Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut kinds = Vec::new();
        let mut streamed = String::new();
        while let Some(event) = rx.recv().await {
            if let TurnEvent::Delta { content } = &event {
                streamed.push_str(content);
            } else {
                kinds.push(event.event_type());
            }
        }
        assert_eq!(
            kinds,
            vec!["round_started", "tool_call", "tool_result", "round_started", "final"]
        );
        assert_eq!(streamed, format!("{request}{}", final_json("done")));
    }

    #[tokio::test]
    async fn from_config_applies_truthfulness_overrides() {
        let provider = Arc::new(ScriptedProvider::texts(&["Per my google query, yes."]));
        let mut config = AppConfig::default();
        config.truthfulness.extra_claim_patterns = vec!["per my google query".into()];
        config.truthfulness.corrective_message = Some("Corrected.".into());

        let engine = TurnOrchestrator::from_config(
            &config,
            provider.clone(),
            Arc::new(RecordingDispatcher::new()),
            Arc::new(EventBus::default()),
        )
        .unwrap();
        assert_eq!(engine.model(), config.default_model);

        let mut conv = conversation("?");
        let outcome = engine
            .run_turn(&mut conv, &[], &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(outcome.content, "Corrected.");
    }

    #[test]
    fn from_config_rejects_bad_pattern() {
        let mut config = AppConfig::default();
        config.truthfulness.extra_claim_patterns = vec!["(".into()];
        let result = TurnOrchestrator::from_config(
            &config,
            Arc::new(ScriptedProvider::texts(&[])),
            Arc::new(RecordingDispatcher::new()),
            Arc::new(EventBus::default()),
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn feedback_formats_failures() {
        assert_eq!(tool_feedback(&ToolResult::success("out")), "out");
        assert_eq!(tool_feedback(&ToolResult::failure("boom")), "Error: boom");
        assert_eq!(
            tool_feedback(&ToolResult::failure_with_content("Exit code: 1", "exited 1")),
            "Exit code: 1\n\nError: exited 1"
        );
    }
}
