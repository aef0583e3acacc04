//! `veracity chat` — Interactive or single-message chat mode.
//!
//! Ctrl+C while a turn is running cancels that turn; the partial reply is
//! kept. Ctrl+C at the prompt exits.

use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use veracity_agent::{TurnEvent, TurnOrchestrator, TurnOutcome, TurnStatus};
use veracity_config::AppConfig;
use veracity_core::error::ProviderError;
use veracity_core::event::EventBus;
use veracity_core::message::{Conversation, Message};
use veracity_core::tool::ToolDefinition;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let router = veracity_providers::router::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| ProviderError::NotConfigured(config.default_provider.clone()))?;

    let registry = Arc::new(veracity_tools::registry_from_config(&config.tools));
    let tools = registry.definitions();
    let engine =
        TurnOrchestrator::from_config(&config, provider, registry, Arc::new(EventBus::default()))?;

    let mut conv = Conversation::new();

    if let Some(msg) = message {
        conv.push(Message::user(msg));
        let outcome = run_interruptible(&engine, &mut conv, &tools).await?;
        print_outcome(&outcome);
        return Ok(());
    }

    println!();
    println!("  Veracity — Interactive Mode");
    println!();
    println!("  Provider:  {}", router.default_name());
    println!("  Model:     {}", engine.model());
    if tools.is_empty() {
        println!("  Tools:     none");
    } else {
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        println!("  Tools:     {}", names.join(", "));
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C stops a running reply; 'exit' or Ctrl+C at the prompt quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        conv.push(Message::user(input));
        match run_interruptible(&engine, &mut conv, &tools).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one turn, canceling it on Ctrl+C.
async fn run_interruptible(
    engine: &TurnOrchestrator,
    conv: &mut Conversation,
    tools: &[ToolDefinition],
) -> Result<TurnOutcome, veracity_core::Error> {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(256);
    let progress = tokio::spawn(print_progress(rx));

    let outcome = {
        let turn = engine.run_turn(conv, tools, &cancel, Some(&tx));
        tokio::pin!(turn);
        loop {
            tokio::select! {
                result = &mut turn => break result,
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    eprintln!("\n  [Canceling…]");
                    cancel.cancel();
                }
            }
        }
    };

    drop(tx);
    let _ = progress.await;
    outcome
}

async fn print_progress(mut rx: mpsc::Receiver<TurnEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::ToolCall { name, arguments, .. } => {
                eprintln!("  [tool] {name} {arguments}");
            }
            TurnEvent::ToolResult { name, ok, .. } => {
                let status = if ok { "ok" } else { "failed" };
                eprintln!("  [tool] {name} {status}");
            }
            TurnEvent::ClaimCorrected { .. } => {
                eprintln!("  [note] an unsupported web-lookup claim was corrected");
            }
            _ => {}
        }
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!();
    for line in outcome.content.lines() {
        println!("  Assistant > {line}");
    }
    match outcome.status {
        TurnStatus::Aborted => println!("  (canceled)"),
        TurnStatus::RoundLimit => println!("  (stopped after too many tool calls)"),
        TurnStatus::Completed | TurnStatus::Corrected => {}
    }
    println!();
}
