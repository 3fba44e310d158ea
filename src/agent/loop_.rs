//! Interactive conversation loop: user text in, narrated results out.
//!
//! Each user turn runs at most one tool round: the model either answers
//! directly or proposes a single tool call, which is dispatched and fed
//! back for a final natural-language response. Multi-step plans are out of
//! scope by design.

use crate::agent::{context, system_prompt};
use crate::broker::SessionAdapter;
use crate::config::TradedeskConfig;
use crate::dispatch::{DispatchEngine, DispatchOutcome};
use crate::llm::ModelClient;
use crate::tools::{ToolDefinition, ToolRegistry};
use crate::types::{ChatMessage, InvocationResult, ToolCallIntent};
use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Commands that end the loop.
fn is_exit_command(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "exit" | "quit" | "q")
}

/// Affirmative answers to the confirmation prompt.
fn is_affirmative(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Run the interactive loop until exit or cancellation.
pub async fn run_chat_loop(
    config: TradedeskConfig,
    registry: Arc<ToolRegistry>,
    engine: DispatchEngine,
    model: ModelClient,
    session: Arc<SessionAdapter>,
    cancel: CancellationToken,
) -> Result<()> {
    let tool_defs: Vec<ToolDefinition> = registry.describe_all().collect();
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{} Financial assistant ready. How can I help you today? (type 'exit' to quit)",
        ">>>".green().bold(),
    );

    loop {
        let Some(line) = read_line("you> ", &mut lines, &cancel).await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if is_exit_command(&line) {
            break;
        }

        history.push(ChatMessage::user(line));

        let prompt = system_prompt::build_system_prompt(&config, session.is_degraded());
        let messages = context::build_messages(&prompt, &history, config.history_window);

        let reply = match model
            .chat(&config.model, &messages, &tool_defs, config.max_tokens_per_turn)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("{} model call failed: {e:#}", "error:".red().bold());
                history.pop();
                continue;
            }
        };

        // Direct answer: no tool round this turn.
        if reply.tool_calls.is_empty() {
            match reply.content {
                Some(content) if !content.trim().is_empty() => {
                    println!("{} {}", "desk>".cyan().bold(), content.trim());
                    history.push(ChatMessage::assistant(content));
                }
                _ => println!("{} (no response)", "desk>".cyan().bold()),
            }
            context::trim_history(&mut history, config.history_window);
            continue;
        }

        if reply.tool_calls.len() > 1 {
            warn!("Model proposed {} tool calls; dispatching the first", reply.tool_calls.len());
        }
        let Some(intent) = reply.tool_calls.into_iter().next() else {
            continue;
        };

        info!("Tool intent: {}({})", intent.name, intent.arguments);
        let result = dispatch_with_confirmation(&engine, &intent, &mut lines, &cancel).await?;

        let status = if result.success { "ok" } else { "failed" };
        println!("{}", format!("[tool {}] {}", intent.name, status).dimmed());

        history.push(ChatMessage::assistant(match reply.content {
            Some(ref content) if !content.trim().is_empty() => content.clone(),
            _ => format!("(requested tool {})", intent.name),
        }));
        history.push(ChatMessage::tool(result.to_model_text()));

        // Second model call narrates the result; no tools offered, so the
        // turn cannot chain into another call.
        let messages = context::build_messages(&prompt, &history, config.history_window);
        match model
            .chat(&config.model, &messages, &[], config.max_tokens_per_turn)
            .await
        {
            Ok(narration) => match narration.content {
                Some(content) if !content.trim().is_empty() => {
                    println!("{} {}", "desk>".cyan().bold(), content.trim());
                    history.push(ChatMessage::assistant(content));
                }
                _ => {
                    // Fall back to the raw result rather than staying silent.
                    println!("{} {}", "desk>".cyan().bold(), result.to_model_text());
                }
            },
            Err(e) => {
                eprintln!("{} narration failed: {e:#}", "error:".red().bold());
                println!("{} {}", "desk>".cyan().bold(), result.to_model_text());
            }
        }

        context::trim_history(&mut history, config.history_window);

        if cancel.is_cancelled() {
            break;
        }
    }

    println!("{} Goodbye.", "<<<".red().bold());
    Ok(())
}

/// Dispatch an intent, handling the policy's confirmation round by asking
/// the user interactively.
async fn dispatch_with_confirmation(
    engine: &DispatchEngine,
    intent: &ToolCallIntent,
    lines: &mut Lines<BufReader<Stdin>>,
    cancel: &CancellationToken,
) -> Result<InvocationResult> {
    match engine.dispatch(intent, false, cancel).await {
        DispatchOutcome::Finished(record) => Ok(record.result),
        DispatchOutcome::ConfirmationRequired { reason } => {
            println!(
                "{} {} requires confirmation: {}",
                "!".yellow().bold(),
                intent.name,
                reason,
            );
            let answer = read_line("confirm? [y/N] ", lines, cancel).await?;
            match answer {
                Some(line) if is_affirmative(&line) => {
                    match engine.dispatch(intent, true, cancel).await {
                        DispatchOutcome::Finished(record) => Ok(record.result),
                        // The policy already saw `confirmed`; a second
                        // confirmation round means it is misbehaving.
                        DispatchOutcome::ConfirmationRequired { .. } => {
                            Ok(InvocationResult::failure(
                                intent.name.as_str(),
                                "authorization_denied",
                                "the policy demanded confirmation twice",
                            ))
                        }
                    }
                }
                _ => Ok(InvocationResult::failure(
                    intent.name.as_str(),
                    "authorization_denied",
                    "the user declined to confirm this action",
                )),
            }
        }
    }
}

/// Prompt and read one line. Returns None on EOF or cancellation.
async fn read_line(
    prompt: &str,
    lines: &mut Lines<BufReader<Stdin>>,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    print!("{}", prompt.bold());
    std::io::stdout().flush()?;

    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = cancel.cancelled() => Ok(None),
    }
}
