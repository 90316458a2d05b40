// ConvoFlow CLI
// Replays stored conversations and attaches to live agent channels.
//
// Run with: cargo run --bin convoflow -- replay history.json
//           cargo run --bin convoflow -- listen --session <id> --topic <id>
//
// Log level is taken from RUST_LOG (default: info); logs go to stderr.

mod input;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use convoflow_lib::models::{Message, ToolCallStatus};
use convoflow_lib::services::assembler::assemble_history;
use convoflow_lib::services::channel::{ChannelManager, ChannelUpdate, ForwardingListener};
use convoflow_lib::services::timeline::execution_for_message;
use convoflow_lib::services::ConversationSession;
use convoflow_lib::utils::ChannelConfig;

use input::{parse_input_line, InputCommand};

#[derive(Debug, Parser)]
#[command(name = "convoflow", version, about = "Assemble multi-agent conversation streams")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the assembled form of a stored message history (JSON array)
    Replay {
        file: PathBuf,
        /// Single-line JSON output
        #[arg(long)]
        compact: bool,
    },
    /// Connect to a live channel; stdin lines are sent as user messages
    Listen {
        #[arg(long, env = "CONVOFLOW_SESSION_ID")]
        session: String,
        #[arg(long, env = "CONVOFLOW_TOPIC_ID")]
        topic: String,
        /// Channel config file (defaults to the app data directory)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Base WebSocket URL, overrides config and environment
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try project root first, then current dir
    let _ = dotenvy::from_filename("../.env").or_else(|_| dotenvy::dotenv());
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay { file, compact } => {
            println!("{}", replay_file(&file, compact)?);
            Ok(())
        }
        Command::Listen {
            session,
            topic,
            config,
            url,
        } => {
            let mut config = match config {
                Some(path) => ChannelConfig::load_from(&path)?,
                None => ChannelConfig::load()?,
            };
            if let Some(url) = url {
                config.base_url = url;
            }
            listen(config, &session, &topic).await
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// replay
// ============================================================================

fn replay_file(path: &Path, compact: bool) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    replay_history(&content, compact)
}

fn replay_history(content: &str, compact: bool) -> anyhow::Result<String> {
    let messages: Vec<Message> =
        serde_json::from_str(content).context("history must be a JSON array of messages")?;
    let assembled = assemble_history(&messages);
    log::info!(
        "[replay] {} stored messages -> {} assembled",
        messages.len(),
        assembled.len()
    );

    let output = if compact {
        serde_json::to_string(&assembled)?
    } else {
        serde_json::to_string_pretty(&assembled)?
    };
    Ok(output)
}

// ============================================================================
// listen
// ============================================================================

async fn listen(config: ChannelConfig, session_id: &str, topic_id: &str) -> anyhow::Result<()> {
    let manager = ChannelManager::new(config);
    let (listener, mut updates) = ForwardingListener::channel();

    let status = manager.connect(session_id, topic_id, listener).await;
    if !status.connected {
        bail!(
            "connection failed: {}",
            status.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    eprintln!("Connected. Type a message, /confirm <id>, /cancel <id> or /quit.");

    let mut conversation = ConversationSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(ChannelUpdate::Status(status)) => {
                    if !status.connected {
                        match status.error {
                            Some(e) => log::warn!("[listen] Connection lost: {}", e),
                            None => log::info!("[listen] Connection closed"),
                        }
                        break;
                    }
                }
                Some(update) => {
                    if let Some(event) = update.into_event() {
                        if let Some(reply) = conversation.apply(event) {
                            print_reply(&reply);
                        }
                    }
                }
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match parse_input_line(&line) {
                    InputCommand::Send(text) => {
                        conversation.push_user_message(text.as_str());
                        manager.send_message(&text).await?;
                    }
                    InputCommand::Confirm(id) => manager.confirm_tool_call(&id).await?,
                    InputCommand::Cancel(id) => manager.cancel_tool_call(&id).await?,
                    InputCommand::Quit => break,
                    InputCommand::Empty => {}
                    InputCommand::Invalid(message) => eprintln!("{}", message),
                },
                None => stdin_open = false,
            },
            _ = &mut ctrl_c => {
                log::info!("[listen] Interrupted");
                break;
            }
        }
    }

    manager.disconnect().await;
    Ok(())
}

fn print_reply(reply: &Message) {
    println!("assistant [{}]> {}", reply.id, reply.content);

    for call in reply.tool_calls.iter().flatten() {
        let hint = if call.status == ToolCallStatus::WaitingConfirmation {
            " (use /confirm or /cancel)"
        } else {
            ""
        };
        println!("  tool {} [{}] {}{}", call.name, call.id, call.status, hint);
    }

    if let Some(execution) = execution_for_message(reply) {
        for phase in &execution.phases {
            println!("  phase {} - {}", phase.name, phase.status);
        }
    }
}
