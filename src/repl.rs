use anyhow::Result;
use futures::StreamExt;
use roadmate_core::config::AppConfig;
use roadmate_core::types::TurnKind;
use roadmate_core::{Orchestrator, StreamEvent};
use rustyline::error::ReadlineError;
use rustyline::{Config as RlConfig, DefaultEditor};
use std::io::Write;

const HELP: &str = "  /session <id>  Switch to (or start) a session
  /new           Start a fresh session
  /history       Show this session's transcript
  /tools         List the agent's tools
  /config        Show current config
  /help          Show this help
  /exit          Quit";

fn fresh_session_id() -> String {
    format!("cli-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"))
}

/// Run the interactive REPL.
pub async fn run(config: &AppConfig, orchestrator: Orchestrator, session: Option<String>) -> Result<()> {
    let mut session_id = session.unwrap_or_else(fresh_session_id);

    println!();
    println!("  roadmate v{}  |  agent: {}", env!("CARGO_PKG_VERSION"), orchestrator.profile().name);
    println!("  Model: {}  |  Endpoint: {}", config.provider.model, config.provider.api_base);
    println!("  Type a message and press Enter. /help lists commands.");
    println!();

    let rl_config = RlConfig::builder().auto_add_history(true).build();
    let history_path = AppConfig::data_dir().join("repl_history.txt");
    let mut rl = DefaultEditor::with_config(rl_config)?;
    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("\x1b[1;36m{}\x1b[0m \x1b[1;32m❯\x1b[0m ", session_id);

        match rl.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                if input.starts_with('/') {
                    if !handle_command(input, &mut session_id, &orchestrator, config).await? {
                        break;
                    }
                    continue;
                }

                let mut events = match orchestrator.stream_message(&session_id, input) {
                    Ok(events) => events,
                    Err(e) => {
                        eprintln!("\x1b[0;31mError: {}\x1b[0m", e);
                        continue;
                    }
                };

                print!("\x1b[1;33massistant\x1b[0m: ");
                while let Some(event) = events.next().await {
                    match event {
                        StreamEvent::Content(text) => {
                            print!("{}", text);
                            let _ = std::io::stdout().flush();
                        }
                        StreamEvent::Done => break,
                        StreamEvent::Error(e) => {
                            print!("\n\x1b[0;31mError: {}\x1b[0m", e);
                            break;
                        }
                    }
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.save_history(&history_path);

    Ok(())
}

/// Handle a slash command. Returns `true` to continue the loop, `false` to exit.
async fn handle_command(
    input: &str,
    session_id: &mut String,
    orchestrator: &Orchestrator,
    config: &AppConfig,
) -> Result<bool> {
    let (cmd, arg) = match input.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };

    match cmd {
        "/exit" | "/quit" | "/q" => {
            println!("Goodbye!");
            return Ok(false);
        }
        "/session" => {
            if arg.is_empty() {
                println!("  Current session: {}", session_id);
            } else {
                *session_id = arg.to_string();
                println!("Switched to session: {}", session_id);
            }
        }
        "/new" => {
            *session_id = fresh_session_id();
            println!("Started session: {}", session_id);
        }
        "/history" => {
            let turns = orchestrator.transcript(session_id).await?;
            if turns.is_empty() {
                println!("  No messages yet.");
            }
            for turn in turns {
                let who = match turn.kind {
                    TurnKind::UserMessage { .. } => "you",
                    _ => "assistant",
                };
                println!(
                    "  [{}] {}: {}",
                    turn.timestamp.format("%H:%M"),
                    who,
                    turn.text().unwrap_or_default()
                );
            }
        }
        "/tools" => {
            let tools = &orchestrator.profile().tools;
            if tools.is_empty() {
                println!("  No tools enabled for this agent.");
            } else {
                println!("  Tools ({}):", tools.len());
                for name in tools {
                    println!("    • {}", name);
                }
            }
        }
        "/config" => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        "/help" | "/?" => println!("{}", HELP),
        _ => {
            println!("Unknown command: {}. Type /help for available commands.", cmd);
        }
    }

    Ok(true)
}
