//! Helix - streaming chat client
//!
//! CLI entry point for chatting with the Helix assistant.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use helix::cli::{Cli, Command, get_log_path};
use helix::config::Config;
use helix::repl::{self, format_message, format_sequence};
use helix::session::{SessionContext, StreamOutcome, StreamSession};
use helix::source::{ResetClient, ScriptedSource};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "Helix loaded config: server={} user={}",
        config.server.base_url, config.session.user_id
    );

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        None | Some(Command::Chat) => {
            debug!("main: matched Chat command");
            repl::run_interactive(&config).await
        }
        Some(Command::Send { message }) => {
            debug!("main: matched Send command");
            cmd_send(&config, &message).await
        }
        Some(Command::Replay { file, message }) => {
            debug!(?file, "main: matched Replay command");
            cmd_replay(&config, &file, &message).await
        }
        Some(Command::Reset) => {
            debug!("main: matched Reset command");
            cmd_reset(&config).await
        }
    }
}

/// One-shot exchange against the configured server
async fn cmd_send(config: &Config, message: &str) -> Result<()> {
    let session = StreamSession::from_config(config).context("Failed to create chat session")?;
    let result = session.send(message).await;
    print_session(&session);
    let outcome = result.context("Chat request failed")?;
    debug!(?outcome, "cmd_send: done");
    Ok(())
}

/// Decode a recorded stream offline
async fn cmd_replay(config: &Config, file: &Path, message: &str) -> Result<()> {
    let fragments = load_recording(file)?;
    info!(count = fragments.len(), file = %file.display(), "cmd_replay: loaded recording");

    let source = ScriptedSource::new(fragments);
    let session = StreamSession::new(
        Arc::new(source),
        SessionContext::new(config.session.user_id.clone()),
    );

    let outcome = session.send(message).await.context("Replay failed")?;
    if outcome == StreamOutcome::Skipped {
        eprintln!("{}", "Empty message, nothing replayed".yellow());
    }
    print_session(&session);
    Ok(())
}

/// Read a recording: one JSON string per line, blank lines ignored
fn load_recording(file: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(file).context(format!("Failed to read recording from {}", file.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<String>(line).context(format!("Invalid fragment on line {}", i + 1))
        })
        .collect()
}

async fn cmd_reset(config: &Config) -> Result<()> {
    let client = ResetClient::from_config(&config.server).context("Failed to create reset client")?;
    let message = client
        .reset(&config.session.user_id)
        .await
        .context("Reset request failed")?;
    println!("{}", message);
    Ok(())
}

fn print_session(session: &StreamSession) {
    for message in session.snapshot() {
        println!("{}", format_message(&message));
    }
    if let Some(sequence) = session.current_sequence() {
        println!();
        println!("{}", format_sequence(&sequence));
    }
}
