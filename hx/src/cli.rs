//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Helix - streaming chat client
#[derive(Parser)]
#[command(
    name = "hx",
    about = "Chat with the Helix outreach-sequence assistant",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to `chat`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat session
    Chat,

    /// Send one message and print the streamed reply
    Send {
        /// Message text
        message: String,
    },

    /// Decode recorded fragments from a file (one JSON string per line)
    Replay {
        /// Recording to replay
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// User message the recording answers
        #[arg(short, long, default_value = "(replay)")]
        message: String,
    },

    /// Clear the server-side conversation history
    Reset,
}

/// Path of the log file written by `hx`
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("helix")
        .join("logs")
        .join("helix.log");
    debug!(?path, "get_log_path: returning path");
    path
}
