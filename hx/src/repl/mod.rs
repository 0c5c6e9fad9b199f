//! Interactive REPL for Helix
//!
//! Streams replies as they arrive, prints sequence updates inline, and
//! supports slash commands.

mod render;
mod session;

pub use render::{StreamPrinter, format_message, format_sequence};
pub use session::ReplSession;

use eyre::{Context, Result};

use crate::config::Config;
use crate::session::StreamSession;
use crate::source::ResetClient;

/// Run the interactive REPL
///
/// This is the main entry point for `hx chat`.
pub async fn run_interactive(config: &Config) -> Result<()> {
    let session = StreamSession::from_config(config).context("Failed to create chat session")?;
    let reset_client = ResetClient::from_config(&config.server).context("Failed to create reset client")?;

    let mut repl = ReplSession::new(session, Some(reset_client));
    repl.run().await
}
