//! REPL session management

use std::io::{self, Write};

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::render::{StreamPrinter, format_message, format_sequence};
use crate::session::{SessionError, SessionEvent, SessionStatus, StreamOutcome, StreamSession};
use crate::source::ResetClient;

/// Interactive chat session
pub struct ReplSession {
    session: StreamSession,
    reset_client: Option<ResetClient>,
}

impl ReplSession {
    /// Create a REPL over `session`
    ///
    /// Without a reset client, `/reset` only clears local state.
    pub fn new(session: StreamSession, reset_client: Option<ResetClient>) -> Self {
        Self { session, reset_client }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        self.process_user_input(input).await;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C at the prompt: nothing is streaming
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Helix Outreach Assistant".bright_cyan().bold());
        println!("User: {}", self.session.context().user_id);
        println!(
            "Type {} for help, {} to quit, Ctrl+C to stop a reply",
            "/help".yellow(),
            "/quit".yellow()
        );
        println!();
    }

    async fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        debug!(%cmd, "ReplSession::handle_slash_command: called");

        match cmd {
            "/help" | "/h" => {
                self.print_help();
                SlashResult::Continue
            }
            "/quit" | "/q" | "/exit" => SlashResult::Quit,
            "/reset" | "/r" => {
                self.reset().await;
                SlashResult::Continue
            }
            "/sequence" | "/s" => {
                match self.session.current_sequence() {
                    Some(sequence) => println!("{}\n", format_sequence(&sequence)),
                    None => println!("{}", "No sequence generated yet.".dimmed()),
                }
                SlashResult::Continue
            }
            "/history" => {
                self.print_history();
                SlashResult::Continue
            }
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                SlashResult::Continue
            }
        }
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:14} Show this help", "/help".yellow());
        println!("  {:14} Exit the REPL", "/quit".yellow());
        println!("  {:14} Clear the conversation here and on the server", "/reset".yellow());
        println!("  {:14} Show the current sequence", "/sequence".yellow());
        println!("  {:14} Show conversation history", "/history".yellow());
        println!();
    }

    fn print_history(&self) {
        let transcript = self.session.snapshot();
        if transcript.is_empty() {
            println!("{}", "No conversation history.".dimmed());
            return;
        }

        println!();
        println!("{}", "Conversation History:".bright_cyan());
        for (i, message) in transcript.iter().enumerate() {
            println!("  {}. {}", i + 1, format_message(message));
        }
        println!();
    }

    /// Remote reset, then local
    ///
    /// A failed remote reset is reported but local state is cleared anyway.
    async fn reset(&mut self) {
        if let Some(client) = &self.reset_client {
            match client.reset(&self.session.context().user_id).await {
                Ok(message) => println!("{}", message.dimmed()),
                Err(e) => {
                    warn!(error = %e, "ReplSession::reset: remote reset failed");
                    println!("{} {}", "Server reset failed:".red(), e);
                }
            }
        }

        match self.session.reset() {
            Ok(()) => println!("{}", "Conversation cleared.".dimmed()),
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }

    /// Send one line and render the reply as it streams
    ///
    /// Ctrl+C while streaming cancels the reply; the partial text stays in the
    /// transcript.
    async fn process_user_input(&self, input: &str) {
        let mut events = self.session.subscribe();
        let printer = tokio::spawn(async move {
            let mut printer = StreamPrinter::new();
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let idle = matches!(
                            event,
                            SessionEvent::StatusChanged {
                                status: SessionStatus::Idle
                            }
                        );
                        if let Some(out) = printer.render(&event) {
                            print!("{}", out);
                            let _ = io::stdout().flush();
                        }
                        if idle {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ReplSession: printer lagged behind session events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let handle = self.session.handle();
        let send = self.session.send(input);
        tokio::pin!(send);

        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "ReplSession: failed to listen for Ctrl+C");
                    }
                    info!("ReplSession: Ctrl+C, cancelling reply");
                    handle.cancel();
                }
            }
        };

        match &result {
            // Nothing was streamed, so no Idle event will end the printer
            Ok(StreamOutcome::Skipped) | Err(SessionError::InvalidState(_)) => {
                printer.abort();
                if let Err(e) = &result {
                    println!("{} {}", "Error:".red(), e);
                }
            }
            _ => {
                let _ = printer.await;
            }
        }
        println!();
    }
}

/// Result of handling a slash command
enum SlashResult {
    Continue,
    Quit,
}
