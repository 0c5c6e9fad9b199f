//! Terminal rendering for transcripts, sequences and live session events

use colored::{ColoredString, Colorize};

use crate::session::{SessionEvent, SessionStatus};
use crate::transcript::{Message, MessageKind, Role, split_steps};

/// Style message text by kind
fn styled(message: &Message) -> ColoredString {
    match message.kind {
        MessageKind::Normal => message.content.normal(),
        MessageKind::GeneratingSequence => message.content.bright_magenta().italic(),
        MessageKind::EditingSequence => message.content.bright_yellow().italic(),
        MessageKind::DeletingStep => message.content.bright_red().italic(),
    }
}

fn role_label(role: Role) -> ColoredString {
    match role {
        Role::User => role.label().bright_green().bold(),
        Role::Assistant => role.label().bright_blue().bold(),
    }
}

/// One transcript entry as a labelled line
pub fn format_message(message: &Message) -> String {
    format!("{}: {}", role_label(message.role), styled(message))
}

/// Sequence block with numbered steps
pub fn format_sequence(sequence: &str) -> String {
    let steps = split_steps(sequence);
    if steps.is_empty() {
        return format!("{}", "Sequence is empty.".dimmed());
    }

    let mut out = format!("{}", "Generated Sequence".bright_cyan().bold());
    for (i, step) in steps.iter().enumerate() {
        let header = if i == 0 {
            "Initial Message".to_string()
        } else {
            format!("Follow-up {}", i)
        };
        out.push_str(&format!("\n\n{} {}\n{}", format!("{}.", i + 1).yellow(), header.yellow(), step));
    }
    out
}

/// Turns the session event stream into incremental terminal output
///
/// Assistant text that only grows is printed as a suffix. Anything else (a
/// status notice replacing text, or text replacing a notice) starts a fresh
/// line with the whole message.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    index: Option<usize>,
    printed: String,
    kind: MessageKind,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output for one event, if any
    pub fn render(&mut self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::TranscriptChanged { index, message } => self.render_message(*index, message),
            SessionEvent::SequenceChanged { sequence: Some(sequence) } => {
                Some(format!("\n\n{}\n\n", format_sequence(sequence)))
            }
            SessionEvent::SequenceChanged { sequence: None } => None,
            SessionEvent::TranscriptCleared => {
                *self = Self::default();
                None
            }
            SessionEvent::Failed { error } => Some(format!("\n{} {}", "Error:".red(), error)),
            SessionEvent::StatusChanged { status } => match status {
                SessionStatus::Cancelled => Some(format!("\n{}\n", "[cancelled]".yellow())),
                SessionStatus::Completed | SessionStatus::Failed => Some("\n".to_string()),
                SessionStatus::Idle | SessionStatus::Streaming => None,
            },
        }
    }

    fn render_message(&mut self, index: usize, message: &Message) -> Option<String> {
        // The user already sees what they typed
        if message.role == Role::User {
            return None;
        }

        let same = self.index == Some(index);
        let grows = same
            && message.kind == MessageKind::Normal
            && self.kind == MessageKind::Normal
            && message.content.starts_with(&self.printed);

        let out = if grows {
            message.content[self.printed.len()..].to_string()
        } else if same {
            format!("\n{}", styled(message))
        } else {
            format!("{}: {}", role_label(message.role), styled(message))
        };

        self.index = Some(index);
        self.printed = message.content.clone();
        self.kind = message.kind;

        if out.is_empty() { None } else { Some(out) }
    }
}
