//! Transcript message types
//!
//! A transcript is an ordered list of [`Message`]s. Only the session mutates
//! it; readers get snapshots.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Placeholder shown while a sequence is being generated
pub const GENERATING_TEXT: &str = "Generating sequence...";

/// Placeholder shown while a sequence is being edited
pub const EDITING_TEXT: &str = "Editing sequence...";

/// Placeholder shown while a step is being removed
pub const DELETING_STEP_TEXT: &str = "Deleting step from the sequence...";

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Display label used by the REPL
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Helix",
        }
    }
}

/// Why an assistant message looks the way it does
///
/// Presentation metadata only; no behavior hangs off it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    #[default]
    Normal,
    GeneratingSequence,
    EditingSequence,
    DeletingStep,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self {
            role: Role::User,
            content: text.into(),
            kind: MessageKind::Normal,
        }
    }

    /// Create a plain assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self {
            role: Role::Assistant,
            content: text.into(),
            kind: MessageKind::Normal,
        }
    }

    /// Assistant placeholder for a sequence being generated
    pub fn generating() -> Self {
        Self::status(GENERATING_TEXT, MessageKind::GeneratingSequence)
    }

    /// Assistant placeholder for a sequence being edited
    pub fn editing() -> Self {
        Self::status(EDITING_TEXT, MessageKind::EditingSequence)
    }

    /// Assistant placeholder for a step being deleted
    pub fn deleting_step() -> Self {
        Self::status(DELETING_STEP_TEXT, MessageKind::DeletingStep)
    }

    fn status(text: &str, kind: MessageKind) -> Self {
        Self {
            role: Role::Assistant,
            content: text.to_string(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("hi");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.kind, MessageKind::Normal);

        let msg = Message::generating();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Generating sequence...");
        assert_eq!(msg.kind, MessageKind::GeneratingSequence);

        assert_eq!(Message::editing().kind, MessageKind::EditingSequence);
        assert_eq!(Message::deleting_step().content, "Deleting step from the sequence...");
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::editing();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["kind"], "editing-sequence");

        let parsed: Message = serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        assert_eq!(parsed, Message::user("hello"));
    }
}
