//! Conversation transcript and sequence state

mod state;
mod types;

pub use state::{STEP_SEPARATOR, SequenceChannel, TranscriptError, TranscriptState, split_steps};
pub use types::{DELETING_STEP_TEXT, EDITING_TEXT, GENERATING_TEXT, Message, MessageKind, Role};
