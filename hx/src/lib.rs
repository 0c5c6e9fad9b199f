//! Helix - streaming chat client for the Helix outreach-sequence assistant
//!
//! Helix chats with a recruiting assistant that streams its answer back as
//! server-sent text fragments. Some fragments are in-band control markers:
//! they swap the pending assistant message for a status notice, or carry the
//! outreach sequence being drafted on the side.
//!
//! # Modules
//!
//! - [`decoder`] - Classifies one fragment into a control event
//! - [`transcript`] - Ordered messages and the sequence slot
//! - [`session`] - Drives a send, applies events, handles cancellation
//! - [`source`] - Fragment sources (HTTP, scripted, channel)
//! - [`repl`] - Interactive terminal chat
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod decoder;
pub mod repl;
pub mod session;
pub mod source;
pub mod transcript;

// Re-export commonly used types
pub use config::{Config, ServerConfig, SessionConfig};
pub use decoder::{ControlEvent, classify};
pub use session::{SessionContext, SessionError, SessionEvent, SessionHandle, SessionStatus, StreamOutcome, StreamSession};
pub use source::{
    ChannelSource, ChatRequest, FragmentSource, FragmentStream, HttpFragmentSource, ResetClient, ScriptedSource,
    TransportError,
};
pub use transcript::{Message, MessageKind, Role, SequenceChannel, TranscriptState};
