//! Stream session
//!
//! [`StreamSession`] owns the transcript and the sequence slot for one
//! conversation and is their only writer. UI code observes through a
//! [`SessionHandle`]: latest-value `watch` receivers for rendering, or the
//! ordered [`SessionEvent`] stream when interleaving matters.

mod error;
mod events;
mod stream;

pub use error::SessionError;
pub use events::{DEFAULT_CHANNEL_CAPACITY, EventBus, SessionEvent, SessionStatus};
pub use stream::{SessionContext, SessionHandle, StreamOutcome, StreamSession};
