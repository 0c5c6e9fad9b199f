//! Marker classification for the chat stream
//!
//! Maps raw transport fragments to [`ControlEvent`]s. Pure functions only; the
//! session decides what each event does to the transcript.

mod marker;

pub use marker::{
    ControlEvent, DATA_PREFIX, DELETING_STEP_MARKER, EDITING_MARKER, GENERATING_MARKER, SEQUENCE_DATA_MARKER, classify,
};
