//! Fragment classification against the in-band control markers
//!
//! Classification is fragment-local: each fragment is inspected on its own and
//! nothing is carried over from the previous one. A marker that the transport
//! splits across two fragments is therefore seen by neither.

use tracing::{debug, trace};

/// Marker sent when the assistant starts generating a new sequence
pub const GENERATING_MARKER: &str = "[GENERATING_SEQUENCE]";

/// Marker sent when the assistant starts editing the current sequence
pub const EDITING_MARKER: &str = "[EDITING_SEQUENCE]";

/// Marker sent when the assistant starts deleting a step
pub const DELETING_STEP_MARKER: &str = "[DELETING_STEP]";

/// Marker that prefixes an out-of-band sequence payload
pub const SEQUENCE_DATA_MARKER: &str = "[SEQUENCE_DATA]";

/// Prefix carried by every data fragment
pub const DATA_PREFIX: &str = "data: ";

/// Removed once from a sequence fragment to expose its payload
const SEQUENCE_DATA_PREFIX: &str = "data: [SEQUENCE_DATA]";

/// What a single fragment means to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Sequence generation started
    Generating,

    /// Sequence edit started
    Editing,

    /// Step deletion started
    DeletingStep,

    /// Out-of-band sequence payload, marker and prefix stripped
    SequenceData(String),

    /// Plain assistant text, prefix stripped and trimmed
    TextDelta(String),

    /// Keep-alives and anything else without a recognised shape
    Ignored,
}

impl ControlEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ControlEvent::Generating => "generating",
            ControlEvent::Editing => "editing",
            ControlEvent::DeletingStep => "deleting_step",
            ControlEvent::SequenceData(_) => "sequence_data",
            ControlEvent::TextDelta(_) => "text_delta",
            ControlEvent::Ignored => "ignored",
        }
    }
}

/// Classify one raw fragment
///
/// The check order is fixed: the three status markers win over sequence data,
/// and sequence data wins over a generic `data: ` fragment.
pub fn classify(fragment: &str) -> ControlEvent {
    trace!(len = fragment.len(), "classify: called");

    if fragment.contains(GENERATING_MARKER) {
        debug!("classify: generating marker");
        return ControlEvent::Generating;
    }
    if fragment.contains(EDITING_MARKER) {
        debug!("classify: editing marker");
        return ControlEvent::Editing;
    }
    if fragment.contains(DELETING_STEP_MARKER) {
        debug!("classify: deleting step marker");
        return ControlEvent::DeletingStep;
    }
    if fragment.contains(SEQUENCE_DATA_MARKER) {
        let payload = fragment.replacen(SEQUENCE_DATA_PREFIX, "", 1);
        let payload = payload.trim();
        debug!(payload_len = payload.len(), "classify: sequence data");
        return ControlEvent::SequenceData(payload.to_string());
    }
    if let Some(rest) = fragment.strip_prefix(DATA_PREFIX) {
        let text = rest.trim();
        // Sequence payloads never reach the transcript
        if text.contains(SEQUENCE_DATA_MARKER) {
            return ControlEvent::Ignored;
        }
        trace!(text_len = text.len(), "classify: text delta");
        return ControlEvent::TextDelta(text.to_string());
    }

    trace!("classify: ignored");
    ControlEvent::Ignored
}
