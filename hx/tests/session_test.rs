//! Integration tests for the stream session
//!
//! These drive a full send through in-memory fragment sources and check what
//! observers see.

use std::sync::Arc;
use std::time::Duration;

use helix::session::{SessionContext, SessionError, SessionEvent, SessionStatus, StreamOutcome, StreamSession};
use helix::source::{ChannelSource, ScriptedSource};
use helix::transcript::{Message, MessageKind, Role};
use proptest::prelude::*;
use tokio::sync::broadcast;

fn scripted(fragments: &[&str]) -> StreamSession {
    let source = ScriptedSource::new(fragments.iter().copied());
    StreamSession::new(Arc::new(source), SessionContext::new("user123"))
}

/// Everything already published on `rx`
fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Contents of the assistant message at index 1, in publication order
fn open_message_history(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::TranscriptChanged { index: 1, message } => Some(message.content.clone()),
            _ => None,
        })
        .collect()
}

fn statuses(events: &[SessionEvent]) -> Vec<SessionStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StatusChanged { status } => Some(*status),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Decoding
// =============================================================================

#[tokio::test]
async fn test_end_to_end_trims_each_fragment() {
    let session = scripted(&["data: Hello", "data:  world"]);

    let outcome = session.send("hi").await.expect("send should succeed");

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(
        session.snapshot(),
        vec![Message::user("hi"), Message::assistant("Helloworld")]
    );
}

#[tokio::test]
async fn test_marker_replaces_open_message() {
    let session = scripted(&["data: ab", "data: [GENERATING_SEQUENCE]\n\n", "data: cd"]);
    let mut rx = session.subscribe();

    session.send("write a sequence").await.expect("send should succeed");

    let events = drain(&mut rx);
    assert_eq!(
        open_message_history(&events),
        vec!["", "ab", "Generating sequence...", "cd"]
    );

    let generating = events.iter().find_map(|e| match e {
        SessionEvent::TranscriptChanged { message, .. } if message.kind == MessageKind::GeneratingSequence => {
            Some(message.clone())
        }
        _ => None,
    });
    assert_eq!(generating, Some(Message::generating()));

    let last = session.snapshot().pop().expect("transcript should not be empty");
    assert_eq!(last.content, "cd");
    assert_eq!(last.kind, MessageKind::Normal);
}

#[tokio::test]
async fn test_every_marker_kind() {
    let cases = [
        ("data: [GENERATING_SEQUENCE]", MessageKind::GeneratingSequence, "Generating sequence..."),
        ("data: [EDITING_SEQUENCE]", MessageKind::EditingSequence, "Editing sequence..."),
        ("data: [DELETING_STEP]", MessageKind::DeletingStep, "Deleting step from the sequence..."),
    ];

    for (fragment, kind, text) in cases {
        let session = scripted(&["data: before", fragment]);
        session.send("go").await.expect("send should succeed");

        let last = session.snapshot().pop().expect("transcript should not be empty");
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.kind, kind, "fragment {fragment:?}");
        assert_eq!(last.content, text);
    }
}

#[tokio::test]
async fn test_sequence_data_goes_to_side_channel() {
    let session = scripted(&["data: x", "data: [SEQUENCE_DATA]plan\n\n"]);

    session.send("hi").await.expect("send should succeed");

    assert_eq!(session.snapshot()[1], Message::assistant("x"));
    assert_eq!(session.current_sequence().as_deref(), Some("plan"));
}

#[tokio::test]
async fn test_events_preserve_interleaving() {
    let session = scripted(&["data: x", "data: [SEQUENCE_DATA]Hi\n---\nFollow up", "data: y"]);
    let mut rx = session.subscribe();

    session.send("hi").await.expect("send should succeed");

    let relevant: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::TranscriptChanged { index: 1, message } => Some(format!("text:{}", message.content)),
            SessionEvent::SequenceChanged { sequence } => Some(format!("seq:{}", sequence.unwrap_or_default())),
            _ => None,
        })
        .collect();

    assert_eq!(relevant, vec!["text:", "text:x", "seq:Hi\n---\nFollow up", "text:xy"]);
}

#[tokio::test]
async fn test_latest_sequence_wins() {
    let session = scripted(&["data: [SEQUENCE_DATA]first", "data: [SEQUENCE_DATA]second"]);
    let sequence = session.handle().sequence();

    session.send("hi").await.expect("send should succeed");

    assert_eq!(sequence.borrow().get(), Some("second"));
}

#[tokio::test]
async fn test_status_lifecycle() {
    let session = scripted(&["data: ok"]);
    let mut rx = session.subscribe();

    session.send("hi").await.expect("send should succeed");

    assert_eq!(
        statuses(&drain(&mut rx)),
        vec![SessionStatus::Streaming, SessionStatus::Completed, SessionStatus::Idle]
    );
    assert!(!session.is_streaming());
}

#[tokio::test]
async fn test_snapshot_is_idempotent() {
    let session = scripted(&["data: one", "data: two"]);
    session.send("hi").await.expect("send should succeed");

    assert_eq!(session.snapshot(), session.snapshot());
}

#[tokio::test]
async fn test_conversation_accumulates_across_sends() {
    let session = scripted(&["data: reply"]);
    session.send("first").await.expect("send should succeed");
    session.send("second").await.expect("send should succeed");

    let transcript = session.snapshot();
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript[2], Message::user("second"));
    assert_eq!(transcript[3], Message::assistant("reply"));
}

// =============================================================================
// Cancellation and concurrency
// =============================================================================

#[tokio::test]
async fn test_cancel_discards_late_fragment() {
    let (source, tx) = ChannelSource::new();
    let session = Arc::new(StreamSession::new(Arc::new(source), SessionContext::new("u")));
    let handle = session.handle();
    let mut transcript = handle.transcript();
    let mut rx = handle.subscribe();

    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.send("hi").await })
    };

    tx.send(Ok("data: one".to_string())).expect("channel open");
    tx.send(Ok("data: two".to_string())).expect("channel open");
    tokio::time::timeout(
        Duration::from_secs(5),
        transcript.wait_for(|t| t.last().is_some_and(|m| m.content == "onetwo")),
    )
    .await
    .expect("fragments should be applied")
    .expect("session alive");

    handle.cancel();
    let _ = tx.send(Ok("data: three".to_string()));

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("send should finish after cancel")
        .expect("task should not panic")
        .expect("cancel is not an error");

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(session.snapshot()[1].content, "onetwo");
    assert!(!session.is_streaming());

    let events = drain(&mut rx);
    assert!(!open_message_history(&events).iter().any(|c| c.contains("three")));
    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Streaming, SessionStatus::Cancelled, SessionStatus::Idle]
    );
}

#[tokio::test]
async fn test_send_while_streaming_is_rejected() {
    let (source, tx) = ChannelSource::new();
    let session = Arc::new(StreamSession::new(Arc::new(source), SessionContext::new("u")));
    let mut transcript = session.handle().transcript();

    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.send("first").await })
    };

    tokio::time::timeout(Duration::from_secs(5), transcript.wait_for(|t| t.open_index().is_some()))
        .await
        .expect("stream should open")
        .expect("session alive");
    assert!(session.is_streaming());

    let err = session.send("second").await.expect_err("second send should be rejected");
    assert!(matches!(err, SessionError::InvalidState(_)));
    assert_eq!(session.snapshot().len(), 2);

    let err = session.reset().expect_err("reset should be rejected while streaming");
    assert!(err.is_invalid_state());

    tx.send(Ok("data: done".to_string())).expect("channel open");
    drop(tx);

    let outcome = task.await.expect("task should not panic").expect("first send should succeed");
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(session.snapshot(), vec![Message::user("first"), Message::assistant("done")]);
}

#[tokio::test]
async fn test_dropping_send_returns_to_idle() {
    let (source, _tx) = ChannelSource::new();
    let session = StreamSession::new(Arc::new(source), SessionContext::new("u"));

    let result = tokio::time::timeout(Duration::from_millis(50), session.send("hi")).await;

    assert!(result.is_err(), "send should still be waiting for fragments");
    assert!(!session.is_streaming());
    assert_eq!(session.handle().transcript().borrow().open_index(), None);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failure_keeps_partial_content() {
    let source = ScriptedSource::new(["data: Hel", "data: lo"]).failing_after(500, "upstream error");
    let session = StreamSession::new(Arc::new(source), SessionContext::new("u"));
    let mut rx = session.subscribe();

    let err = session.send("hi").await.expect_err("send should fail");

    assert_eq!(err.transport().and_then(|e| e.status()), Some(500));
    assert_eq!(session.snapshot()[1].content, "Hello");

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Failed { error } if error.contains("500"))));
    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Streaming, SessionStatus::Failed, SessionStatus::Idle]
    );

    // Usable again afterwards
    let err = session.send("again").await.expect_err("scripted failure repeats");
    assert!(err.transport().is_some());
    assert_eq!(session.snapshot().len(), 4);
}

// =============================================================================
// Properties
// =============================================================================

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    #[test]
    fn prop_plain_text_concatenates_trimmed_fragments(parts in proptest::collection::vec("[a-zA-Z0-9 ,.!?']{0,12}", 0..12)) {
        let fragments: Vec<String> = parts.iter().map(|p| format!("data: {p}")).collect();
        let expected: String = parts.iter().map(|p| p.trim()).collect();

        let session = StreamSession::new(Arc::new(ScriptedSource::new(fragments)), SessionContext::new("u"));
        let outcome = run(session.send("hi"));

        prop_assert_eq!(outcome.ok(), Some(StreamOutcome::Completed));
        let transcript = session.snapshot();
        prop_assert_eq!(transcript.len(), 2);
        prop_assert_eq!(&transcript[1].content, &expected);
    }
}
