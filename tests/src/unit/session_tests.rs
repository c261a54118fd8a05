use ponder_core::error::ChatError;
use ponder_core::llm::{MockBackend, RawDelta};
use ponder_core::state::{ChatSession, MessageContent, MessageRole};
use ponder_core::stream::LiveEvent;
use std::sync::Arc;
use std::time::Duration;

fn session_with(backend: MockBackend) -> ChatSession {
    let session = ChatSession::new(Arc::new(backend));
    session.select_model("mock", "mock-model").expect("select");
    session
}

#[tokio::test]
async fn plain_turn_collapses_to_plain_content() {
    let session = session_with(MockBackend::scripted(vec![
        RawDelta::content("He"),
        RawDelta::content("llo"),
    ]));

    let mut events = Vec::new();
    let message = session
        .submit_turn("hi", Vec::new(), |event| events.push(event.clone()))
        .await
        .expect("turn");

    assert_eq!(message.content, MessageContent::Plain("Hello".to_string()));
    assert!(events.iter().all(|event| matches!(
        event,
        LiveEvent::Content {
            elapsed_reasoning_secs: None,
            ..
        }
    )));
}

#[tokio::test]
async fn inline_sentinels_split_reasoning_from_answer() {
    let session = session_with(MockBackend::scripted(vec![
        RawDelta::content("<think>"),
        RawDelta::content("abc"),
        RawDelta::content("</think>"),
        RawDelta::content("xyz"),
    ]));

    let message = session
        .submit_turn("hi", Vec::new(), |_| {})
        .await
        .expect("turn");

    match &message.content {
        MessageContent::Phased {
            reasoning, answer, ..
        } => {
            assert_eq!(reasoning, "abc");
            assert_eq!(answer, "xyz");
        }
        other => panic!("expected phased content, got {other:?}"),
    }
}

#[tokio::test]
async fn reasoning_never_reaches_the_flattened_context() {
    let session = session_with(MockBackend::scripted(vec![
        RawDelta::reasoning("R"),
        RawDelta::content("A"),
    ]));

    session
        .submit_turn("first question", Vec::new(), |_| {})
        .await
        .expect("turn");

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content.reasoning_text(), Some("R"));
    assert_eq!(history[1].content.answer_text(), "A");
}

#[tokio::test]
async fn failed_turn_keeps_user_message_only() {
    let session = session_with(MockBackend::failing_after(
        vec![RawDelta::reasoning("partial"), RawDelta::content("thought")],
        2,
    ));

    let mut events = Vec::new();
    let err = session
        .submit_turn("doomed", Vec::new(), |event| events.push(event.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Provider { .. }));
    assert!(!events.is_empty());

    let history = session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[0].content.answer_text(), "doomed");
}

#[tokio::test]
async fn failed_turn_allows_resubmission() {
    let session = session_with(MockBackend::failing_after(Vec::new(), 0));
    assert!(session
        .submit_turn("retry me", Vec::new(), |_| {})
        .await
        .is_err());

    // The busy flag must be released after a failure.
    let err = session.submit_turn_streaming("again", Vec::new());
    assert!(err.is_ok());
}

#[tokio::test]
async fn second_turn_is_rejected_while_streaming() {
    let session = session_with(MockBackend::stalling(vec![RawDelta::content("…")]));

    let _rx = session
        .submit_turn_streaming("first", Vec::new())
        .expect("first turn starts");
    // Let the spawned turn reach its stalled stream.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = session
        .submit_turn_streaming("second", Vec::new())
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn turn_without_selection_is_a_validation_error() {
    let session = ChatSession::new(Arc::new(MockBackend::scripted(Vec::new())));
    let err = session
        .submit_turn("hello", Vec::new(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn clear_resets_history_but_not_selection() {
    let session = session_with(MockBackend::scripted(vec![RawDelta::content("ok")]));
    session
        .submit_turn("hello", Vec::new(), |_| {})
        .await
        .expect("turn");
    assert_eq!(session.history().len(), 2);

    session.clear();
    assert!(session.history().is_empty());
    assert!(session.selection().is_some());
}

#[tokio::test]
async fn attachments_are_recorded_on_the_user_message() {
    let session = session_with(MockBackend::scripted(vec![RawDelta::content("seen")]));
    session
        .submit_turn("look", vec!["notes.txt".to_string()], |_| {})
        .await
        .expect("turn");

    let history = session.history();
    assert_eq!(history[0].attachments, vec!["notes.txt".to_string()]);
    assert!(history[1].attachments.is_empty());
}
