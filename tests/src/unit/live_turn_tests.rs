use ponder::ui::LiveTurn;
use ponder_core::stream::LiveEvent;

#[test]
fn live_turn_tracks_phase_and_elapsed() {
    let mut live = LiveTurn::default();

    live.apply(&LiveEvent::Reasoning {
        text: "step one; ".to_string(),
    });
    live.apply(&LiveEvent::Reasoning {
        text: "step two".to_string(),
    });
    assert!(live.thinking);
    assert_eq!(live.reasoning, "step one; step two");
    assert!(live.answer.is_empty());

    live.apply(&LiveEvent::Content {
        text: "therefore: ".to_string(),
        elapsed_reasoning_secs: Some(4),
    });
    live.apply(&LiveEvent::Content {
        text: "yes".to_string(),
        elapsed_reasoning_secs: Some(4),
    });
    assert!(!live.thinking);
    assert_eq!(live.elapsed_secs, Some(4));
    assert_eq!(live.answer, "therefore: yes");
}

#[test]
fn live_turn_without_reasoning_has_no_elapsed() {
    let mut live = LiveTurn::default();
    live.apply(&LiveEvent::Content {
        text: "Hello".to_string(),
        elapsed_reasoning_secs: None,
    });
    assert!(!live.thinking);
    assert_eq!(live.elapsed_secs, None);
    assert!(live.reasoning.is_empty());
}
