//! End-to-end: a simple two-state cycle (spec.md §8 "stoplight").

use harel_fsm::config::StateConfig;
use harel_fsm::session::{Session, SessionOptions};

fn stoplight() -> StateConfig {
    serde_json::from_value(serde_json::json!({
        "name": "root",
        "kind": "compound",
        "initial": "red",
        "states": [
            {"name": "red", "transitions": [{"event": "tick", "target": "green"}]},
            {"name": "green", "transitions": [{"event": "tick", "target": "yellow"}]},
            {"name": "yellow", "transitions": [{"event": "tick", "target": "red"}]}
        ]
    }))
    .unwrap()
}

#[test]
fn starts_in_the_default_initial_state() {
    let session = Session::new(&stoplight(), SessionOptions::default()).unwrap();
    assert!(session.is_active("red"));
    assert!(!session.is_active("green"));
}

#[test]
fn tick_cycles_through_every_color_and_back() {
    let mut session = Session::new(&stoplight(), SessionOptions::default()).unwrap();
    session.trigger("tick", None).unwrap();
    assert!(session.is_active("green"));
    session.trigger("tick", None).unwrap();
    assert!(session.is_active("yellow"));
    session.trigger("tick", None).unwrap();
    assert!(session.is_active("red"));
}

#[test]
fn an_event_with_no_matching_transition_is_rejected_without_moving() {
    let mut session = Session::new(&stoplight(), SessionOptions::default()).unwrap();
    assert!(session.trigger("honk", None).is_err());
    assert!(session.is_active("red"));
}
