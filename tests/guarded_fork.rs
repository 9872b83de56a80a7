//! End-to-end: two candidate transitions on the same event from the
//! same state, disambiguated by guard conditions evaluated against the
//! `expr` datamodel (spec.md §8 "guarded fork").

use harel_fsm::config::StateConfig;
use harel_fsm::session::{Session, SessionOptions};

fn triage(initial_x: f64) -> StateConfig {
    serde_json::from_value(serde_json::json!({
        "name": "root",
        "kind": "compound",
        "initial": "start",
        "datamodel": {"data": [{"id": "x", "value": initial_x}]},
        "states": [
            {
                "name": "start",
                "transitions": [
                    {"event": "go", "cond": "x > 10", "target": "big"},
                    {"event": "go", "cond": "x > 0", "target": "small"},
                    {"event": "go", "target": "zero"}
                ]
            },
            {"name": "big"},
            {"name": "small"},
            {"name": "zero"}
        ]
    }))
    .unwrap()
}

fn run(initial_x: f64) -> Session {
    let mut session = Session::new(
        &triage(initial_x),
        SessionOptions {
            datamodel: "expr".to_string(),
            ..SessionOptions::default()
        },
    )
    .unwrap();
    session.trigger("go", None).unwrap();
    session
}

#[test]
fn takes_the_first_guard_that_is_satisfied() {
    assert!(run(42.0).is_active("big"));
    assert!(run(5.0).is_active("small"));
}

#[test]
fn falls_through_to_the_unconditional_transition() {
    assert!(run(-1.0).is_active("zero"));
}

#[test]
fn a_state_with_every_guard_rejected_and_no_fallback_reports_guard_not_satisfied() {
    let cfg: StateConfig = serde_json::from_value(serde_json::json!({
        "name": "root",
        "kind": "compound",
        "initial": "start",
        "datamodel": {"data": [{"id": "x", "value": -1.0}]},
        "states": [
            {"name": "start", "transitions": [{"event": "go", "cond": "x > 0", "target": "big"}]},
            {"name": "big"}
        ]
    }))
    .unwrap();
    let mut session = Session::new(
        &cfg,
        SessionOptions {
            datamodel: "expr".to_string(),
            ..SessionOptions::default()
        },
    )
    .unwrap();
    assert!(session.trigger("go", None).is_err());
    assert!(session.is_active("start"));
}
