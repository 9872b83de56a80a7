//! Active-configuration invariants that must hold after *any* sequence
//! of `trigger` calls, matching or not (spec.md §9 Design Notes: "the
//! active configuration is a well-formed ancestor-closed set").

use harel_fsm::config::StateConfig;
use harel_fsm::session::{Session, SessionOptions};

fn intersection() -> StateConfig {
    serde_json::from_value(serde_json::json!({
        "name": "root",
        "kind": "compound",
        "initial": "crossing",
        "states": [{
            "name": "crossing",
            "kind": "parallel",
            "states": [
                {
                    "name": "ns",
                    "kind": "compound",
                    "initial": "ns_go",
                    "states": [
                        {"name": "ns_go", "transitions": [{"event": "ns_stop", "target": "ns_stop"}]},
                        {"name": "ns_stop", "transitions": [{"event": "ns_go", "target": "ns_go"}]}
                    ]
                },
                {
                    "name": "ew",
                    "kind": "compound",
                    "initial": "ew_stop",
                    "states": [
                        {"name": "ew_go", "transitions": [{"event": "ew_stop", "target": "ew_stop"}]},
                        {"name": "ew_stop", "transitions": [{"event": "ew_go", "target": "ew_go"}]}
                    ]
                }
            ]
        }]
    }))
    .unwrap()
}

/// Both parallel regions and the root are active whenever any of their
/// descendants are — the root and `crossing` can never exit on their
/// own since nothing in this fixture targets outside `crossing`.
fn assert_ancestor_closed(session: &Session) {
    assert!(session.is_active("root"));
    assert!(session.is_active("crossing"));
    assert!(session.is_active("ns"));
    assert!(session.is_active("ew"));
}

/// Exactly one of a compound region's children is active at a time.
fn assert_exclusive_within(session: &Session, region_children: &[&str]) {
    let active_count = region_children.iter().filter(|n| session.is_active(n)).count();
    assert_eq!(
        active_count, 1,
        "expected exactly one of {:?} active, got {} ({:?})",
        region_children,
        active_count,
        session.active()
    );
}

#[test]
fn root_and_parallel_ancestors_stay_active_no_matter_what_fires() {
    let mut session = Session::new(&intersection(), SessionOptions::default()).unwrap();
    let events = [
        "ns_stop", "ew_go", "ns_go", "ew_stop", "bogus", "ns_stop", "ns_stop", "ew_go", "ew_go",
    ];
    for event in events {
        let _ = session.trigger(event, None);
        assert_ancestor_closed(&session);
        assert_exclusive_within(&session, &["ns_go", "ns_stop"]);
        assert_exclusive_within(&session, &["ew_go", "ew_stop"]);
    }
}

#[test]
fn an_unmatched_or_guard_rejected_event_never_changes_the_active_set() {
    let mut session = Session::new(&intersection(), SessionOptions::default()).unwrap();
    let before = session.active();
    assert!(session.trigger("totally_unknown_event", None).is_err());
    assert_eq!(session.active(), before);
}

#[test]
fn repeated_toggling_always_returns_to_the_same_configuration() {
    let mut session = Session::new(&intersection(), SessionOptions::default()).unwrap();
    let mut initial = session.active();
    for _ in 0..3 {
        session.trigger("ns_stop", None).unwrap();
        session.trigger("ns_go", None).unwrap();
    }
    let mut after = session.active();
    after.sort();
    initial.sort();
    assert_eq!(after, initial);
}
