//! End-to-end: construction descends through every level of nested
//! compound defaults, not just the top one (spec.md §8 "nested default
//! descent").

use harel_fsm::config::StateConfig;
use harel_fsm::session::{Session, SessionOptions};

fn nested() -> StateConfig {
    serde_json::from_value(serde_json::json!({
        "name": "root",
        "kind": "compound",
        "initial": "outer",
        "states": [{
            "name": "outer",
            "kind": "compound",
            "initial": "middle",
            "states": [{
                "name": "middle",
                "kind": "compound",
                "initial": "inner",
                "states": [
                    {"name": "inner", "transitions": [{"event": "go", "target": "....done"}]}
                ]
            }]
        }, {
            "name": "done"
        }]
    }))
    .unwrap()
}

#[test]
fn construction_descends_all_the_way_to_the_innermost_leaf() {
    let session = Session::new(&nested(), SessionOptions::default()).unwrap();
    assert!(session.is_active("root"));
    assert!(session.is_active("outer"));
    assert!(session.is_active("middle"));
    assert!(session.is_active("inner"));
    assert!(!session.is_active("done"));
}

#[test]
fn a_relative_target_climbs_out_of_every_ancestor_named() {
    let mut session = Session::new(&nested(), SessionOptions::default()).unwrap();
    session.trigger("go", None).unwrap();
    assert!(session.is_active("done"));
    assert!(!session.is_active("inner"));
    assert!(!session.is_active("middle"));
    assert!(!session.is_active("outer"));
}
