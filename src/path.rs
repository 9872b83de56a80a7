//! State path resolution (spec.md §4.1).
//!
//! Three forms are accepted wherever a configuration or a transition
//! target names a state:
//!
//! - **absolute**: dot-separated child names starting at the root,
//!   e.g. `"a.a1"` (the root's own name is never part of the path).
//! - **bare**: a single segment with no dot, resolved by a
//!   breadth-first search of the whole tree. The first match in
//!   breadth-first (then document) order wins unless the session was
//!   constructed in `strict` mode, in which case an ambiguous bare
//!   name is rejected (SPEC_FULL.md §6 Open Question 3).
//! - **relative**: one or more leading dots, each ascending one level
//!   from an anchor state before the remaining dot-separated segments
//!   are resolved downward from there. Grounded on
//!   `original_source/machine.py`'s `get_state`, which special-cases a
//!   leading `.` to mean "resolve against the current state, not the
//!   root".

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::model::{StateGraph, StateId};

/// Resolve `path` against `graph`. `anchor` is the state a relative
/// path (one with leading dots) is resolved from; it is ignored for
/// absolute and bare paths. `strict` rejects an ambiguous bare name
/// instead of silently taking the first breadth-first match.
pub fn resolve(
    graph: &StateGraph,
    anchor: Option<StateId>,
    path: &str,
    strict: bool,
) -> Result<StateId> {
    if path.is_empty() {
        return Err(Error::invalid_state("empty state path"));
    }

    let leading_dots = path.chars().take_while(|&c| c == '.').count();
    if leading_dots > 0 {
        let anchor = anchor
            .ok_or_else(|| Error::invalid_state(format!("no anchor for relative path {:?}", path)))?;
        let rest = &path[leading_dots..];
        return resolve_relative(graph, anchor, leading_dots, rest);
    }

    if !path.contains('.') {
        return resolve_bare(graph, path, strict);
    }

    resolve_absolute(graph, path)
}

/// Absolute resolution: walk `path`'s dot-separated segments as child
/// names starting from the root.
pub fn resolve_absolute(graph: &StateGraph, path: &str) -> Result<StateId> {
    let mut current = graph.root;
    for segment in path.split('.') {
        current = descend(graph, current, segment)?;
    }
    Ok(current)
}

/// Relative resolution: ascend `levels` times from `anchor`, then
/// descend `rest`'s dot-separated segments (if any) from there.
fn resolve_relative(
    graph: &StateGraph,
    anchor: StateId,
    levels: usize,
    rest: &str,
) -> Result<StateId> {
    let mut current = anchor;
    // One leading dot means "anchor itself"; each additional dot
    // ascends one more level, mirroring the original's single-dot
    // "current state" convention extended to multiple ascents.
    for _ in 1..levels {
        current = graph
            .state(current)
            .parent
            .ok_or_else(|| Error::invalid_state(format!("cannot ascend past root from {:?}", anchor)))?;
    }
    if rest.is_empty() {
        return Ok(current);
    }
    for segment in rest.split('.') {
        current = descend(graph, current, segment)?;
    }
    Ok(current)
}

fn descend(graph: &StateGraph, parent: StateId, name: &str) -> Result<StateId> {
    graph
        .state(parent)
        .children
        .iter()
        .copied()
        .find(|&c| graph.state(c).name == name)
        .ok_or_else(|| {
            Error::invalid_state(format!(
                "{:?} has no child named {:?}",
                graph.state(parent).name,
                name
            ))
        })
}

/// Bare-name resolution: breadth-first search from the root, first
/// match wins. In `strict` mode a name matching more than one state is
/// rejected rather than silently resolved to the first hit.
fn resolve_bare(graph: &StateGraph, name: &str, strict: bool) -> Result<StateId> {
    let mut queue: VecDeque<StateId> = VecDeque::new();
    queue.push_back(graph.root);
    let mut found: Option<StateId> = None;
    while let Some(id) = queue.pop_front() {
        if graph.state(id).name == name {
            if let Some(first) = found {
                if strict {
                    return Err(Error::invalid_state(format!(
                        "ambiguous bare state name {:?} (matches at least {:?} and {:?})",
                        name, first, id
                    )));
                }
                continue;
            }
            found = Some(id);
            if !strict {
                break;
            }
        }
        queue.extend(graph.state(id).children.iter().copied());
    }
    found.ok_or_else(|| Error::invalid_state(format!("no state named {:?}", name)))
}

/// Render the dot-separated path from the root down to `state`,
/// excluding the root's own name — the inverse of
/// [`resolve_absolute`].
pub fn absolute_path_of(graph: &StateGraph, state: StateId) -> String {
    let mut segments: Vec<&str> = graph
        .ancestors(state)
        .iter()
        .rev()
        .skip(1) // drop the root itself
        .map(|&id| graph.state(id).name.as_str())
        .collect();
    segments.push(graph.state(state).name.as_str());
    segments.join(".")
}

/// The relative path from `from` to `to`: the number of leading dots
/// needed to ascend to their least common ancestor, followed by the
/// descending segments from there to `to`.
pub fn relative_path(graph: &StateGraph, from: StateId, to: StateId) -> String {
    let lca = graph.lca(from, to);
    let ascend = if from == lca {
        1
    } else {
        graph.depth(from) - graph.depth(lca) + 1
    };
    let dots = ".".repeat(ascend);
    if to == lca {
        return dots;
    }
    let mut segments: Vec<&str> = graph
        .ancestors(to)
        .iter()
        .take_while(|&&id| id != lca)
        .map(|&id| graph.state(id).name.as_str())
        .collect();
    segments.reverse();
    segments.push(graph.state(to).name.as_str());
    format!("{}{}", dots, segments.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Initial, State, StateKind};

    fn graph() -> StateGraph {
        let root = State {
            id: StateId(0),
            name: "root".into(),
            kind: StateKind::Compound,
            parent: None,
            children: vec![StateId(1), StateId(4)],
            initial: Some(Initial::Static("a".into())),
            transitions: vec![],
            on_entry: vec![],
            on_exit: vec![],
            data: vec![],
        };
        let a = State {
            id: StateId(1),
            name: "a".into(),
            kind: StateKind::Compound,
            parent: Some(StateId(0)),
            children: vec![StateId(2), StateId(3)],
            initial: Some(Initial::Static("a1".into())),
            transitions: vec![],
            on_entry: vec![],
            on_exit: vec![],
            data: vec![],
        };
        let a1 = State {
            id: StateId(2),
            name: "a1".into(),
            kind: StateKind::Atomic,
            parent: Some(StateId(1)),
            children: vec![],
            initial: None,
            transitions: vec![],
            on_entry: vec![],
            on_exit: vec![],
            data: vec![],
        };
        let a2 = State {
            id: StateId(3),
            name: "a2".into(),
            kind: StateKind::Atomic,
            parent: Some(StateId(1)),
            children: vec![],
            initial: None,
            transitions: vec![],
            on_entry: vec![],
            on_exit: vec![],
            data: vec![],
        };
        let b = State {
            id: StateId(4),
            name: "b".into(),
            kind: StateKind::Atomic,
            parent: Some(StateId(0)),
            children: vec![],
            initial: None,
            transitions: vec![],
            on_entry: vec![],
            on_exit: vec![],
            data: vec![],
        };
        StateGraph {
            states: vec![root, a, a1, a2, b],
            transitions: vec![],
            root: StateId(0),
        }
    }

    #[test]
    fn resolves_absolute_path() {
        let g = graph();
        assert_eq!(resolve_absolute(&g, "a.a1").unwrap(), StateId(2));
    }

    #[test]
    fn resolves_bare_name() {
        let g = graph();
        assert_eq!(resolve(&g, None, "b", false).unwrap(), StateId(4));
    }

    #[test]
    fn rejects_unknown_bare_name() {
        let g = graph();
        assert!(resolve(&g, None, "nope", false).is_err());
    }

    #[test]
    fn resolves_relative_sibling() {
        let g = graph();
        // from a1, ".." style: one dot means "from a1's parent", then descend "a2"
        assert_eq!(resolve(&g, Some(StateId(2)), "..a2", false).unwrap(), StateId(3));
    }

    #[test]
    fn relative_path_round_trips() {
        let g = graph();
        let rel = relative_path(&g, StateId(2), StateId(3));
        assert_eq!(resolve(&g, Some(StateId(2)), &rel, false).unwrap(), StateId(3));
    }

    #[test]
    fn strict_rejects_ambiguous_bare_name() {
        let mut g = graph();
        // duplicate the name "a2" onto state b to create an ambiguity
        g.states[4].name = "a2".into();
        assert!(resolve(&g, None, "a2", true).is_err());
        assert!(resolve(&g, None, "a2", false).is_ok());
    }
}
