//! The state tree and transition table (spec layers L1/L2).
//!
//! States and transitions are created once while a configuration is
//! loaded (see [`crate::config`]) and stored in a flat arena
//! ([`StateGraph`]) addressed by index ([`StateId`]/[`TransitionId`])
//! rather than through parent-owning pointers. A session clones the
//! whole arena (a linear `Vec` copy) rather than walking a pointer
//! graph, which is what makes per-session isolation cheap.

use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use crate::datamodel::{Data, Datamodel};

/// Index of a [`State`] inside a [`StateGraph`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

/// Index of a [`Transition`] inside a [`StateGraph`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub usize);

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a state node (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History(HistoryKind),
    Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Shallow,
    Deep,
}

impl StateKind {
    pub fn is_composite(&self) -> bool {
        matches!(self, StateKind::Compound | StateKind::Parallel)
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self, StateKind::History(_) | StateKind::Condition)
    }
}

/// A state's default-child descriptor.
///
/// The callable form is accepted for configurations that compute their
/// initial child at runtime, but is deprecated in favor of a static
/// path (spec.md §9 Design Notes, SPEC_FULL.md §6 Open Question 4).
#[derive(Clone)]
pub enum Initial {
    Static(String),
    Dynamic(Rc<dyn Fn(&dyn Datamodel) -> String>),
}

impl Debug for Initial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Initial::Static(p) => write!(f, "Initial::Static({:?})", p),
            Initial::Dynamic(_) => write!(f, "Initial::Dynamic(<fn>)"),
        }
    }
}

/// A boolean guard expression (spec.md §3.2, §4.3).
#[derive(Clone)]
pub enum Guard {
    Literal(bool),
    Source(String),
    Callable(Rc<dyn Fn(&dyn Datamodel) -> bool>),
}

impl Debug for Guard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Guard::Literal(b) => write!(f, "Guard::Literal({})", b),
            Guard::Source(s) => write!(f, "Guard::Source({:?})", s),
            Guard::Callable(_) => write!(f, "Guard::Callable(<fn>)"),
        }
    }
}

/// A value-producing expression used by action content (spec.md §3.2,
/// §4.3). Unlike [`Guard`], evaluating one may mutate the data
/// environment (e.g. a `Script` body, the right-hand side of `Assign`).
#[derive(Clone)]
pub enum Expr {
    Literal(Data),
    Source(String),
    Callable(Rc<dyn Fn(&mut dyn Datamodel) -> Data>),
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(d) => write!(f, "Expr::Literal({:?})", d),
            Expr::Source(s) => write!(f, "Expr::Source({:?})", s),
            Expr::Callable(_) => write!(f, "Expr::Callable(<fn>)"),
        }
    }
}

/// Executable action content (spec.md §3.3).
///
/// `If`/`ElseIf`/`Else` as they appear in a configuration record are
/// folded by the loader ([`crate::config`]) into a single `If` node
/// with one branch per condition plus an optional `otherwise` body.
/// That grouping is what lets the interpreter guarantee "exactly the
/// first matching body runs" without re-deriving sibling grouping at
/// dispatch time.
#[derive(Debug, Clone)]
pub enum ActionContent {
    Assign {
        location: String,
        expr: Expr,
    },
    Log {
        expr: Expr,
        label: Option<String>,
        level: Option<String>,
    },
    Raise {
        event: String,
    },
    Script {
        src: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<ActionContent>)>,
        otherwise: Option<Vec<ActionContent>>,
    },
    ForEach {
        array_expr: Expr,
        item: String,
        index: Option<String>,
        body: Vec<ActionContent>,
    },
}

/// Whether a transition exits its source state when the target is one
/// of its own descendants (spec.md §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    Internal,
    External,
}

/// A single outgoing transition (spec.md §3.2).
#[derive(Debug, Clone)]
pub struct Transition {
    pub id: TransitionId,
    pub source: StateId,
    /// Empty string denotes an eventless (automatic) transition.
    pub event: String,
    /// The raw path as declared in the configuration, kept for
    /// diagnostics and `Display`.
    pub target_path: String,
    /// The path resolved against the graph at construction time
    /// (spec.md §3.1 invariant: transition target paths resolve at
    /// construction time to reachable states).
    pub target: StateId,
    pub cond: Option<Guard>,
    pub content: Vec<ActionContent>,
    pub transition_type: TransitionType,
}

impl Transition {
    pub fn is_eventless(&self) -> bool {
        self.event.is_empty()
    }

    /// Whether `name` matches this transition's event descriptor.
    /// spec.md §4.2 requires an exact name match; namespace wildcards
    /// are explicitly called out as a possible future extension, not
    /// part of this spec.
    pub fn matches_event(&self, name: &str) -> bool {
        !self.event.is_empty() && self.event == name
    }
}

impl Display for Transition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{event:{:?} target:{} type:{:?}}}",
            self.event, self.target_path, self.transition_type
        )
    }
}

/// When a state's declared `datamodel` items are resolved (spec.md
/// §4.3 "Data binding timing"): all at session construction, or lazily
/// the first time the owning state is entered. Either way a resolved
/// value is cached and never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    Early,
    Late,
}

/// A declared data item of a state's (or the root's) local `datamodel`
/// block (spec.md §6.1, §4.3 "Data binding timing").
#[derive(Debug, Clone)]
pub struct DataItem {
    pub id: String,
    pub source: DataSource,
}

#[derive(Debug, Clone)]
pub enum DataSource {
    /// Resolved through the host-registered resource resolver (see
    /// `crate::session::SessionOptions::resource_resolver`); the core
    /// itself performs no network I/O.
    Src(String),
    Expr(Expr),
    Literal(Data),
}

/// A node of the state tree (spec.md §3.1).
#[derive(Debug, Clone)]
pub struct State {
    pub id: StateId,
    pub name: String,
    pub kind: StateKind,
    pub parent: Option<StateId>,
    /// Ordered; insertion order is document order and is significant
    /// for deterministic iteration and tie-breaking.
    pub children: Vec<StateId>,
    pub initial: Option<Initial>,
    /// Document-order transitions sourced at this state.
    pub transitions: Vec<TransitionId>,
    pub on_entry: Vec<ActionContent>,
    pub on_exit: Vec<ActionContent>,
    pub data: Vec<DataItem>,
}

impl State {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, StateKind::Atomic | StateKind::Final)
    }

    pub fn is_compound(&self) -> bool {
        self.kind == StateKind::Compound
    }

    pub fn is_parallel(&self) -> bool {
        self.kind == StateKind::Parallel
    }

    pub fn is_final(&self) -> bool {
        self.kind == StateKind::Final
    }

    pub fn history_kind(&self) -> Option<HistoryKind> {
        match self.kind {
            StateKind::History(k) => Some(k),
            _ => None,
        }
    }
}

impl PartialEq for StateKind {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
impl Eq for StateKind {}

/// The state tree plus its transition table, addressed by
/// [`StateId`]/[`TransitionId`] index into flat arenas. Cloned
/// wholesale per session (spec.md §3.4 "Lifecycle") — a `Vec` copy,
/// not a pointer-graph walk.
#[derive(Debug, Clone)]
pub struct StateGraph {
    pub states: Vec<State>,
    pub transitions: Vec<Transition>,
    pub root: StateId,
}

impl StateGraph {
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    pub fn find_by_name(&self, name: &str) -> Option<StateId> {
        self.states.iter().find(|s| s.name == name).map(|s| s.id)
    }

    /// Returns `true` if `descendant` is strictly nested under `ancestor`.
    pub fn is_descendant(&self, descendant: StateId, ancestor: StateId) -> bool {
        let mut cur = self.state(descendant).parent;
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.state(p).parent;
        }
        false
    }

    pub fn is_descendant_or_self(&self, descendant: StateId, ancestor: StateId) -> bool {
        descendant == ancestor || self.is_descendant(descendant, ancestor)
    }

    /// Proper ancestors of `state`, innermost first, up to and
    /// including the root.
    pub fn ancestors(&self, state: StateId) -> Vec<StateId> {
        let mut out = Vec::new();
        let mut cur = self.state(state).parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.state(p).parent;
        }
        out
    }

    /// Least common compound ancestor of two states: the innermost
    /// state that is a proper ancestor of both (spec.md §4.4 "LCA").
    /// Falls back to the root, which is always a common ancestor.
    pub fn lca(&self, a: StateId, b: StateId) -> StateId {
        let a_ancestors = self.ancestors(a);
        for anc in self.ancestors(b) {
            if a_ancestors.contains(&anc) {
                return anc;
            }
        }
        self.root
    }

    pub fn depth(&self, state: StateId) -> usize {
        self.ancestors(state).len()
    }

    /// Document order over the whole tree: a pre-order walk from the
    /// root, children visited in declaration order. Used to break ties
    /// between transitions enabled at different scopes (spec.md §4.4
    /// "tie-break").
    pub fn document_order(&self) -> Vec<StateId> {
        fn walk(graph: &StateGraph, id: StateId, out: &mut Vec<StateId>) {
            out.push(id);
            for &c in &graph.state(id).children {
                walk(graph, c, out);
            }
        }
        let mut out = Vec::with_capacity(self.states.len());
        walk(self, self.root, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::NullDatamodel;

    fn tiny_graph() -> StateGraph {
        // root -> a -> (a1, a2), root -> b
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
    fn lca_of_siblings_is_parent() {
        let g = tiny_graph();
        assert_eq!(g.lca(StateId(2), StateId(3)), StateId(1));
    }

    #[test]
    fn lca_across_subtrees_is_root() {
        let g = tiny_graph();
        assert_eq!(g.lca(StateId(2), StateId(4)), StateId(0));
    }

    #[test]
    fn descendant_check() {
        let g = tiny_graph();
        assert!(g.is_descendant(StateId(2), StateId(1)));
        assert!(g.is_descendant(StateId(2), StateId(0)));
        assert!(!g.is_descendant(StateId(4), StateId(1)));
    }

    #[test]
    fn document_order_is_preorder() {
        let g = tiny_graph();
        assert_eq!(
            g.document_order(),
            vec![StateId(0), StateId(1), StateId(2), StateId(3), StateId(4)]
        );
    }

    #[test]
    fn event_matching_is_exact() {
        let t = Transition {
            id: TransitionId(0),
            source: StateId(0),
            event: "error.comms".into(),
            target_path: "b".into(),
            target: StateId(4),
            cond: None,
            content: vec![],
            transition_type: TransitionType::External,
        };
        assert!(t.matches_event("error.comms"));
        assert!(!t.matches_event("error"));
        assert!(!t.matches_event("error.comms.extra"));
    }

    #[test]
    fn eventless_transition_never_matches_a_named_event() {
        let t = Transition {
            id: TransitionId(0),
            source: StateId(0),
            event: String::new(),
            target_path: "b".into(),
            target: StateId(4),
            cond: None,
            content: vec![],
            transition_type: TransitionType::External,
        };
        assert!(!t.matches_event(""));
        assert!(!t.matches_event("anything"));
    }

    #[test]
    fn null_datamodel_is_a_datamodel() {
        let dm = NullDatamodel::new();
        assert_eq!(dm.name(), "null");
    }
}
