//! The interpreter (spec layer L4): active configuration, transition
//! selection and conflict resolution, exit/entry set computation,
//! eventless closure, history recording (spec.md §4.2, §4.4–§4.6).
//!
//! Grounded on the W3C SCXML processing model the teacher's `fsm.rs`
//! documents step by step (`selectTransitions`, `removeConflictingTransitions`,
//! `microstep`, `enterStates`/`exitStates`, `computeEntrySet`/`computeExitSet`)
//! but rebuilt from scratch: the teacher's own implementation of that
//! algorithm was almost entirely `todo!()`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::datamodel::{Data, Datamodel};
use crate::error::{Error, Result};
use crate::model::{
    ActionContent, BindingType, HistoryKind, Initial, StateGraph, StateId, StateKind,
    Transition, TransitionId, TransitionType,
};
use crate::path;
use crate::tracer::Tracer;

/// Default bound on the eventless-closure fixpoint loop (spec.md §4.4,
/// §9 Design Notes): guards against an unbounded chain of transient
/// transitions.
pub const DEFAULT_MAX_EVENTLESS_ITERATIONS: usize = 1000;

/// A closure resolving a `datamodel` item's `src` attribute to a
/// value. The core performs no network or filesystem I/O itself
/// (spec.md §3.2 Non-goals); a host that declares `src` items must
/// supply one via `crate::session::SessionOptions::resource_resolver`.
pub type ResourceResolver = std::rc::Rc<dyn Fn(&str) -> Result<Data>>;

/// The running interpreter: a state graph plus the session-local
/// runtime state layered on top of it (active leaves, history,
/// pending internal events). Does not own the datamodel or tracer —
/// both are borrowed for the duration of each call, matching the
/// teacher's separation of the FSM from its `Tracer`/`Datamodel`
/// collaborators.
#[derive(Debug, Clone)]
pub struct Interpreter {
    pub graph: StateGraph,
    /// One atomic/final state per active orthogonal branch.
    leaves: Vec<StateId>,
    history: HashMap<StateId, Vec<StateId>>,
    first_entered: HashSet<StateId>,
    internal_queue: VecDeque<(String, Option<Data>)>,
    pub strict: bool,
    pub max_eventless_iterations: usize,
    pub binding: BindingType,
    resource_resolver: Option<ResourceResolver>,
}

enum SelectOutcome {
    Transitions(Vec<TransitionId>),
    NoMatch,
    AllGuardsRejected,
}

impl Interpreter {
    pub fn new(
        graph: StateGraph,
        strict: bool,
        max_eventless_iterations: usize,
        binding: BindingType,
    ) -> Interpreter {
        Interpreter::with_resource_resolver(graph, strict, max_eventless_iterations, binding, None)
    }

    pub fn with_resource_resolver(
        graph: StateGraph,
        strict: bool,
        max_eventless_iterations: usize,
        binding: BindingType,
        resource_resolver: Option<ResourceResolver>,
    ) -> Interpreter {
        Interpreter {
            graph,
            leaves: Vec::new(),
            history: HashMap::new(),
            first_entered: HashSet::new(),
            internal_queue: VecDeque::new(),
            strict,
            max_eventless_iterations,
            binding,
            resource_resolver,
        }
    }

    /// Names of every active state, leaves first, each leaf's ancestors
    /// following innermost-to-outermost (spec.md §6.2 `active()`).
    pub fn active_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for &leaf in &self.leaves {
            let mut cur = Some(leaf);
            while let Some(s) = cur {
                let name = self.graph.state(s).name.clone();
                if !out.contains(&name) {
                    out.push(name);
                }
                cur = self.graph.state(s).parent;
            }
        }
        out
    }

    /// The full active configuration as state ids (leaves plus every
    /// ancestor), deduplicated, in no particular order.
    pub fn active_states(&self) -> Vec<StateId> {
        let mut set = Vec::new();
        for &leaf in &self.leaves {
            let mut cur = Some(leaf);
            while let Some(s) = cur {
                if !set.contains(&s) {
                    set.push(s);
                }
                cur = self.graph.state(s).parent;
            }
        }
        set
    }

    pub fn leaves(&self) -> &[StateId] {
        &self.leaves
    }

    fn doc_index(&self) -> HashMap<StateId, usize> {
        self.graph
            .document_order()
            .into_iter()
            .enumerate()
            .map(|(i, s)| (s, i))
            .collect()
    }

    /// Builds the initial active configuration by descending from the
    /// root (or `initial_override`, for `SessionOptions::initial`) and
    /// runs the resulting eventless closure and raised-event drain
    /// (spec.md §4.4 "Constructing").
    pub fn construct(
        &mut self,
        dm: &mut dyn Datamodel,
        tracer: &mut dyn Tracer,
        initial_override: Option<StateId>,
    ) -> Result<()> {
        tracer.enter_method("construct");
        if self.binding == BindingType::Early {
            for s in self.graph.document_order() {
                self.bind_data_items(s, dm)?;
            }
        }
        let target = initial_override.unwrap_or(self.graph.root);
        let mut entered = Vec::new();
        let mut leaves = Vec::new();
        self.descendant_states_to_enter(target, dm, &mut entered, &mut leaves)?;
        let idx = self.doc_index();
        entered.sort_by_key(|s| idx[s]);
        for &s in &entered {
            if self.binding == BindingType::Late {
                self.bind_data_items(s, dm)?;
            }
            self.first_entered.insert(s);
            tracer.trace_enter_state(&path::absolute_path_of(&self.graph, s));
            let actions = self.graph.state(s).on_entry.clone();
            self.run_actions(&actions, dm, tracer)?;
        }
        self.leaves = leaves;
        self.settle_eventless(dm, tracer)?;
        self.drain_internal_queue(dm, tracer)?;
        tracer.exit_method("construct");
        Ok(())
    }

    /// Dispatches one external event: selects and executes a microstep,
    /// then runs the eventless closure and drains any events raised
    /// along the way (spec.md §4.2, §4.4 "Processing").
    pub fn trigger(
        &mut self,
        event: &str,
        payload: Option<Data>,
        dm: &mut dyn Datamodel,
        tracer: &mut dyn Tracer,
    ) -> Result<Data> {
        tracer.enter_method("trigger");
        tracer.event_received(event);
        dm.bind("_event", event_data(event, &payload));
        let value = match self.select(Some(event), dm, tracer)? {
            SelectOutcome::Transitions(transitions) => self.execute(&transitions, dm, tracer)?,
            SelectOutcome::AllGuardsRejected => {
                tracer.exit_method("trigger");
                return Err(Error::guard_not_satisfied(format!(
                    "every transition matching event {:?} had its guard rejected",
                    event
                )));
            }
            SelectOutcome::NoMatch => {
                tracer.exit_method("trigger");
                return Err(Error::invalid_transition(format!(
                    "no transition matches event {:?} from any active scope",
                    event
                )));
            }
        };
        self.settle_eventless(dm, tracer)?;
        self.drain_internal_queue(dm, tracer)?;
        tracer.exit_method("trigger");
        Ok(value)
    }

    /// Runs eventless transitions to a fixpoint, bounded by
    /// `max_eventless_iterations` (spec.md §4.4, §9 Design Notes).
    pub fn settle_eventless(&mut self, dm: &mut dyn Datamodel, tracer: &mut dyn Tracer) -> Result<()> {
        let mut iterations = 0usize;
        loop {
            let transitions = match self.select(None, dm, tracer)? {
                SelectOutcome::Transitions(t) => t,
                _ => break,
            };
            if transitions.is_empty() {
                break;
            }
            self.execute(&transitions, dm, tracer)?;
            iterations += 1;
            if iterations > self.max_eventless_iterations {
                return Err(Error::session_fault(format!(
                    "eventless closure did not reach a fixpoint within {} iterations",
                    self.max_eventless_iterations
                )));
            }
        }
        Ok(())
    }

    /// Processes internally raised events in FIFO order, each as its
    /// own microstep plus eventless closure, before returning to Idle
    /// (spec.md §5 "Ordering"). Unmatched internal events are silently
    /// dropped — only the caller's own triggered event is a hard error
    /// when nothing matches.
    fn drain_internal_queue(&mut self, dm: &mut dyn Datamodel, tracer: &mut dyn Tracer) -> Result<()> {
        while let Some((event, payload)) = self.internal_queue.pop_front() {
            dm.bind("_event", event_data(&event, &payload));
            if let SelectOutcome::Transitions(transitions) = self.select(Some(&event), dm, tracer)? {
                if !transitions.is_empty() {
                    self.execute(&transitions, dm, tracer)?;
                }
            }
            self.settle_eventless(dm, tracer)?;
        }
        Ok(())
    }

    fn bind_data_items(&self, state: StateId, dm: &mut dyn Datamodel) -> Result<()> {
        let items = self.graph.state(state).data.clone();
        for item in items {
            if dm.data().get(&item.id).is_some() {
                continue;
            }
            let value = match &item.source {
                crate::model::DataSource::Literal(d) => d.clone(),
                crate::model::DataSource::Expr(e) => dm.exec(e)?,
                crate::model::DataSource::Src(url) => match &self.resource_resolver {
                    Some(resolver) => resolver(url)?,
                    None => {
                        return Err(Error::invalid_config(format!(
                            "data item {:?} declares src {:?} but no resource resolver was \
                             configured (see crate::session::SessionOptions::resource_resolver)",
                            item.id, url
                        )))
                    }
                },
            };
            dm.bind(&item.id, value);
        }
        Ok(())
    }

    fn resolve_initial(&self, state: StateId, dm: &mut dyn Datamodel) -> Result<StateId> {
        let path_str = match self.graph.state(state).initial.as_ref() {
            Some(Initial::Static(p)) => p.clone(),
            Some(Initial::Dynamic(f)) => f(dm),
            None => {
                return Err(Error::invalid_config(format!(
                    "compound state {:?} has no initial child",
                    self.graph.state(state).name
                )))
            }
        };
        path::resolve(&self.graph, Some(state), &path_str, self.strict)
    }

    fn first_satisfied_transition(
        &self,
        state: StateId,
        dm: &mut dyn Datamodel,
    ) -> Result<Option<TransitionId>> {
        for &tid in &self.graph.state(state).transitions.clone() {
            let t = self.graph.transition(tid);
            let ok = match &t.cond {
                None => true,
                Some(g) => dm.eval(g)?,
            };
            if ok {
                return Ok(Some(tid));
            }
        }
        Ok(None)
    }

    /// Dereferences a history pseudostate target to the state its
    /// recorded (or default) value actually leads to, for domain
    /// computation purposes (spec.md §4.6).
    fn effective_target(&self, target: StateId) -> StateId {
        if let StateKind::History(_) = self.graph.state(target).kind {
            if let Some(rec) = self.history.get(&target) {
                if let Some(&first) = rec.first() {
                    return self.effective_target(first);
                }
            }
            if let Some(&default_t) = self.graph.state(target).transitions.first() {
                return self.effective_target(self.graph.transition(default_t).target);
            }
        }
        target
    }

    fn domain(&self, t: &Transition) -> StateId {
        let effective_target = self.effective_target(t.target);
        if t.transition_type == TransitionType::Internal
            && self.graph.state(t.source).is_compound()
            && self.graph.is_descendant_or_self(effective_target, t.source)
        {
            t.source
        } else {
            self.graph.lca(t.source, effective_target)
        }
    }

    fn exit_set_for(&self, t: &Transition) -> Vec<StateId> {
        let dom = self.domain(t);
        self.active_states()
            .into_iter()
            .filter(|&s| self.graph.is_descendant(s, dom))
            .collect()
    }

    /// Selects the transitions enabled for `event` (or, when `None`,
    /// the eventless ones), one per active leaf's branch, resolving
    /// conflicts between overlapping domains in favor of the
    /// outer-scope (or, in `strict` mode, raising `ForkedTransition`)
    /// (spec.md §4.2, §4.5).
    fn select(
        &self,
        event: Option<&str>,
        dm: &mut dyn Datamodel,
        tracer: &mut dyn Tracer,
    ) -> Result<SelectOutcome> {
        let idx = self.doc_index();
        let mut ordered_leaves = self.leaves.clone();
        ordered_leaves.sort_by_key(|s| idx[s]);

        let mut candidates: Vec<TransitionId> = Vec::new();
        let mut any_event_match = false;

        'leaf: for leaf in ordered_leaves {
            let mut scope = Some(leaf);
            while let Some(s) = scope {
                for &tid in &self.graph.state(s).transitions.clone() {
                    let t = self.graph.transition(tid);
                    let is_match = match event {
                        Some(e) => t.matches_event(e),
                        None => t.is_eventless(),
                    };
                    if !is_match {
                        continue;
                    }
                    any_event_match = true;
                    let ok = match &t.cond {
                        None => true,
                        Some(g) => dm.eval(g)?,
                    };
                    if ok {
                        candidates.push(tid);
                        continue 'leaf;
                    }
                }
                scope = self.graph.state(s).parent;
            }
        }

        if candidates.is_empty() {
            return Ok(if any_event_match {
                SelectOutcome::AllGuardsRejected
            } else {
                SelectOutcome::NoMatch
            });
        }

        Ok(SelectOutcome::Transitions(self.remove_conflicting(candidates, tracer)?))
    }

    /// Ports the W3C `removeConflictingTransitions` algorithm, with the
    /// tie-break spec.md §4.5 requires: two candidates whose exit sets
    /// overlap conflict, and the one sourced shallower (the outer-scope
    /// transition) wins over the one sourced deeper (nested inside a
    /// parallel region).
    fn remove_conflicting(
        &self,
        candidates: Vec<TransitionId>,
        tracer: &mut dyn Tracer,
    ) -> Result<Vec<TransitionId>> {
        if self.strict && candidates.len() > 1 {
            // In strict mode any two candidates at all is a fork unless
            // their domains are fully disjoint (different orthogonal
            // regions) — mirrors original_source/machine.py's
            // ForkedTransition, scoped to genuine overlap only.
            for i in 0..candidates.len() {
                for j in (i + 1)..candidates.len() {
                    let ti = self.graph.transition(candidates[i]);
                    let tj = self.graph.transition(candidates[j]);
                    let exit_i = self.exit_set_for(ti);
                    let exit_j = self.exit_set_for(tj);
                    if exit_i.iter().any(|s| exit_j.contains(s)) {
                        return Err(Error::forked_transition(format!(
                            "transitions from {:?} and {:?} are both enabled and conflict",
                            self.graph.state(ti.source).name,
                            self.graph.state(tj.source).name
                        )));
                    }
                }
            }
            return Ok(candidates);
        }

        let mut filtered: Vec<TransitionId> = Vec::new();
        'outer: for t1 in candidates {
            let exit1 = self.exit_set_for(self.graph.transition(t1));
            let mut to_remove = Vec::new();
            for &t2 in &filtered {
                let exit2 = self.exit_set_for(self.graph.transition(t2));
                if exit1.iter().any(|s| exit2.contains(s)) {
                    let source1 = self.graph.transition(t1).source;
                    let source2 = self.graph.transition(t2).source;
                    if self.graph.is_descendant(source2, source1) {
                        // t2 is nested inside t1's source: t1 is the
                        // outer-scope transition and wins.
                        to_remove.push(t2);
                    } else {
                        // t1 is nested inside (or no more specific than)
                        // t2's source: t2 is outer and wins.
                        tracer.transition_suppressed(
                            &path::absolute_path_of(&self.graph, source1),
                            &path::absolute_path_of(&self.graph, source2),
                        );
                        continue 'outer;
                    }
                }
            }
            for removed in &to_remove {
                tracer.transition_suppressed(
                    &path::absolute_path_of(&self.graph, self.graph.transition(*removed).source),
                    &path::absolute_path_of(&self.graph, self.graph.transition(t1).source),
                );
            }
            filtered.retain(|t| !to_remove.contains(t));
            filtered.push(t1);
        }
        Ok(filtered)
    }

    /// Runs one microstep for `transitions`: exit, transition content,
    /// entry, in that order, recording history and raising `done.state.*`
    /// events as states finalize (spec.md §4.4–§4.6).
    fn execute(
        &mut self,
        transitions: &[TransitionId],
        dm: &mut dyn Datamodel,
        tracer: &mut dyn Tracer,
    ) -> Result<Data> {
        let idx = self.doc_index();

        let mut exit: Vec<StateId> = Vec::new();
        for &tid in transitions {
            for s in self.exit_set_for(self.graph.transition(tid)) {
                if !exit.contains(&s) {
                    exit.push(s);
                }
            }
        }
        exit.sort_by_key(|s| std::cmp::Reverse(idx[s]));

        self.record_history(&exit);

        for &s in &exit {
            tracer.trace_exit_state(&path::absolute_path_of(&self.graph, s));
            let actions = self.graph.state(s).on_exit.clone();
            self.run_actions(&actions, dm, tracer)?;
        }
        self.leaves.retain(|l| !exit.contains(l));

        let mut last_value = Data::Null;
        for &tid in transitions {
            let content = self.graph.transition(tid).content.clone();
            last_value = self.run_actions(&content, dm, tracer)?;
        }

        let mut entered = Vec::new();
        let mut new_leaves = Vec::new();
        for &tid in transitions {
            let (target, dom) = {
                let t = self.graph.transition(tid);
                (self.effective_target(t.target), self.domain(t))
            };
            self.descendant_states_to_enter(target, dm, &mut entered, &mut new_leaves)?;
            self.ancestor_states_to_enter(target, dom, dm, &mut entered, &mut new_leaves)?;
        }
        entered.sort_by_key(|s| idx[s]);
        for &s in &entered {
            if self.binding == BindingType::Late && !self.first_entered.contains(&s) {
                self.bind_data_items(s, dm)?;
            }
            self.first_entered.insert(s);
            tracer.trace_enter_state(&path::absolute_path_of(&self.graph, s));
            let actions = self.graph.state(s).on_entry.clone();
            self.run_actions(&actions, dm, tracer)?;
        }
        for l in new_leaves {
            if !self.leaves.contains(&l) {
                self.leaves.push(l);
            }
        }
        self.leaves.sort_by_key(|s| idx[s]);

        self.raise_done_events(&entered);

        Ok(last_value)
    }

    fn record_history(&mut self, exit: &[StateId]) {
        for &s in exit {
            for &child in &self.graph.state(s).children.clone() {
                let Some(hk) = self.graph.state(child).history_kind() else {
                    continue;
                };
                let recorded = match hk {
                    HistoryKind::Shallow => self
                        .active_states()
                        .into_iter()
                        .filter(|&a| self.graph.state(a).parent == Some(s))
                        .collect(),
                    HistoryKind::Deep => self
                        .leaves
                        .iter()
                        .copied()
                        .filter(|&l| self.graph.is_descendant(l, s))
                        .collect(),
                };
                self.history.insert(child, recorded);
            }
        }
    }

    fn raise_done_events(&mut self, entered: &[StateId]) {
        for &s in entered {
            if !self.graph.state(s).is_final() {
                continue;
            }
            let Some(parent) = self.graph.state(s).parent else {
                continue;
            };
            self.internal_queue
                .push_back((format!("done.state.{}", self.graph.state(parent).name), None));
            if let Some(grandparent) = self.graph.state(parent).parent {
                if self.graph.state(grandparent).is_parallel() && self.in_final_state(grandparent) {
                    self.internal_queue.push_back((
                        format!("done.state.{}", self.graph.state(grandparent).name),
                        None,
                    ));
                }
            }
        }
    }

    fn in_final_state(&self, s: StateId) -> bool {
        match self.graph.state(s).kind {
            StateKind::Compound => self.graph.state(s).children.iter().any(|&c| {
                self.graph.state(c).is_final() && self.active_states().contains(&c)
            }),
            StateKind::Parallel => self
                .graph
                .state(s)
                .children
                .iter()
                .all(|&c| self.in_final_state(c)),
            _ => false,
        }
    }

    /// Recursively computes the set of states to enter descending from
    /// `state`, following compound `initial` targets, fully entering
    /// parallel regions, and dereferencing history pseudostates
    /// (spec.md §4.4–§4.6). `Condition` pseudostates are resolved
    /// immediately to their first satisfied outgoing transition.
    fn descendant_states_to_enter(
        &self,
        state: StateId,
        dm: &mut dyn Datamodel,
        entered: &mut Vec<StateId>,
        leaves: &mut Vec<StateId>,
    ) -> Result<()> {
        if entered.contains(&state) {
            return Ok(());
        }
        match self.graph.state(state).kind {
            StateKind::History(_) => {
                if let Some(recorded) = self.history.get(&state).cloned() {
                    for &s in &recorded {
                        self.descendant_states_to_enter(s, dm, entered, leaves)?;
                    }
                    let parent = self.graph.state(state).parent.unwrap_or(self.graph.root);
                    for &s in &recorded {
                        self.ancestor_states_to_enter(s, parent, dm, entered, leaves)?;
                    }
                } else {
                    let default_t = self
                        .graph
                        .state(state)
                        .transitions
                        .first()
                        .copied()
                        .ok_or_else(|| {
                            Error::invalid_config(format!(
                                "history state {:?} has no default transition and no recorded value",
                                self.graph.state(state).name
                            ))
                        })?;
                    let target = self.graph.transition(default_t).target;
                    self.descendant_states_to_enter(target, dm, entered, leaves)?;
                    let parent = self.graph.state(state).parent.unwrap_or(self.graph.root);
                    self.ancestor_states_to_enter(target, parent, dm, entered, leaves)?;
                }
            }
            StateKind::Compound => {
                entered.push(state);
                let initial_target = self.resolve_initial(state, dm)?;
                self.descendant_states_to_enter(initial_target, dm, entered, leaves)?;
                self.ancestor_states_to_enter(initial_target, state, dm, entered, leaves)?;
            }
            StateKind::Parallel => {
                entered.push(state);
                for &child in &self.graph.state(state).children.clone() {
                    if !entered.iter().any(|&e| self.graph.is_descendant_or_self(e, child)) {
                        self.descendant_states_to_enter(child, dm, entered, leaves)?;
                    }
                }
            }
            StateKind::Atomic | StateKind::Final => {
                entered.push(state);
                leaves.push(state);
            }
            StateKind::Condition => {
                let tid = self.first_satisfied_transition(state, dm)?.ok_or_else(|| {
                    Error::invalid_config(format!(
                        "condition state {:?} has no satisfied outgoing transition",
                        self.graph.state(state).name
                    ))
                })?;
                let target = self.graph.transition(tid).target;
                let parent = self.graph.state(state).parent.unwrap_or(self.graph.root);
                self.descendant_states_to_enter(target, dm, entered, leaves)?;
                self.ancestor_states_to_enter(target, parent, dm, entered, leaves)?;
            }
        }
        Ok(())
    }

    /// Fills in the ancestors between `state` and `stop` (exclusive),
    /// entering default descendants of any parallel sibling regions
    /// along the way (spec.md §4.5).
    fn ancestor_states_to_enter(
        &self,
        state: StateId,
        stop: StateId,
        dm: &mut dyn Datamodel,
        entered: &mut Vec<StateId>,
        leaves: &mut Vec<StateId>,
    ) -> Result<()> {
        let mut cur = self.graph.state(state).parent;
        while let Some(anc) = cur {
            if anc == stop {
                break;
            }
            if !entered.contains(&anc) {
                entered.push(anc);
                if self.graph.state(anc).is_parallel() {
                    for &child in &self.graph.state(anc).children.clone() {
                        if !entered.iter().any(|&e| self.graph.is_descendant_or_self(e, child)) {
                            self.descendant_states_to_enter(child, dm, entered, leaves)?;
                        }
                    }
                }
            }
            cur = self.graph.state(anc).parent;
        }
        Ok(())
    }

    fn run_actions(
        &mut self,
        actions: &[ActionContent],
        dm: &mut dyn Datamodel,
        tracer: &mut dyn Tracer,
    ) -> Result<Data> {
        let mut last = Data::Null;
        for action in actions {
            last = self.run_action(action, dm, tracer)?;
        }
        Ok(last)
    }

    fn run_action(
        &mut self,
        action: &ActionContent,
        dm: &mut dyn Datamodel,
        tracer: &mut dyn Tracer,
    ) -> Result<Data> {
        match action {
            ActionContent::Assign { location, expr } => {
                let v = dm.exec(expr)?;
                dm.bind(location, v.clone());
                Ok(v)
            }
            ActionContent::Log { expr, label, level } => {
                let v = dm.exec(expr)?;
                dm.log(&v.to_string(), label.as_deref(), level.as_deref());
                Ok(v)
            }
            ActionContent::Raise { event } => {
                tracer.event_raised(event);
                self.internal_queue.push_back((event.clone(), None));
                Ok(Data::Null)
            }
            ActionContent::Script { src } => dm.exec(src),
            ActionContent::If { branches, otherwise } => {
                for (cond, body) in branches {
                    if dm.exec(cond)?.as_bool() {
                        return self.run_actions(body, dm, tracer);
                    }
                }
                match otherwise {
                    Some(body) => self.run_actions(body, dm, tracer),
                    None => Ok(Data::Null),
                }
            }
            ActionContent::ForEach {
                array_expr,
                item,
                index,
                body,
            } => {
                let arr = dm.exec(array_expr)?;
                let items = arr
                    .as_array()
                    .map(|s| s.to_vec())
                    .ok_or_else(|| Error::invalid_action("foreach expression did not evaluate to an array"))?;
                let mut last = Data::Null;
                for (i, v) in items.into_iter().enumerate() {
                    dm.bind(item, v);
                    if let Some(idx_name) = index {
                        dm.bind(idx_name, Data::Number(i as f64));
                    }
                    last = self.run_actions(body, dm, tracer)?;
                }
                dm.unbind(item);
                if let Some(idx_name) = index {
                    dm.unbind(idx_name);
                }
                Ok(last)
            }
        }
    }
}

fn event_data(name: &str, payload: &Option<Data>) -> Data {
    let mut map = HashMap::new();
    map.insert("name".to_string(), Data::String(name.to_string()));
    map.insert("data".to_string(), payload.clone().unwrap_or(Data::Null));
    Data::Map(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::NullDatamodel;
    use crate::model::{DataItem, State, StateGraph};
    use crate::tracer::DefaultTracer;

    fn leaf(id: usize, name: &str, parent: StateId) -> State {
        State {
            id: StateId(id),
            name: name.into(),
            kind: StateKind::Atomic,
            parent: Some(parent),
            children: vec![],
            initial: None,
            transitions: vec![],
            on_entry: vec![],
            on_exit: vec![],
            data: vec![],
        }
    }

    /// root (compound, initial "a") -> a, b, both atomic. a --"go"--> b.
    fn stoplight_graph() -> StateGraph {
        let root = State {
            id: StateId(0),
            name: "root".into(),
            kind: StateKind::Compound,
            parent: None,
            children: vec![StateId(1), StateId(2)],
            initial: Some(Initial::Static("a".into())),
            transitions: vec![],
            on_entry: vec![],
            on_exit: vec![],
            data: vec![],
        };
        let mut a = leaf(1, "a", StateId(0));
        a.transitions.push(TransitionId(0));
        let b = leaf(2, "b", StateId(0));
        let t = Transition {
            id: TransitionId(0),
            source: StateId(1),
            event: "go".into(),
            target_path: "b".into(),
            target: StateId(2),
            cond: None,
            content: vec![],
            transition_type: TransitionType::External,
        };
        StateGraph {
            states: vec![root, a, b],
            transitions: vec![t],
            root: StateId(0),
        }
    }

    #[test]
    fn construct_descends_into_default_initial() {
        let graph = stoplight_graph();
        let mut it = Interpreter::new(graph, false, DEFAULT_MAX_EVENTLESS_ITERATIONS, BindingType::Early);
        let mut dm = NullDatamodel::new();
        let mut tracer = DefaultTracer::new();
        it.construct(&mut dm, &mut tracer, None).unwrap();
        assert_eq!(it.active_names(), vec!["a".to_string(), "root".to_string()]);
    }

    #[test]
    fn trigger_moves_to_target_and_back() {
        let graph = stoplight_graph();
        let mut it = Interpreter::new(graph, false, DEFAULT_MAX_EVENTLESS_ITERATIONS, BindingType::Early);
        let mut dm = NullDatamodel::new();
        let mut tracer = DefaultTracer::new();
        it.construct(&mut dm, &mut tracer, None).unwrap();
        it.trigger("go", None, &mut dm, &mut tracer).unwrap();
        assert!(it.active_names().contains(&"b".to_string()));
    }

    #[test]
    fn unmatched_event_is_invalid_transition() {
        let graph = stoplight_graph();
        let mut it = Interpreter::new(graph, false, DEFAULT_MAX_EVENTLESS_ITERATIONS, BindingType::Early);
        let mut dm = NullDatamodel::new();
        let mut tracer = DefaultTracer::new();
        it.construct(&mut dm, &mut tracer, None).unwrap();
        let err = it.trigger("nope", None, &mut dm, &mut tracer).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[test]
    fn guard_rejected_transition_reports_guard_not_satisfied() {
        let mut graph = stoplight_graph();
        graph.transitions[0].cond = Some(crate::model::Guard::Literal(false));
        let mut it = Interpreter::new(graph, false, DEFAULT_MAX_EVENTLESS_ITERATIONS, BindingType::Early);
        let mut dm = NullDatamodel::new();
        let mut tracer = DefaultTracer::new();
        it.construct(&mut dm, &mut tracer, None).unwrap();
        let err = it.trigger("go", None, &mut dm, &mut tracer).unwrap_err();
        assert!(matches!(err, Error::GuardNotSatisfied(_)));
    }

    #[test]
    fn early_binding_resolves_data_items_at_construction() {
        let mut graph = stoplight_graph();
        graph.states[1].data.push(DataItem {
            id: "x".into(),
            source: crate::model::DataSource::Literal(Data::Number(42.0)),
        });
        let mut it = Interpreter::new(graph, false, DEFAULT_MAX_EVENTLESS_ITERATIONS, BindingType::Early);
        let mut dm = NullDatamodel::new();
        let mut tracer = DefaultTracer::new();
        it.construct(&mut dm, &mut tracer, None).unwrap();
        assert_eq!(dm.data().get("x"), Some(&Data::Number(42.0)));
    }

    #[test]
    fn eventless_bound_faults_on_runaway_cascade() {
        // a --eventless--> a (an unconditional self-transition forms an
        // infinite transient chain)
        let mut graph = stoplight_graph();
        graph.transitions.push(Transition {
            id: TransitionId(1),
            source: StateId(1),
            event: "".into(),
            target_path: "a".into(),
            target: StateId(1),
            cond: None,
            content: vec![],
            transition_type: TransitionType::External,
        });
        graph.states[1].transitions.push(TransitionId(1));
        let mut it = Interpreter::new(graph, false, 5, BindingType::Early);
        let mut dm = NullDatamodel::new();
        let mut tracer = DefaultTracer::new();
        let err = it.construct(&mut dm, &mut tracer, None).unwrap_err();
        assert!(matches!(err, Error::SessionFault(_)));
    }
}
