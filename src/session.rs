//! The public session API (spec layer L5, spec.md §6.2).
//!
//! A [`Session`] owns one [`Interpreter`], one boxed [`Datamodel`] and
//! one boxed [`Tracer`], and tracks the lifecycle state table of
//! spec.md §4.4 (`Constructing` → `Idle` ⇄ `Processing` → `Faulted`).
//! Each session is independent: [`Session::new`] builds its own
//! `StateGraph` (and thus its own arena), so two sessions created from
//! the same [`crate::config::StateConfig`] never share mutable state
//! (spec.md §3.4 "Lifecycle").

use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{self, StateConfig, TransitionConfig};
use crate::datamodel::{Data, Datamodel, NullDatamodel};
use crate::error::{Error, Result};
use crate::interpreter::{Interpreter, ResourceResolver, DEFAULT_MAX_EVENTLESS_ITERATIONS};
use crate::model::{BindingType, State, StateId};
use crate::path;
use crate::tracer::{DefaultTracer, Tracer};

/// Lifecycle state of a session (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Running the initial descent; not yet observable by a caller.
    Constructing,
    /// Stable; ready to accept `trigger`.
    Idle,
    /// Running a macrostep; re-entrant calls are rejected.
    Processing,
    /// The eventless closure overflowed its iteration bound. The
    /// session is permanently unusable.
    Faulted,
}

pub struct SessionOptions {
    /// Whether the [`DefaultTracer`] starts with `STATES`/`EVENTS`
    /// tracing enabled.
    pub logging_enabled: bool,
    /// Accepted for forward compatibility with a host-level log-level
    /// filter; the engine itself always traces through `log` at
    /// `trace` level (SPEC_FULL.md §3.1) regardless of this value.
    pub logging_level: Option<String>,
    /// Overrides the root's default initial descent with a specific
    /// state path (absolute or bare).
    pub initial: Option<String>,
    /// Rejects ambiguous bare-name lookups and forked transitions
    /// instead of taking the first match / first document-order
    /// transition (SPEC_FULL.md §4, §6 Open Questions 2–3).
    pub strict: bool,
    pub binding: BindingType,
    pub max_eventless_iterations: usize,
    /// The datamodel provider to construct: `"null"` or `"expr"`.
    pub datamodel: String,
    pub resource_resolver: Option<ResourceResolver>,
}

impl Debug for SessionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("logging_enabled", &self.logging_enabled)
            .field("logging_level", &self.logging_level)
            .field("initial", &self.initial)
            .field("strict", &self.strict)
            .field("binding", &self.binding)
            .field("max_eventless_iterations", &self.max_eventless_iterations)
            .field("datamodel", &self.datamodel)
            .finish()
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            logging_enabled: true,
            logging_level: None,
            initial: None,
            strict: false,
            binding: BindingType::Early,
            max_eventless_iterations: DEFAULT_MAX_EVENTLESS_ITERATIONS,
            datamodel: "null".to_string(),
            resource_resolver: None,
        }
    }
}

/// A coarse-grained but collision-resistant-enough session id:
/// high bits from wall-clock nanoseconds, low bits from a process-wide
/// counter — no `rand` dependency needed (none of the example repos in
/// this crate's corpus pull one in for an id; the teacher's own
/// `fsm.rs` uses the same "static atomic counter" idiom for its
/// `ID_COUNTER`).
fn new_session_id() -> u128 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed) as u128;
    (nanos << 32) ^ counter
}

/// A running statechart instance (spec.md §6.2).
pub struct Session {
    id: u128,
    state: SessionState,
    interpreter: Interpreter,
    datamodel: Box<dyn Datamodel>,
    tracer: Box<dyn Tracer>,
    active_cache: Rc<RefCell<Vec<String>>>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("active", &self.active_cache.borrow())
            .finish()
    }
}

impl Session {
    /// Builds and constructs a new session from `config` (spec.md §6.2
    /// `new`). Runs the initial descent (and its eventless closure)
    /// before returning; the session starts `Idle`, or the call fails
    /// with whatever error the construction raised.
    pub fn new(config: &StateConfig, options: SessionOptions) -> Result<Session> {
        let graph = config::build(config, options.strict)?;
        let initial_override = match &options.initial {
            Some(p) => Some(path::resolve(&graph, Some(graph.root), p, options.strict)?),
            None => None,
        };

        let mut datamodel: Box<dyn Datamodel> = match options.datamodel.as_str() {
            "null" => Box::new(NullDatamodel::new()),
            "expr" => Box::new(crate::expr::ExprDatamodel::new()),
            other => {
                return Err(Error::invalid_config(format!(
                    "unknown datamodel provider {:?} (expected \"null\" or \"expr\")",
                    other
                )))
            }
        };

        let active_cache: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let cache = active_cache.clone();
            datamodel.set_in_predicate(Rc::new(move |name: &str| {
                cache.borrow().iter().any(|s| s == name)
            }));
        }

        let mut interpreter = Interpreter::with_resource_resolver(
            graph,
            options.strict,
            options.max_eventless_iterations,
            options.binding,
            options.resource_resolver.clone(),
        );

        let mut tracer: Box<dyn Tracer> = Box::new(DefaultTracer::new());
        if options.logging_enabled {
            tracer.enable_trace(crate::tracer::TraceMode::STATES);
            tracer.enable_trace(crate::tracer::TraceMode::EVENTS);
        }

        let construct_result = interpreter.construct(datamodel.as_mut(), tracer.as_mut(), initial_override);
        let mut session = Session {
            id: new_session_id(),
            state: SessionState::Constructing,
            interpreter,
            datamodel,
            tracer,
            active_cache,
        };
        session.sync_active_cache();
        match construct_result {
            Ok(()) => {
                session.state = SessionState::Idle;
                Ok(session)
            }
            Err(e) => {
                session.state = if e.is_fatal() {
                    SessionState::Faulted
                } else {
                    SessionState::Idle
                };
                Err(e)
            }
        }
    }

    fn sync_active_cache(&mut self) {
        *self.active_cache.borrow_mut() = self.interpreter.active_names();
    }

    /// The 128-bit session identifier (spec.md §3.4).
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    /// Dispatches one external event (spec.md §6.2 `trigger`). Returns
    /// the value of the last action content executed by the
    /// transition(s) it fired, or `Error::InvalidTransition` /
    /// `Error::GuardNotSatisfied` if nothing fired — in both error
    /// cases the active configuration is unchanged.
    pub fn trigger(&mut self, event: &str, payload: Option<Data>) -> Result<Data> {
        if self.state == SessionState::Faulted {
            return Err(Error::session_fault("session is faulted and can no longer process events"));
        }
        self.state = SessionState::Processing;
        let result = self
            .interpreter
            .trigger(event, payload, self.datamodel.as_mut(), self.tracer.as_mut());
        self.sync_active_cache();
        self.state = match &result {
            Ok(_) => SessionState::Idle,
            Err(e) if e.is_fatal() => SessionState::Faulted,
            Err(_) => SessionState::Idle,
        };
        result
    }

    /// The full active configuration, leaves first (spec.md §6.2 `active`).
    pub fn active(&self) -> Vec<String> {
        self.interpreter.active_names()
    }

    /// The name of the first active leaf in document order (spec.md
    /// §6.2 `state`; with orthogonal regions this is an arbitrary but
    /// stable pick — use [`Session::active`] for the full picture).
    pub fn state(&self) -> Option<String> {
        self.interpreter
            .leaves()
            .first()
            .map(|&id| self.interpreter.graph.state(id).name.clone())
    }

    /// Names of the siblings of [`Session::state`]'s leaf (spec.md
    /// §6.2 `states`).
    pub fn states(&self) -> Vec<String> {
        let Some(&leaf) = self.interpreter.leaves().first() else {
            return vec![];
        };
        let Some(parent) = self.interpreter.graph.state(leaf).parent else {
            return vec![];
        };
        self.interpreter
            .graph
            .state(parent)
            .children
            .iter()
            .map(|&c| self.interpreter.graph.state(c).name.clone())
            .collect()
    }

    /// Looks a state up by path (absolute, bare, or relative to the
    /// first active leaf) and returns its current `State` record
    /// (spec.md §6.2 `get_state`).
    pub fn get_state(&self, name: &str) -> Result<&State> {
        let anchor = self.interpreter.leaves().first().copied();
        let id = path::resolve(&self.interpreter.graph, anchor, name, false)?;
        Ok(self.interpreter.graph.state(id))
    }

    /// Whether `name` names a currently active state (spec.md §6.2
    /// `is_<name>`/`is_active` predicate — see DESIGN.md).
    pub fn is_active(&self, name: &str) -> bool {
        self.interpreter.active_names().iter().any(|n| n == name)
    }

    pub fn state_id(&self, name: &str) -> Result<StateId> {
        let anchor = self.interpreter.leaves().first().copied();
        path::resolve(&self.interpreter.graph, anchor, name, false)
    }

    /// Attaches a new state as a child of `parent` (spec.md §6.2
    /// `add_state`). Fails, leaving the session unchanged, if `parent`
    /// is not composite or the resulting graph violates an invariant.
    pub fn add_state(&mut self, state: &StateConfig, parent: StateId) -> Result<StateId> {
        let graph = config::add_state_to_graph(&self.interpreter.graph, state, parent, self.interpreter.strict)?;
        let new_id = StateId(graph.states.len() - 1);
        self.interpreter.graph = graph;
        Ok(new_id)
    }

    /// Attaches a new outgoing transition to `owner` (spec.md §6.2
    /// `add_transition`), with the same failure guarantee as
    /// [`Session::add_state`].
    pub fn add_transition(&mut self, transition: &TransitionConfig, owner: StateId) -> Result<()> {
        let graph =
            config::add_transition_to_graph(&self.interpreter.graph, transition, owner, self.interpreter.strict)?;
        self.interpreter.graph = graph;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stoplight() -> StateConfig {
        serde_json::from_value(serde_json::json!({
            "name": "root",
            "kind": "compound",
            "initial": "red",
            "states": [
                {"name": "red", "transitions": [{"event": "tick", "target": "green"}]},
                {"name": "green", "transitions": [{"event": "tick", "target": "red"}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn session_starts_in_default_initial_state() {
        let session = Session::new(&stoplight(), SessionOptions::default()).unwrap();
        assert_eq!(session.session_state(), SessionState::Idle);
        assert!(session.is_active("red"));
    }

    #[test]
    fn trigger_cycles_between_states() {
        let mut session = Session::new(&stoplight(), SessionOptions::default()).unwrap();
        session.trigger("tick", None).unwrap();
        assert!(session.is_active("green"));
        session.trigger("tick", None).unwrap();
        assert!(session.is_active("red"));
    }

    #[test]
    fn two_sessions_from_the_same_config_are_independent() {
        let cfg = stoplight();
        let mut s1 = Session::new(&cfg, SessionOptions::default()).unwrap();
        let s2 = Session::new(&cfg, SessionOptions::default()).unwrap();
        s1.trigger("tick", None).unwrap();
        assert!(s1.is_active("green"));
        assert!(s2.is_active("red"));
        assert_ne!(s1.id(), s2.id());
    }

    #[test]
    fn unmatched_event_leaves_configuration_untouched() {
        let mut session = Session::new(&stoplight(), SessionOptions::default()).unwrap();
        assert!(session.trigger("nope", None).is_err());
        assert_eq!(session.session_state(), SessionState::Idle);
        assert!(session.is_active("red"));
    }

    #[test]
    fn in_predicate_reflects_live_configuration() {
        let mut session = Session::new(
            &stoplight(),
            SessionOptions {
                datamodel: "expr".to_string(),
                ..SessionOptions::default()
            },
        )
        .unwrap();
        let red_id = session.state_id("red").unwrap();
        assert!(session.get_state("red").is_ok());
        session.trigger("tick", None).unwrap();
        let _ = red_id;
        assert!(session.is_active("green"));
    }
}
