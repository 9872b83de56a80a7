//! The declarative configuration record (spec.md §6.1) and the
//! loader-equivalent validation spec.md assigns to an external loader
//! (SPEC_FULL.md §3.3).
//!
//! `spec.md` treats the text/XML syntax that produces a configuration
//! record as an external collaborator's concern. This module is that
//! contract made concrete with `serde`: a JSON (or any other
//! `serde`-compatible format) description deserializes directly into
//! [`StateConfig`], and [`build`] performs the validation the spec
//! assigns to "the loader" — identifier syntax, `kind` inference from
//! shape (SPEC_FULL.md §4), initial/target path resolution, and the
//! structural invariants of spec.md §3.1.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{
    ActionContent, DataItem, DataSource, Expr, Guard, HistoryKind, Initial, State, StateGraph,
    StateId, Transition, TransitionId, TransitionType,
};
use crate::path;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKindConfig {
    Atomic,
    Compound,
    Parallel,
    Final,
    History,
    Condition,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKindConfig {
    Shallow,
    Deep,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionTypeConfig {
    Internal,
    External,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataConfig {
    pub id: String,
    pub src: Option<String>,
    pub expr: Option<String>,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatamodelConfig {
    #[serde(default)]
    pub data: Vec<DataConfig>,
}

/// A flat action record, mirroring how `If`/`ElseIf`/`Else` appear as
/// siblings in a configuration (spec.md §3.3); [`build`] folds a
/// sequence of them into a single [`ActionContent::If`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionConfig {
    Assign {
        location: String,
        expr: String,
    },
    Log {
        expr: String,
        label: Option<String>,
        level: Option<String>,
    },
    Raise {
        event: String,
    },
    Script {
        src: String,
    },
    If {
        cond: String,
        body: Vec<ActionConfig>,
    },
    ElseIf {
        cond: String,
        body: Vec<ActionConfig>,
    },
    Else {
        body: Vec<ActionConfig>,
    },
    ForEach {
        array: String,
        item: String,
        index: Option<String>,
        body: Vec<ActionConfig>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionConfig {
    pub event: Option<String>,
    pub target: String,
    pub cond: Option<String>,
    #[serde(default)]
    pub content: Vec<ActionConfig>,
    #[serde(rename = "type")]
    pub transition_type: Option<TransitionTypeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub name: String,
    pub kind: Option<StateKindConfig>,
    pub initial: Option<String>,
    pub history: Option<HistoryKindConfig>,
    pub datamodel: Option<DatamodelConfig>,
    #[serde(default)]
    pub states: Vec<StateConfig>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
    #[serde(default)]
    pub on_entry: Vec<ActionConfig>,
    #[serde(default)]
    pub on_exit: Vec<ActionConfig>,
}

/// Builds a fresh [`StateGraph`] from a root [`StateConfig`], raising
/// `Error::InvalidConfig` on any violated invariant (spec.md §3.1) and
/// `Error::InvalidState` if a transition or `initial` path does not
/// resolve.
pub fn build(cfg: &StateConfig, strict: bool) -> Result<StateGraph> {
    let mut states: Vec<State> = Vec::new();
    let mut pending: Vec<(StateId, TransitionConfig)> = Vec::new();
    let root = build_state(cfg, None, &mut states, &mut pending)?;
    let mut graph = StateGraph {
        states,
        transitions: Vec::new(),
        root,
    };
    resolve_pending(&mut graph, pending, strict)?;
    validate(&graph)?;
    Ok(graph)
}

/// Attaches a new child state under `parent` in a *copy* of `graph`,
/// returning the new graph on success and leaving `graph` itself
/// untouched either way (spec.md §6.2 `add_state`: "on failure ...
/// leave the session unchanged").
pub fn add_state_to_graph(
    graph: &StateGraph,
    cfg: &StateConfig,
    parent: StateId,
    strict: bool,
) -> Result<StateGraph> {
    let mut scratch = graph.clone();
    if !scratch.state(parent).kind.is_composite() {
        return Err(Error::invalid_config(format!(
            "cannot attach a child state to non-composite state {:?}",
            scratch.state(parent).name
        )));
    }
    let mut pending = Vec::new();
    let new_id = build_state(cfg, Some(parent), &mut scratch.states, &mut pending)?;
    scratch.states[parent.0].children.push(new_id);
    resolve_pending(&mut scratch, pending, strict)?;
    validate(&scratch)?;
    Ok(scratch)
}

/// Attaches a new outgoing transition to `owner` in a *copy* of
/// `graph`, with the same leave-unchanged-on-failure guarantee as
/// [`add_state_to_graph`].
pub fn add_transition_to_graph(
    graph: &StateGraph,
    cfg: &TransitionConfig,
    owner: StateId,
    strict: bool,
) -> Result<StateGraph> {
    let mut scratch = graph.clone();
    resolve_pending(&mut scratch, vec![(owner, cfg.clone())], strict)?;
    validate(&scratch)?;
    Ok(scratch)
}

fn build_state(
    cfg: &StateConfig,
    parent: Option<StateId>,
    states: &mut Vec<State>,
    pending: &mut Vec<(StateId, TransitionConfig)>,
) -> Result<StateId> {
    validate_ident(&cfg.name)?;
    let id = StateId(states.len());
    states.push(State {
        id,
        name: cfg.name.clone(),
        kind: crate::model::StateKind::Atomic,
        parent,
        children: vec![],
        initial: None,
        transitions: vec![],
        on_entry: vec![],
        on_exit: vec![],
        data: vec![],
    });

    let mut children = Vec::new();
    for child_cfg in &cfg.states {
        children.push(build_state(child_cfg, Some(id), states, pending)?);
    }

    let kind = infer_kind(cfg, &children, states)?;
    let initial = match (&kind, &cfg.initial) {
        (crate::model::StateKind::Compound, Some(p)) => Some(Initial::Static(p.clone())),
        (crate::model::StateKind::Compound, None) => {
            Some(Initial::Static(states[children[0].0].name.clone()))
        }
        _ => None,
    };
    let on_entry = convert_actions(&cfg.on_entry)?;
    let on_exit = convert_actions(&cfg.on_exit)?;
    let data = convert_data(cfg.datamodel.as_ref())?;

    for t in &cfg.transitions {
        pending.push((id, t.clone()));
    }

    let st = &mut states[id.0];
    st.kind = kind;
    st.children = children;
    st.initial = initial;
    st.on_entry = on_entry;
    st.on_exit = on_exit;
    st.data = data;
    Ok(id)
}

fn resolve_pending(
    graph: &mut StateGraph,
    pending: Vec<(StateId, TransitionConfig)>,
    strict: bool,
) -> Result<()> {
    for (source, tcfg) in pending {
        let target = path::resolve(graph, Some(source), &tcfg.target, strict)?;
        let transition_type = match tcfg.transition_type {
            Some(TransitionTypeConfig::Internal) => TransitionType::Internal,
            _ => TransitionType::External,
        };
        let cond = tcfg.cond.as_ref().map(|c| Guard::Source(c.clone()));
        let content = convert_actions(&tcfg.content)?;
        let tid = TransitionId(graph.transitions.len());
        let event = tcfg.event.clone().unwrap_or_default();
        graph.transitions.push(Transition {
            id: tid,
            source,
            event,
            target_path: tcfg.target.clone(),
            target,
            cond,
            content,
            transition_type,
        });
        graph.states[source.0].transitions.push(tid);
    }
    Ok(())
}

fn infer_kind(
    cfg: &StateConfig,
    children: &[StateId],
    states: &[State],
) -> Result<crate::model::StateKind> {
    use crate::model::StateKind;
    if let Some(explicit) = cfg.kind {
        return Ok(match explicit {
            StateKindConfig::Atomic => StateKind::Atomic,
            StateKindConfig::Compound => StateKind::Compound,
            StateKindConfig::Parallel => StateKind::Parallel,
            StateKindConfig::Final => StateKind::Final,
            StateKindConfig::History => StateKind::History(match cfg.history {
                Some(HistoryKindConfig::Deep) => HistoryKind::Deep,
                _ => HistoryKind::Shallow,
            }),
            StateKindConfig::Condition => StateKind::Condition,
        });
    }
    let _ = states;
    if children.is_empty() {
        Ok(StateKind::Atomic)
    } else if cfg.initial.is_some() {
        Ok(StateKind::Compound)
    } else if children.len() >= 2 {
        Ok(StateKind::Parallel)
    } else {
        Err(Error::invalid_config(format!(
            "state {:?} has children but neither an explicit kind, an initial child, nor \
             enough children to infer parallel (needs >= 2)",
            cfg.name
        )))
    }
}

fn convert_data(dm_cfg: Option<&DatamodelConfig>) -> Result<Vec<DataItem>> {
    let Some(dm_cfg) = dm_cfg else {
        return Ok(vec![]);
    };
    dm_cfg
        .data
        .iter()
        .map(|d| {
            let set = [d.src.is_some(), d.expr.is_some(), d.value.is_some()]
                .iter()
                .filter(|b| **b)
                .count();
            if set != 1 {
                return Err(Error::invalid_config(format!(
                    "data item {:?} must set exactly one of src/expr/value",
                    d.id
                )));
            }
            let source = if let Some(src) = &d.src {
                DataSource::Src(src.clone())
            } else if let Some(expr) = &d.expr {
                DataSource::Expr(Expr::Source(expr.clone()))
            } else {
                DataSource::Literal(json_to_data(d.value.as_ref().unwrap()))
            };
            Ok(DataItem {
                id: d.id.clone(),
                source,
            })
        })
        .collect()
}

fn json_to_data(v: &serde_json::Value) -> crate::datamodel::Data {
    use crate::datamodel::Data;
    match v {
        serde_json::Value::Null => Data::Null,
        serde_json::Value::Bool(b) => Data::Bool(*b),
        serde_json::Value::Number(n) => Data::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Data::String(s.clone()),
        serde_json::Value::Array(a) => Data::Array(a.iter().map(json_to_data).collect()),
        serde_json::Value::Object(o) => {
            Data::Map(o.iter().map(|(k, v)| (k.clone(), json_to_data(v))).collect())
        }
    }
}

/// Folds a flat sequence of action records into the model's nested
/// `If { branches, otherwise }` shape (spec.md §3.3 note).
fn convert_actions(cfgs: &[ActionConfig]) -> Result<Vec<ActionContent>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < cfgs.len() {
        match &cfgs[i] {
            ActionConfig::If { cond, body } => {
                let mut branches = vec![(Expr::Source(cond.clone()), convert_actions(body)?)];
                let mut otherwise = None;
                i += 1;
                while i < cfgs.len() {
                    match &cfgs[i] {
                        ActionConfig::ElseIf { cond, body } => {
                            branches.push((Expr::Source(cond.clone()), convert_actions(body)?));
                            i += 1;
                        }
                        ActionConfig::Else { body } => {
                            otherwise = Some(convert_actions(body)?);
                            i += 1;
                            break;
                        }
                        _ => break,
                    }
                }
                out.push(ActionContent::If { branches, otherwise });
                continue;
            }
            ActionConfig::ElseIf { .. } | ActionConfig::Else { .. } => {
                return Err(Error::invalid_config(
                    "ElseIf/Else action with no preceding If",
                ));
            }
            ActionConfig::Assign { location, expr } => out.push(ActionContent::Assign {
                location: location.clone(),
                expr: Expr::Source(expr.clone()),
            }),
            ActionConfig::Log { expr, label, level } => out.push(ActionContent::Log {
                expr: Expr::Source(expr.clone()),
                label: label.clone(),
                level: level.clone(),
            }),
            ActionConfig::Raise { event } => out.push(ActionContent::Raise {
                event: event.clone(),
            }),
            ActionConfig::Script { src } => out.push(ActionContent::Script {
                src: Expr::Source(src.clone()),
            }),
            ActionConfig::ForEach {
                array,
                item,
                index,
                body,
            } => out.push(ActionContent::ForEach {
                array_expr: Expr::Source(array.clone()),
                item: item.clone(),
                index: index.clone(),
                body: convert_actions(body)?,
            }),
        }
        i += 1;
    }
    Ok(out)
}

fn validate_ident(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-'))
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_config(format!(
            "invalid state identifier {:?} (expected [A-Za-z][A-Za-z0-9:._-]*)",
            name
        )))
    }
}

fn validate(graph: &StateGraph) -> Result<()> {
    if !graph.state(graph.root).kind.is_composite() {
        return Err(Error::invalid_config("root state must be compound or parallel"));
    }
    for s in &graph.states {
        match s.kind {
            crate::model::StateKind::Compound => {
                if s.children.is_empty() {
                    return Err(Error::invalid_config(format!(
                        "compound state {:?} has no children",
                        s.name
                    )));
                }
            }
            crate::model::StateKind::Parallel => {
                if s.children.len() < 2 {
                    return Err(Error::invalid_config(format!(
                        "parallel state {:?} needs at least 2 children",
                        s.name
                    )));
                }
                if !s
                    .children
                    .iter()
                    .all(|&c| graph.state(c).kind.is_composite())
                {
                    return Err(Error::invalid_config(format!(
                        "parallel state {:?} children must all be composite (compound or parallel)",
                        s.name
                    )));
                }
            }
            crate::model::StateKind::Final => {
                if !s.children.is_empty() || !s.transitions.is_empty() {
                    return Err(Error::invalid_config(format!(
                        "final state {:?} must have no children and no outgoing transitions",
                        s.name
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stoplight_json() -> StateConfig {
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
    fn builds_a_valid_graph() {
        let cfg = stoplight_json();
        let graph = build(&cfg, false).unwrap();
        assert_eq!(graph.states.len(), 3);
        assert_eq!(graph.transitions.len(), 2);
    }

    #[test]
    fn infers_compound_kind_from_initial() {
        let cfg = stoplight_json();
        let graph = build(&cfg, false).unwrap();
        assert_eq!(graph.state(graph.root).kind, crate::model::StateKind::Compound);
    }

    #[test]
    fn rejects_unresolvable_transition_target() {
        let mut cfg = stoplight_json();
        cfg.states[0].transitions[0].target = "nowhere".into();
        assert!(build(&cfg, false).is_err());
    }

    #[test]
    fn rejects_parallel_with_fewer_than_two_children() {
        let cfg: StateConfig = serde_json::from_value(serde_json::json!({
            "name": "root",
            "kind": "parallel",
            "states": [
                {"name": "only", "kind": "compound", "initial": "x", "states": [{"name": "x"}]}
            ]
        }))
        .unwrap();
        assert!(build(&cfg, false).is_err());
    }

    #[test]
    fn folds_if_elseif_else_into_single_node() {
        let cfg: StateConfig = serde_json::from_value(serde_json::json!({
            "name": "root",
            "kind": "compound",
            "initial": "a",
            "states": [{
                "name": "a",
                "on_entry": [
                    {"type": "if", "cond": "x > 1", "body": [{"type": "raise", "event": "big"}]},
                    {"type": "elseif", "cond": "x > 0", "body": [{"type": "raise", "event": "small"}]},
                    {"type": "else", "body": [{"type": "raise", "event": "zero"}]}
                ]
            }]
        }))
        .unwrap();
        let graph = build(&cfg, false).unwrap();
        let a = graph.find_by_name("a").unwrap();
        assert_eq!(graph.state(a).on_entry.len(), 1);
        match &graph.state(a).on_entry[0] {
            ActionContent::If { branches, otherwise } => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("expected a folded If node, got {:?}", other),
        }
    }
}
