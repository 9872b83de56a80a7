//! The data environment / expression-provider abstraction (spec.md
//! §3.2 "Datamodel provider", §4.3, §6.3).
//!
//! A `Datamodel` owns the session's data environment and is the only
//! thing that ever evaluates a [`Guard`] or an [`Expr`]. The core
//! never embeds an expression language itself; [`NullDatamodel`] below
//! is the trivial provider (no data, only the mandatory `In()`
//! predicate), and [`crate::expr`] layers a small arithmetic/string
//! expression language on top of the same trait for sessions that want
//! more than `In()`.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use log::trace;

use crate::error::{Error, Result};
use crate::model::{Expr, Guard};

pub const NULL_DATAMODEL: &str = "null";

/// A value in the data environment.
///
/// Deliberately smaller than a general JSON value: statecharts rarely
/// need more than these six shapes, and every provider in this crate
/// works with exactly this set (spec.md does not mandate a richer
/// model, and ECMAScript-grade dynamic typing is out of scope per
/// SPEC_FULL.md §4).
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Data>),
    Map(HashMap<String, Data>),
}

impl Data {
    pub fn as_bool(&self) -> bool {
        match self {
            Data::Null => false,
            Data::Bool(b) => *b,
            Data::Number(n) => *n != 0.0,
            Data::String(s) => !s.is_empty(),
            Data::Array(a) => !a.is_empty(),
            Data::Map(m) => !m.is_empty(),
        }
    }

    pub fn as_array(&self) -> Option<&[Data]> {
        match self {
            Data::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }
}

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Data::Null => write!(f, "null"),
            Data::Bool(b) => write!(f, "{}", b),
            Data::Number(n) => write!(f, "{}", n),
            Data::String(s) => write!(f, "{}", s),
            Data::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Data::Map(_) => write!(f, "<map>"),
        }
    }
}

/// The per-session flat data environment. A session's local bindings
/// (`foreach` loop variables, `Assign` locations, declared `datamodel`
/// items) all live here under their plain name.
#[derive(Debug, Default)]
pub struct DataStore {
    values: HashMap<String, Data>,
}

impl DataStore {
    pub fn new() -> DataStore {
        DataStore::default()
    }

    pub fn get(&self, key: &str) -> Option<&Data> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, data: Data) {
        self.values.insert(key.to_string(), data);
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Data)> {
        self.values.iter()
    }
}

/// Data environment / expression provider (spec.md §3.2, §6.3).
///
/// A session owns exactly one `Datamodel`. It is asked to evaluate
/// every [`Guard`] and [`Expr`] in the state graph and is the sole
/// owner of the data environment `Assign`/`ForEach` read and write.
pub trait Datamodel: Debug {
    /// The name reported as the configuration's `datamodel` field
    /// (e.g. `"null"`, `"expr"`).
    fn name(&self) -> &str;

    /// Evaluate a guard. Guards are expected to be free of side
    /// effects; providers should not mutate the data environment here.
    fn eval(&mut self, guard: &Guard) -> Result<bool>;

    /// Evaluate a value-producing expression. May mutate the data
    /// environment (a `Script`, the right-hand side of `Assign`).
    fn exec(&mut self, expr: &Expr) -> Result<Data>;

    fn data(&self) -> &DataStore;
    fn data_mut(&mut self) -> &mut DataStore;

    /// Bind a name in the data environment, shadowing any previous
    /// value — used for `Assign` locations and `ForEach` loop
    /// variables.
    fn bind(&mut self, name: &str, value: Data) {
        self.data_mut().set(name, value);
    }

    /// Remove a binding — used to un-scope a `ForEach` loop variable
    /// once the loop body finishes an iteration's final pass.
    fn unbind(&mut self, name: &str) {
        self.data_mut().remove(name);
    }

    /// Registers the core's active-configuration predicate so that a
    /// provider's `In("name")` support can consult it. The interpreter
    /// calls this once, right after constructing the datamodel
    /// (spec.md §6.3 "a registration hook for the In predicate").
    fn set_in_predicate(&mut self, in_predicate: Rc<dyn Fn(&str) -> bool>);

    /// Sink for `Log` action content. `level` is either a `log::Level`
    /// name or an arbitrary label, passed through uninterpreted
    /// (`original_source/model/action.py`'s `Log.level` is similarly
    /// permissive).
    fn log(&mut self, msg: &str, label: Option<&str>, level: Option<&str>) {
        let _ = level;
        match label {
            Some(l) => trace!("[{}] {}", l, msg),
            None => trace!("{}", msg),
        }
    }
}

/// The trivial provider (spec.md §6.3, W3C "Null Data Model" in
/// spirit): no stored data, no scripting, no location expressions.
/// `In("name")` is the only supported conditional.
pub struct NullDatamodel {
    store: DataStore,
    in_predicate: Option<Rc<dyn Fn(&str) -> bool>>,
}

impl Debug for NullDatamodel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullDatamodel").finish()
    }
}

impl Default for NullDatamodel {
    fn default() -> Self {
        NullDatamodel::new()
    }
}

impl NullDatamodel {
    pub fn new() -> NullDatamodel {
        NullDatamodel {
            store: DataStore::new(),
            in_predicate: None,
        }
    }

    fn eval_in(&self, source: &str) -> bool {
        let trimmed = source.trim();
        let Some(inner) = trimmed
            .strip_prefix("In(")
            .and_then(|s| s.strip_suffix(')'))
        else {
            return false;
        };
        let mut name = inner.trim();
        if (name.starts_with('\'') && name.ends_with('\''))
            || (name.starts_with('"') && name.ends_with('"'))
        {
            name = &name[1..name.len() - 1];
        }
        self.in_predicate
            .as_ref()
            .map(|f| f(name))
            .unwrap_or(false)
    }
}

impl Datamodel for NullDatamodel {
    fn name(&self) -> &str {
        NULL_DATAMODEL
    }

    fn eval(&mut self, guard: &Guard) -> Result<bool> {
        match guard {
            Guard::Literal(b) => Ok(*b),
            Guard::Callable(f) => Ok(f(self)),
            Guard::Source(s) => Ok(self.eval_in(s)),
        }
    }

    fn exec(&mut self, expr: &Expr) -> Result<Data> {
        match expr {
            Expr::Literal(d) => Ok(d.clone()),
            Expr::Callable(f) => Ok(f(self)),
            Expr::Source(s) => Err(Error::invalid_action(format!(
                "the null datamodel has no value expression language (got {:?})",
                s
            ))),
        }
    }

    fn data(&self) -> &DataStore {
        &self.store
    }

    fn data_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    fn set_in_predicate(&mut self, in_predicate: Rc<dyn Fn(&str) -> bool>) {
        self.in_predicate = Some(in_predicate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn literal_guards_evaluate_directly() {
        let mut dm = NullDatamodel::new();
        assert!(dm.eval(&Guard::Literal(true)).unwrap());
        assert!(!dm.eval(&Guard::Literal(false)).unwrap());
    }

    #[test]
    fn in_predicate_consults_registered_hook() {
        let mut dm = NullDatamodel::new();
        let active = RefCell::new(vec!["a".to_string()]);
        dm.set_in_predicate(Rc::new(move |name| active.borrow().iter().any(|s| s == name)));
        assert!(dm.eval(&Guard::Source("In('a')".into())).unwrap());
        assert!(!dm.eval(&Guard::Source("In('b')".into())).unwrap());
    }

    #[test]
    fn source_exec_is_unsupported_on_null_model() {
        let mut dm = NullDatamodel::new();
        assert!(dm.exec(&Expr::Source("1 + 1".into())).is_err());
    }

    #[test]
    fn literal_exec_passes_through() {
        let mut dm = NullDatamodel::new();
        assert_eq!(
            dm.exec(&Expr::Literal(Data::Number(3.0))).unwrap(),
            Data::Number(3.0)
        );
    }

    #[test]
    fn bind_and_unbind_round_trip() {
        let mut dm = NullDatamodel::new();
        dm.bind("x", Data::Number(1.0));
        assert_eq!(dm.data().get("x"), Some(&Data::Number(1.0)));
        dm.unbind("x");
        assert_eq!(dm.data().get("x"), None);
    }
}
