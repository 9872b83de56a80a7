//! The built-in ("default") expression provider: a small
//! arithmetic/boolean/string expression language plus the mandatory
//! `In("name")` predicate, layered on top of [`crate::datamodel::Datamodel`].
//!
//! Grounded on the teacher's `expression_engine` module and its
//! `RFsmExpressionDatamodel` (parse-once, cache-by-source-text,
//! evaluate-many pattern in `datamodel/expression_engine.rs`), scaled
//! down: no `Arc<Mutex<_>>` sharing (a session is single-threaded) and
//! a much smaller grammar (no member access, no method calls beyond
//! the one builtin).

pub mod lexer;
pub mod parser;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use log::trace;

use crate::datamodel::{Data, DataStore, Datamodel};
use crate::error::{Error, Result};
use crate::expr::parser::{Ast, BinOp, UnOp};
use crate::model::{Expr, Guard};

/// The expression-capable provider (configuration `"datamodel": "expr"`).
pub struct ExprDatamodel {
    store: DataStore,
    in_predicate: Option<Rc<dyn Fn(&str) -> bool>>,
    cache: RefCell<HashMap<String, Ast>>,
}

impl Debug for ExprDatamodel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExprDatamodel").finish()
    }
}

impl Default for ExprDatamodel {
    fn default() -> Self {
        ExprDatamodel::new()
    }
}

impl ExprDatamodel {
    pub fn new() -> ExprDatamodel {
        ExprDatamodel {
            store: DataStore::new(),
            in_predicate: None,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn compile(&self, source: &str) -> Result<()> {
        if self.cache.borrow().contains_key(source) {
            return Ok(());
        }
        let ast = parser::parse(source)
            .map_err(|e| Error::invalid_action(format!("cannot parse {:?}: {}", source, e)))?;
        trace!("compiled expression {:?}", source);
        self.cache.borrow_mut().insert(source.to_string(), ast);
        Ok(())
    }

    fn eval_source(&self, source: &str) -> Result<Data> {
        self.compile(source)?;
        let cache = self.cache.borrow();
        let ast = cache.get(source).expect("just compiled");
        eval_ast(ast, &self.store, self.in_predicate.as_deref())
    }
}

impl Datamodel for ExprDatamodel {
    fn name(&self) -> &str {
        "expr"
    }

    fn eval(&mut self, guard: &Guard) -> Result<bool> {
        match guard {
            Guard::Literal(b) => Ok(*b),
            Guard::Callable(f) => Ok(f(self)),
            Guard::Source(s) => Ok(self.eval_source(s)?.as_bool()),
        }
    }

    fn exec(&mut self, expr: &Expr) -> Result<Data> {
        match expr {
            Expr::Literal(d) => Ok(d.clone()),
            Expr::Callable(f) => Ok(f(self)),
            Expr::Source(s) => self.eval_source(s),
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

fn eval_ast(ast: &Ast, store: &DataStore, in_predicate: Option<&dyn Fn(&str) -> bool>) -> Result<Data> {
    match ast {
        Ast::Number(n) => Ok(Data::Number(*n)),
        Ast::Str(s) => Ok(Data::String(s.clone())),
        Ast::Ident(name) => Ok(store.get(name).cloned().unwrap_or(Data::Null)),
        Ast::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_ast(item, store, in_predicate)?);
            }
            Ok(Data::Array(out))
        }
        Ast::Call(name, args) if name == "In" => {
            let arg = args
                .first()
                .ok_or_else(|| Error::invalid_action("In() requires one argument"))?;
            let value = eval_ast(arg, store, in_predicate)?;
            let name = match value {
                Data::String(s) => s,
                other => return Err(Error::invalid_action(format!("In() argument must be a string, got {}", other))),
            };
            Ok(Data::Bool(in_predicate.map(|f| f(&name)).unwrap_or(false)))
        }
        Ast::Call(name, _) => Err(Error::invalid_action(format!("unknown function {:?}", name))),
        Ast::Index(base, index) => {
            let base = eval_ast(base, store, in_predicate)?;
            let index = eval_ast(index, store, in_predicate)?;
            match (base, index) {
                (Data::Array(items), Data::Number(n)) => {
                    let i = n as usize;
                    Ok(items.get(i).cloned().unwrap_or(Data::Null))
                }
                (other, _) => Err(Error::invalid_action(format!("cannot index into {}", other))),
            }
        }
        Ast::Unary(UnOp::Neg, inner) => match eval_ast(inner, store, in_predicate)? {
            Data::Number(n) => Ok(Data::Number(-n)),
            other => Err(Error::invalid_action(format!("cannot negate {}", other))),
        },
        Ast::Unary(UnOp::Not, inner) => {
            Ok(Data::Bool(!eval_ast(inner, store, in_predicate)?.as_bool()))
        }
        Ast::Binary(BinOp::And, l, r) => {
            let left = eval_ast(l, store, in_predicate)?;
            if !left.as_bool() {
                return Ok(Data::Bool(false));
            }
            Ok(Data::Bool(eval_ast(r, store, in_predicate)?.as_bool()))
        }
        Ast::Binary(BinOp::Or, l, r) => {
            let left = eval_ast(l, store, in_predicate)?;
            if left.as_bool() {
                return Ok(Data::Bool(true));
            }
            Ok(Data::Bool(eval_ast(r, store, in_predicate)?.as_bool()))
        }
        Ast::Binary(op, l, r) => {
            let left = eval_ast(l, store, in_predicate)?;
            let right = eval_ast(r, store, in_predicate)?;
            eval_binary(*op, left, right)
        }
    }
}

fn eval_binary(op: BinOp, left: Data, right: Data) -> Result<Data> {
    use BinOp::*;
    match op {
        Eq => Ok(Data::Bool(left == right)),
        Ne => Ok(Data::Bool(left != right)),
        Add | Sub | Mul | Div | Mod | Lt | Le | Gt | Ge => {
            match (&left, &right) {
                (Data::String(a), Data::String(b)) if op == Add => {
                    Ok(Data::String(format!("{}{}", a, b)))
                }
                (Data::Number(a), Data::Number(b)) => {
                    let a = *a;
                    let b = *b;
                    Ok(match op {
                        Add => Data::Number(a + b),
                        Sub => Data::Number(a - b),
                        Mul => Data::Number(a * b),
                        Div => Data::Number(a / b),
                        Mod => Data::Number(a % b),
                        Lt => Data::Bool(a < b),
                        Le => Data::Bool(a <= b),
                        Gt => Data::Bool(a > b),
                        Ge => Data::Bool(a >= b),
                        _ => unreachable!(),
                    })
                }
                _ => Err(Error::invalid_action(format!(
                    "operator {:?} not defined for {} and {}",
                    op, left, right
                ))),
            }
        }
        And | Or => unreachable!("handled with short-circuit above"),
    }
}
