//! Error taxonomy for the statechart engine.
//!
//! Mirrors the error kinds described by the W3C SCXML processing model:
//! a session either fails at construction time ([`Error::InvalidConfig`]),
//! rejects a `trigger` call without changing its active configuration
//! ([`Error::InvalidState`], [`Error::InvalidTransition`],
//! [`Error::GuardNotSatisfied`], [`Error::ForkedTransition`]), or becomes
//! permanently [`crate::session::SessionState::Faulted`]
//! ([`Error::SessionFault`]).

use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// All error kinds the engine can raise.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Raised at construction (or dynamic `add_state`/`add_transition`)
    /// when a configuration record violates a §3 invariant.
    InvalidConfig(String),

    /// A state path could not be resolved.
    InvalidState(String),

    /// No transition matched the fired event from any active scope.
    InvalidTransition(String),

    /// Transitions matched the event, but every guard rejected them.
    GuardNotSatisfied(String),

    /// More than one transition was enabled at the same scope for the
    /// same event, and the session was constructed with
    /// [`crate::session::SessionOptions::strict`] set.
    ForkedTransition(String),

    /// Action content (`Assign`, `Script`, a host closure, ...) failed
    /// while executing.
    InvalidAction(String),

    /// The eventless closure did not reach a fixpoint within the
    /// configured iteration bound. The session is now
    /// [`crate::session::SessionState::Faulted`] and unusable.
    SessionFault(String),
}

impl Error {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Error {
        Error::InvalidConfig(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Error {
        Error::InvalidState(msg.into())
    }

    pub fn invalid_transition<S: Into<String>>(msg: S) -> Error {
        Error::InvalidTransition(msg.into())
    }

    pub fn guard_not_satisfied<S: Into<String>>(msg: S) -> Error {
        Error::GuardNotSatisfied(msg.into())
    }

    pub fn forked_transition<S: Into<String>>(msg: S) -> Error {
        Error::ForkedTransition(msg.into())
    }

    pub fn invalid_action<S: Into<String>>(msg: S) -> Error {
        Error::InvalidAction(msg.into())
    }

    pub fn session_fault<S: Into<String>>(msg: S) -> Error {
        Error::SessionFault(msg.into())
    }

    /// True for the two errors after which a session is unusable;
    /// false for the errors that leave the active configuration
    /// untouched and recoverable from the caller's perspective.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SessionFault(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(m) => write!(f, "invalid configuration: {}", m),
            Error::InvalidState(m) => write!(f, "invalid state: {}", m),
            Error::InvalidTransition(m) => write!(f, "invalid transition: {}", m),
            Error::GuardNotSatisfied(m) => write!(f, "guard not satisfied: {}", m),
            Error::ForkedTransition(m) => write!(f, "forked transition: {}", m),
            Error::InvalidAction(m) => write!(f, "invalid action: {}", m),
            Error::SessionFault(m) => write!(f, "session fault: {}", m),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
