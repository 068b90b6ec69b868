use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::result;
use thiserror::Error;

/// Category of a language-level condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ConditionKind {
    /// Too many positional arguments for a fixed formal list.
    Arity,
    /// A formal matched more than once, or an ambiguous partial name.
    AmbiguousNameMatch,
    /// A formal bound to the missing marker was read.
    MissingArgument,
    /// A promise was forced while already under evaluation (strict mode only).
    CyclicPromise,
    /// No method resolved for a generic.
    DispatchNotFound,
    /// A named argument matched no formal and there is no `...`.
    UnusedArgument,
    ObjectNotFound,
    InvalidArgument,
    /// Call depth exceeded the configured limit.
    RecursionLimit,
    /// Raised by `stop()`.
    User,
}

impl ConditionKind {
    pub fn code(self) -> &'static str {
        match self {
            ConditionKind::Arity => "lzr::arity",
            ConditionKind::AmbiguousNameMatch => "lzr::ambiguous_name",
            ConditionKind::MissingArgument => "lzr::missing",
            ConditionKind::CyclicPromise => "lzr::cyclic_promise",
            ConditionKind::DispatchNotFound => "lzr::dispatch_not_found",
            ConditionKind::UnusedArgument => "lzr::unused_argument",
            ConditionKind::ObjectNotFound => "lzr::object_not_found",
            ConditionKind::InvalidArgument => "lzr::invalid_argument",
            ConditionKind::RecursionLimit => "lzr::recursion_limit",
            ConditionKind::User => "lzr::user",
        }
    }
}

/// A language-level error, catchable by `try`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub message: String,
    /// Rendered call of the logical frame the condition is attributed to.
    pub call: Option<String>,
}

impl Condition {
    pub fn new(kind: ConditionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            call: None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.call {
            Some(call) => write!(f, "Error in {} : {}", call, self.message),
            None => write!(f, "Error: {}", self.message),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("{0}")]
    Condition(Box<Condition>),
    /// Raised while an eager-only call record is active; always recovered by the optimizer.
    #[error("eager evaluation aborted")]
    CannotOptimize,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("evaluation interrupted")]
    Interrupted,
    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn condition(kind: ConditionKind, message: impl Into<String>) -> Self {
        Error::Condition(Box::new(Condition::new(kind, message)))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Attributes a condition to `call` unless it already carries a call.
    pub fn with_call(self, call: impl FnOnce() -> Option<String>) -> Self {
        match self {
            Error::Condition(mut condition) => {
                if condition.call.is_none() {
                    condition.call = call();
                }
                Error::Condition(condition)
            }
            other => other,
        }
    }

    pub fn as_condition(&self) -> Option<&Condition> {
        match self {
            Error::Condition(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ConditionKind> {
        self.as_condition().map(|c| c.kind)
    }

    /// Whether user-level handlers such as `try` may intercept this error.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Error::Condition(_) | Error::Generic(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Condition(condition) => condition.kind.code(),
            Error::CannotOptimize => "lzr::cannot_optimize",
            Error::Internal(_) => "lzr::internal",
            Error::Interrupted => "lzr::interrupted",
            Error::Generic(_) => "lzr::generic",
        }
    }
}

impl miette::Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(Error::code(self)))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }
}

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Generic(e.to_string())
    }
}

impl From<Condition> for Error {
    fn from(condition: Condition) -> Self {
        Error::Condition(Box::new(condition))
    }
}
