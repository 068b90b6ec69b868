//! Deferred argument values.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use derive_more::Display;

use crate::ast::Expr;
use crate::caller::Caller;
use crate::env::EnvId;
use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PromiseState {
    Unevaluated,
    UnderEvaluation,
    Evaluated,
}

/// Whether a promise wraps a supplied argument or a formal's default expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PromiseOrigin {
    Supplied,
    Default,
}

/// A validity flag shared by every eager promise created at one call site.
/// Once invalidated it never becomes valid again.
#[derive(Debug)]
pub struct Assumption {
    valid: Cell<bool>,
}

impl Assumption {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            valid: Cell::new(true),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Returns whether this call flipped the flag.
    pub fn invalidate(&self) -> bool {
        self.valid.replace(false)
    }
}

/// Value computed ahead of first use, plus what is needed to check it is still
/// the value lazy forcing would produce.
#[derive(Debug)]
pub struct EagerValue {
    pub value: Value,
    pub assumption: Rc<Assumption>,
    /// Mutation versions of the caller's environment chain at evaluation time.
    pub snapshot: Vec<(EnvId, u64)>,
    deoptimized: Cell<bool>,
}

impl EagerValue {
    pub fn new(value: Value, assumption: Rc<Assumption>, snapshot: Vec<(EnvId, u64)>) -> Self {
        Self {
            value,
            assumption,
            snapshot,
            deoptimized: Cell::new(false),
        }
    }

    pub fn is_deoptimized(&self) -> bool {
        self.deoptimized.get()
    }

    pub fn deoptimize(&self) {
        self.deoptimized.set(true);
    }
}

pub struct Promise {
    expr: Expr,
    env: Cell<Option<EnvId>>,
    state: Cell<PromiseState>,
    value: RefCell<Option<Value>>,
    origin: PromiseOrigin,
    caller: Weak<Caller>,
    eager: Option<EagerValue>,
}

impl Promise {
    pub fn new(expr: Expr, env: EnvId, origin: PromiseOrigin, caller: &Rc<Caller>) -> Rc<Self> {
        Rc::new(Self {
            expr,
            env: Cell::new(Some(env)),
            state: Cell::new(PromiseState::Unevaluated),
            value: RefCell::new(None),
            origin,
            caller: Rc::downgrade(caller),
            eager: None,
        })
    }

    /// A promise that starts out evaluated, used for constant arguments and
    /// for values handed to a closure by the engine itself.
    pub fn evaluated(expr: Expr, value: Value, origin: PromiseOrigin) -> Rc<Self> {
        Rc::new(Self {
            expr,
            env: Cell::new(None),
            state: Cell::new(PromiseState::Evaluated),
            value: RefCell::new(Some(value)),
            origin,
            caller: Weak::new(),
            eager: None,
        })
    }

    /// An unevaluated promise carrying a precomputed value. `env` is kept so the
    /// promise can fall back to lazy evaluation.
    pub fn with_eager(expr: Expr, env: EnvId, caller: &Rc<Caller>, eager: EagerValue) -> Rc<Self> {
        Rc::new(Self {
            expr,
            env: Cell::new(Some(env)),
            state: Cell::new(PromiseState::Unevaluated),
            value: RefCell::new(None),
            origin: PromiseOrigin::Supplied,
            caller: Rc::downgrade(caller),
            eager: Some(eager),
        })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Defining environment; released once the promise is evaluated.
    pub fn env(&self) -> Option<EnvId> {
        self.env.get()
    }

    pub fn state(&self) -> PromiseState {
        self.state.get()
    }

    pub fn is_evaluated(&self) -> bool {
        self.state.get() == PromiseState::Evaluated
    }

    pub fn origin(&self) -> PromiseOrigin {
        self.origin
    }

    /// The call record the promise was created under, while that call is live.
    pub fn caller(&self) -> Option<Rc<Caller>> {
        self.caller.upgrade()
    }

    pub fn eager(&self) -> Option<&EagerValue> {
        self.eager.as_ref()
    }

    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    pub fn begin_evaluation(&self) -> Result<()> {
        match self.state.get() {
            PromiseState::Unevaluated => {
                self.state.set(PromiseState::UnderEvaluation);
                Ok(())
            }
            other => Err(Error::internal(format!(
                "cannot start evaluating a promise that is {}",
                other
            ))),
        }
    }

    pub fn fulfil(&self, value: Value) {
        *self.value.borrow_mut() = Some(value);
        self.state.set(PromiseState::Evaluated);
        self.env.set(None);
    }

    /// Back to `Unevaluated` after a failed or probing evaluation.
    pub fn reset(&self) {
        if self.state.get() == PromiseState::UnderEvaluation {
            self.state.set(PromiseState::Unevaluated);
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("expr", &self.expr.to_string())
            .field("state", &self.state.get())
            .field("origin", &self.origin)
            .field("eager", &self.eager.is_some())
            .finish()
    }
}
