//! Builtin functions of the language.
//!
//! Strict builtins receive evaluated arguments. Special builtins receive the
//! unevaluated call and decide themselves what to evaluate.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use lzr_core::ast::{CallArg, CallSite, Expr};
use lzr_core::caller::Caller;
use lzr_core::env::EnvId;
use lzr_core::value::{Symbol, Value};

use crate::engine::{EvalResult, Interpreter};
use crate::error::missing_argument;

mod arith;
mod lang;
mod objects;
mod vectors;

pub use arith::*;
pub use lang::*;
pub use objects::*;
pub use vectors::*;

// ===== INTRINSIC FUNCTION TYPES =====

pub type StrictFn = fn(&mut Interpreter, &mut BuiltinArgs) -> EvalResult;
pub type SpecialFn = fn(&mut Interpreter, &SpecialCall<'_>) -> EvalResult;

#[derive(Clone, Copy)]
pub enum IntrinsicKind {
    Strict(StrictFn),
    Special(SpecialFn),
}

/// S3 dispatch a builtin performs on its own arguments before running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalDispatch {
    None,
    /// On the first argument, for methods named `name.class`.
    Generic,
    /// On both operands, also trying `Ops.class`.
    Ops,
    /// On the first argument, also trying `Summary.class`.
    Summary,
    /// On the first argument, also trying `Math.class`.
    Math,
}

impl InternalDispatch {
    pub fn group(self) -> Option<&'static str> {
        match self {
            InternalDispatch::Ops => Some("Ops"),
            InternalDispatch::Summary => Some("Summary"),
            InternalDispatch::Math => Some("Math"),
            InternalDispatch::None | InternalDispatch::Generic => None,
        }
    }
}

/// A builtin that can be called during interpretation
#[derive(Clone)]
pub struct IntrinsicFunction {
    pub name: Symbol,
    pub kind: IntrinsicKind,
    pub dispatch: InternalDispatch,
    /// Free of side effects and never calls back into closures.
    pub pure: bool,
}

impl IntrinsicFunction {
    pub fn strict(name: &str, func: StrictFn) -> Self {
        Self {
            name: Symbol::new(name),
            kind: IntrinsicKind::Strict(func),
            dispatch: InternalDispatch::None,
            pure: false,
        }
    }

    pub fn special(name: &str, func: SpecialFn) -> Self {
        Self {
            name: Symbol::new(name),
            kind: IntrinsicKind::Special(func),
            dispatch: InternalDispatch::None,
            pure: false,
        }
    }

    pub fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    pub fn with_dispatch(mut self, dispatch: InternalDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn is_strict(&self) -> bool {
        matches!(self.kind, IntrinsicKind::Strict(_))
    }
}

impl Debug for IntrinsicFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrinsicFunction")
            .field("name", &self.name)
            .field("strict", &self.is_strict())
            .field("dispatch", &self.dispatch)
            .field("pure", &self.pure)
            .finish()
    }
}

/// Evaluated arguments of a strict builtin call.
pub struct BuiltinArgs {
    pub names: Vec<Option<Symbol>>,
    pub values: Vec<Value>,
    pub call: Expr,
    pub env: EnvId,
    pub caller: Rc<Caller>,
}

impl BuiltinArgs {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The argument named `name`, or else the `position`-th unnamed one.
    pub fn arg(&self, name: &str, position: usize) -> Option<&Value> {
        if let Some(index) = self
            .names
            .iter()
            .position(|n| n.as_ref().is_some_and(|n| n.as_str() == name))
        {
            return self.values.get(index).filter(|v| !v.is_missing());
        }
        self.names
            .iter()
            .zip(&self.values)
            .filter(|(n, _)| n.as_ref().map_or(true, |n| n.is_empty()))
            .nth(position)
            .map(|(_, v)| v)
            .filter(|v| !v.is_missing())
    }

    pub fn required(&self, name: &str, position: usize) -> lzr_core::Result<&Value> {
        self.arg(name, position).ok_or_else(|| missing_argument(name))
    }

    /// Arguments whose name is not one of `reserved`, in call order.
    pub fn rest(&self, reserved: &[&str]) -> Vec<(Option<Symbol>, Value)> {
        self.names
            .iter()
            .zip(&self.values)
            .filter(|(n, _)| !n.as_ref().is_some_and(|n| reserved.contains(&n.as_str())))
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect()
    }
}

/// Unevaluated call handed to a special builtin.
pub struct SpecialCall<'a> {
    pub call: &'a Expr,
    pub args: &'a [CallArg],
    pub site: &'a CallSite,
    pub env: EnvId,
    pub caller: &'a Rc<Caller>,
}

impl SpecialCall<'_> {
    /// Expression of the argument named `name`, or else of the
    /// `position`-th unnamed one.
    pub fn arg(&self, name: &str, position: usize) -> Option<&Expr> {
        if let Some(arg) = self
            .args
            .iter()
            .find(|a| a.name.as_ref().is_some_and(|n| n.as_str() == name))
        {
            return Some(&arg.value);
        }
        self.args
            .iter()
            .filter(|a| a.name.is_none())
            .nth(position)
            .map(|a| &a.value)
    }
}

// ===== INTRINSICS REGISTRY =====

/// Registry of builtins, addressed by the index stored in builtin values
pub struct IntrinsicsRegistry {
    functions: Vec<IntrinsicFunction>,
    by_name: HashMap<Symbol, usize>,
}

impl IntrinsicsRegistry {
    /// Create a new intrinsics registry with all standard builtins
    pub fn new() -> Self {
        let mut registry = Self {
            functions: Vec::new(),
            by_name: HashMap::new(),
        };
        registry.register_all_intrinsics();
        registry
    }

    /// Register a builtin, replacing any earlier one of the same name
    pub fn register(&mut self, function: IntrinsicFunction) -> usize {
        if let Some(&id) = self.by_name.get(&function.name) {
            self.functions[id] = function;
            return id;
        }
        let id = self.functions.len();
        self.by_name.insert(function.name.clone(), id);
        self.functions.push(function);
        id
    }

    pub fn get(&self, id: usize) -> Option<&IntrinsicFunction> {
        self.functions.get(id)
    }

    /// Look up a builtin by name
    pub fn lookup(&self, name: &str) -> Option<&IntrinsicFunction> {
        self.by_name.get(name).and_then(|&id| self.functions.get(id))
    }

    pub fn is_pure(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|f| f.pure)
    }

    pub fn is_strict(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(IntrinsicFunction::is_strict)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &IntrinsicFunction)> {
        self.functions.iter().enumerate()
    }

    fn register_all_intrinsics(&mut self) {
        // Construction and access
        self.register(intrinsic_c());
        self.register(intrinsic_list());
        self.register(intrinsic_index());
        self.register(intrinsic_index_assign());
        self.register(intrinsic_length());
        self.register(intrinsic_identical());
        self.register(intrinsic_is_null());

        // Attributes and classes
        self.register(intrinsic_attr());
        self.register(intrinsic_attr_assign());
        self.register(intrinsic_structure());
        self.register(intrinsic_class());
        self.register(intrinsic_old_class());
        self.register(intrinsic_class_assign());
        self.register(intrinsic_unclass());
        self.register(intrinsic_inherits());

        // Arithmetic, comparison and summaries
        for op in ["+", "-", "*", "/"] {
            self.register(intrinsic_arith(op));
        }
        for op in ["==", "!=", "<", ">", "<=", ">="] {
            self.register(intrinsic_compare(op));
        }
        self.register(intrinsic_not());
        for name in ["max", "min", "sum"] {
            self.register(intrinsic_summary(name));
        }
        self.register(intrinsic_abs());

        // Language and conditions
        self.register(intrinsic_cat());
        self.register(intrinsic_stop());
        self.register(intrinsic_warning());
        self.register(intrinsic_try());
        self.register(intrinsic_return());
        self.register(intrinsic_force());
        self.register(intrinsic_identity());
        self.register(intrinsic_invisible());
        self.register(intrinsic_missing());
        self.register(intrinsic_sys_call());
        self.register(intrinsic_sys_function());
        self.register(intrinsic_parent_frame());
        self.register(intrinsic_environment());

        // Method dispatch
        self.register(intrinsic_use_method());
        self.register(intrinsic_next_method());
        self.register(intrinsic_register_s3_method());
        self.register(intrinsic_standard_generic());
        self.register(intrinsic_set_class());
        self.register(intrinsic_set_generic());
        self.register(intrinsic_set_method());
        self.register(intrinsic_new());
    }
}

impl Default for IntrinsicsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
