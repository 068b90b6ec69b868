//! Static checks deciding which arguments may be evaluated eagerly.

use std::rc::Rc;

use lzr_core::ast::{Expr, ExprKind, FunctionDef};
use lzr_core::value::Symbol;

use crate::intrinsics::IntrinsicsRegistry;

/// Whether evaluating `expr` can have no effect other than producing a value:
/// constants, plain variable reads and calls to pure builtins over such.
///
/// Whether the names involved are actually bound to what they appear to be is
/// checked at run time; this only rules out expressions that are never safe.
pub fn is_simple(expr: &Expr, registry: &IntrinsicsRegistry) -> bool {
    match &expr.kind {
        ExprKind::Constant(_) => true,
        ExprKind::Symbol(name) => !name.is_varargs() && !name.is_dot_index(),
        ExprKind::Call(call) => {
            let Some(name) = call.function_name() else {
                return false;
            };
            registry.is_pure(name)
                && call
                    .args
                    .iter()
                    .all(|arg| !matches!(arg.value.kind, ExprKind::Empty) && is_simple(&arg.value, registry))
        }
        _ => false,
    }
}

/// For each formal of `def`, whether every execution of the body forces it.
///
/// Only the unconditional prefix of the body is inspected: statements of a
/// top-level block and the condition of an `if` are walked in order until
/// something that may exit early, or call arbitrary code, is reached.
pub fn always_forced(def: &FunctionDef, registry: &IntrinsicsRegistry) -> Rc<[bool]> {
    def.forced
        .get_or_init(|| {
            let mut walker = ForcedWalker {
                formals: def.formals.iter().map(|f| f.name.clone()).collect(),
                forced: vec![false; def.formals.len()],
                registry,
            };
            walker.walk(&def.body);
            walker.forced.into()
        })
        .clone()
}

struct ForcedWalker<'a> {
    formals: Vec<Symbol>,
    forced: Vec<bool>,
    registry: &'a IntrinsicsRegistry,
}

impl ForcedWalker<'_> {
    /// Marks what `expr` forces; returns false once later code may not run.
    fn walk(&mut self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Constant(_) | ExprKind::Empty | ExprKind::Function(_) => true,
            ExprKind::Symbol(name) => {
                if let Some(index) = self.formals.iter().position(|f| f == name) {
                    if !name.is_varargs() {
                        self.forced[index] = true;
                    }
                }
                true
            }
            ExprKind::Block(exprs) => exprs.iter().all(|e| self.walk(e)),
            ExprKind::If { cond, .. } => {
                self.walk(cond);
                false
            }
            ExprKind::Assign { target, value, .. } => {
                if !self.walk(value) {
                    return false;
                }
                // rebinding a formal makes later reads see the new value
                if let ExprKind::Symbol(name) = &target.kind {
                    if let Some(index) = self.formals.iter().position(|f| f == name) {
                        self.formals[index] = Symbol::new("");
                    }
                    return true;
                }
                false
            }
            ExprKind::Call(call) => {
                let strict = call
                    .function_name()
                    .is_some_and(|name| self.registry.is_strict(name) && self.registry.is_pure(name));
                if !strict {
                    return false;
                }
                call.args.iter().all(|arg| self.walk(&arg.value))
            }
        }
    }
}
