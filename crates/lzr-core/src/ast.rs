//! Expression tree consumed by the engine, with constructor helpers standing
//! in for a parser.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use itertools::Itertools;

use crate::inline_cache::DispatchCache;
use crate::promise::Assumption;
use crate::signature::ArgumentsSignature;
use crate::value::{Symbol, Value};

pub type Expr = Rc<ExprNode>;

#[derive(Debug)]
pub struct ExprNode {
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Constant(Value),
    Symbol(Symbol),
    /// An empty argument, as in `f(1, , 3)`.
    Empty,
    Call(ExprCall),
    Function(Rc<FunctionDef>),
    Block(Vec<Expr>),
    If {
        cond: Expr,
        then: Expr,
        otherwise: Option<Expr>,
    },
    /// `target <- value` or, with `superassign`, `target <<- value`. The target
    /// is a symbol or a replacement call such as `x[[1]]`.
    Assign {
        target: Expr,
        value: Expr,
        superassign: bool,
    },
}

#[derive(Debug)]
pub struct CallArg {
    pub name: Option<Symbol>,
    pub value: Expr,
}

#[derive(Debug)]
pub struct ExprCall {
    pub function: Expr,
    pub args: Vec<CallArg>,
    pub site: CallSite,
}

impl ExprCall {
    pub fn function_name(&self) -> Option<&Symbol> {
        match &self.function.kind {
            ExprKind::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

/// Runtime state attached to one call expression.
pub struct CallSite {
    /// Shared by every eager promise created here; once invalid the site stays lazy.
    pub eager: Rc<Assumption>,
    /// Per-argument result of the side-effect-freedom check.
    pub simple_args: OnceCell<Rc<[bool]>>,
    pub dispatch: DispatchCache,
}

impl CallSite {
    fn new() -> Self {
        Self {
            eager: Assumption::new(),
            simple_args: OnceCell::new(),
            dispatch: DispatchCache::default(),
        }
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("eager", &self.eager.is_valid())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Formal {
    pub name: Symbol,
    pub default: Option<Expr>,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub formals: Vec<Formal>,
    pub signature: ArgumentsSignature,
    pub body: Expr,
    /// Per-formal "always forced" analysis, computed on first call.
    pub forced: OnceCell<Rc<[bool]>>,
}

impl FunctionDef {
    pub fn formal(&self, index: usize) -> Option<&Formal> {
        self.formals.get(index)
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Constant(value) => write!(f, "{}", value),
            ExprKind::Symbol(name) => write!(f, "{}", name),
            ExprKind::Empty => Ok(()),
            ExprKind::Call(call) => fmt_call(call, f),
            ExprKind::Function(def) => {
                let formals = def.formals.iter().format_with(", ", |formal, g| {
                    match &formal.default {
                        Some(default) => g(&format_args!("{} = {}", formal.name, default)),
                        None => g(&formal.name),
                    }
                });
                write!(f, "function({}) {}", formals, def.body)
            }
            ExprKind::Block(exprs) => write!(f, "{{{}}}", exprs.iter().format("; ")),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                write!(f, "if ({}) {}", cond, then)?;
                if let Some(otherwise) = otherwise {
                    write!(f, " else {}", otherwise)?;
                }
                Ok(())
            }
            ExprKind::Assign {
                target,
                value,
                superassign,
            } => {
                let op = if *superassign { "<<-" } else { "<-" };
                write!(f, "{} {} {}", target, op, value)
            }
        }
    }
}

const BINARY_OPERATORS: &[&str] = &["+", "-", "*", "/", "==", "!=", "<", ">", "<=", ">="];

fn fmt_call(call: &ExprCall, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = call.function_name().map(Symbol::as_str);
    match (name, call.args.as_slice()) {
        (Some(op), [lhs, rhs]) if BINARY_OPERATORS.contains(&op) => {
            write!(f, "{} {} {}", lhs.value, op, rhs.value)
        }
        (Some(op @ ("-" | "!")), [operand]) => write!(f, "{}{}", op, operand.value),
        (Some("[["), [target, rest @ ..]) => {
            write!(f, "{}[[{}]]", target.value, rest.iter().format_with(", ", fmt_arg))
        }
        _ => write!(
            f,
            "{}({})",
            call.function,
            call.args.iter().format_with(", ", fmt_arg)
        ),
    }
}

fn fmt_arg(
    arg: &CallArg,
    g: &mut dyn FnMut(&dyn fmt::Display) -> fmt::Result,
) -> fmt::Result {
    match &arg.name {
        Some(name) => g(&format_args!("{} = {}", name, arg.value)),
        None => g(&arg.value),
    }
}

/// Constructors used in place of a parser.
pub mod build {
    use super::*;
    use crate::error::Result;
    use crate::sharing;

    fn node(kind: ExprKind) -> Expr {
        Rc::new(ExprNode { kind })
    }

    /// A literal; its value is never writable.
    pub fn constant(value: Value) -> Expr {
        sharing::mark_permanent(&value);
        node(ExprKind::Constant(value))
    }

    pub fn num(value: f64) -> Expr {
        constant(Value::double(value))
    }

    pub fn int(value: i64) -> Expr {
        constant(Value::integer(value))
    }

    pub fn lgl(value: bool) -> Expr {
        constant(Value::logical(value))
    }

    pub fn text(value: &str) -> Expr {
        constant(Value::string(value))
    }

    pub fn null() -> Expr {
        constant(Value::Null)
    }

    pub fn sym(name: &str) -> Expr {
        node(ExprKind::Symbol(Symbol::new(name)))
    }

    pub fn empty() -> Expr {
        node(ExprKind::Empty)
    }

    pub fn arg(value: Expr) -> CallArg {
        CallArg { name: None, value }
    }

    pub fn named(name: &str, value: Expr) -> CallArg {
        CallArg {
            name: Some(Symbol::new(name)),
            value,
        }
    }

    pub fn call_expr(function: Expr, args: Vec<CallArg>) -> Expr {
        node(ExprKind::Call(ExprCall {
            function,
            args,
            site: CallSite::new(),
        }))
    }

    pub fn call(name: &str, args: Vec<CallArg>) -> Expr {
        call_expr(sym(name), args)
    }

    /// `name(args...)` with positional arguments only.
    pub fn call_pos(name: &str, args: Vec<Expr>) -> Expr {
        call(name, args.into_iter().map(arg).collect())
    }

    pub fn binary(op: &str, lhs: Expr, rhs: Expr) -> Expr {
        call_pos(op, vec![lhs, rhs])
    }

    pub fn index(target: Expr, index: Expr) -> Expr {
        call_pos("[[", vec![target, index])
    }

    pub fn formal(name: &str) -> Formal {
        Formal {
            name: Symbol::new(name),
            default: None,
        }
    }

    pub fn formal_default(name: &str, default: Expr) -> Formal {
        Formal {
            name: Symbol::new(name),
            default: Some(default),
        }
    }

    pub fn function(formals: Vec<Formal>, body: Expr) -> Result<Expr> {
        let signature =
            ArgumentsSignature::formals(formals.iter().map(|f| f.name.clone()).collect())?;
        Ok(node(ExprKind::Function(Rc::new(FunctionDef {
            formals,
            signature,
            body,
            forced: OnceCell::new(),
        }))))
    }

    pub fn block(exprs: Vec<Expr>) -> Expr {
        node(ExprKind::Block(exprs))
    }

    pub fn if_(cond: Expr, then: Expr, otherwise: Option<Expr>) -> Expr {
        node(ExprKind::If {
            cond,
            then,
            otherwise,
        })
    }

    pub fn assign(name: &str, value: Expr) -> Expr {
        assign_to(sym(name), value)
    }

    pub fn assign_to(target: Expr, value: Expr) -> Expr {
        node(ExprKind::Assign {
            target,
            value,
            superassign: false,
        })
    }

    pub fn super_assign(name: &str, value: Expr) -> Expr {
        node(ExprKind::Assign {
            target: sym(name),
            value,
            superassign: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;

    #[test]
    fn renders_calls_for_messages() {
        let expr = call(
            "f",
            vec![arg(binary("+", sym("x"), num(1.0))), named("y", text("a"))],
        );
        assert_eq!(expr.to_string(), "f(x + 1, y = \"a\")");
        assert_eq!(index(sym("x"), num(2.0)).to_string(), "x[[2]]");
    }
}
