//! Control flow, conditions and call-stack inspection.

use lzr_core::ast::ExprKind;
use lzr_core::diagnostics::Diagnostic;
use lzr_core::error::{Condition, ConditionKind, Error};
use lzr_core::value::{Symbol, Value, Vector, VectorData};

use super::{IntrinsicFunction, SpecialCall};
use crate::condition_bail;
use crate::engine::{EvalResult, Flow, Interpreter};

/// Elements of every argument, rendered without quotes.
fn render_elements(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| match value {
            Value::Vector(vector) => vector.format_elements(),
            Value::Null => Vec::new(),
            other => vec![other.to_string()],
        })
        .collect()
}

// ===== OUTPUT AND CONDITIONS =====

/// cat(..., sep = " ")
pub fn intrinsic_cat() -> IntrinsicFunction {
    IntrinsicFunction::strict("cat", |interp, args| {
        let sep = args
            .arg("sep", usize::MAX)
            .and_then(Value::as_symbol)
            .unwrap_or_else(|| Symbol::new(" "));
        let values: Vec<Value> = args.rest(&["sep"]).into_iter().map(|(_, v)| v).collect();
        let text = render_elements(&values).join(sep.as_str());
        interp.write_output(&text);
        Ok(Value::Null)
    })
}

/// stop(...) - raises a condition attributed to the function calling `stop`
pub fn intrinsic_stop() -> IntrinsicFunction {
    IntrinsicFunction::strict("stop", |_interp, args| {
        let message = render_elements(&args.values).concat();
        let mut condition = Condition::new(ConditionKind::User, message);
        condition.call = Interpreter::error_call(&args.caller);
        Err(Error::from(condition).into())
    })
}

/// warning(...) - records a warning and returns its message
pub fn intrinsic_warning() -> IntrinsicFunction {
    IntrinsicFunction::strict("warning", |interp, args| {
        let message = render_elements(&args.values).concat();
        let call = Interpreter::error_call(&args.caller);
        interp.warning(message.clone(), call);
        Ok(Value::string(&message))
    })
}

/// try(expr, silent = FALSE) - catches language-level conditions
pub fn intrinsic_try() -> IntrinsicFunction {
    IntrinsicFunction::special("try", |interp, call| {
        let Some(expr) = call.arg("expr", 0) else {
            return Ok(Value::Null);
        };
        let silent = match call.arg("silent", 1) {
            Some(silent) => {
                let silent = interp.eval(silent, call.env, call.caller)?;
                silent.as_f64().is_some_and(|v| v != 0.0)
            }
            None => false,
        };
        match interp.eval(expr, call.env, call.caller) {
            Err(Flow::Error(error)) if error.is_catchable() => {
                lzr_core::debug!(%error, "condition caught by try");
                if !silent {
                    interp.diagnostics().add_diagnostic(
                        Diagnostic::error(error.to_string()).with_code(error.code()),
                    );
                }
                let vector = Vector::new(VectorData::Character(vec![Symbol::from(format!(
                    "{}\n",
                    error
                ))]));
                vector.set_attribute(Symbol::new("class"), Some(Value::string("try-error")))?;
                Ok(Value::Vector(vector))
            }
            other => other,
        }
    })
}

/// return(value) - leaves the function whose frame the call is evaluated in
pub fn intrinsic_return() -> IntrinsicFunction {
    IntrinsicFunction::special("return", |interp, call| {
        let value = match call.arg("value", 0) {
            Some(expr) => interp.eval(expr, call.env, call.caller)?,
            None => Value::Null,
        };
        Err(Flow::Return {
            env: call.env,
            value,
        })
    })
}

// ===== IDENTITY =====

/// force(x) - forces the promise bound to `x`
pub fn intrinsic_force() -> IntrinsicFunction {
    IntrinsicFunction::strict("force", |_interp, args| {
        Ok(args.arg("x", 0).cloned().unwrap_or(Value::Null))
    })
    .pure()
}

pub fn intrinsic_identity() -> IntrinsicFunction {
    IntrinsicFunction::strict("identity", |_interp, args| {
        Ok(args.arg("x", 0).cloned().unwrap_or(Value::Null))
    })
    .pure()
}

pub fn intrinsic_invisible() -> IntrinsicFunction {
    IntrinsicFunction::strict("invisible", |_interp, args| {
        Ok(args.arg("x", 0).cloned().unwrap_or(Value::Null))
    })
    .pure()
}

// ===== CALL STACK =====

/// missing(x) - whether formal `x` of the current function was left unsupplied
pub fn intrinsic_missing() -> IntrinsicFunction {
    IntrinsicFunction::special("missing", |interp, call| {
        let name = match call.arg("x", 0).map(|e| &e.kind) {
            Some(ExprKind::Symbol(name)) => Some(name.clone()),
            Some(ExprKind::Constant(value)) => value.as_symbol(),
            _ => None,
        };
        let Some(name) = name else {
            condition_bail!(InvalidArgument, "invalid use of 'missing'");
        };
        let missing = interp.is_missing_argument(&name, call.env)?;
        Ok(Value::logical(missing))
    })
}

fn ensure_not_eager(call: &SpecialCall<'_>) -> EvalResult<()> {
    if call.caller.eager_only() {
        return Err(Error::CannotOptimize.into());
    }
    Ok(())
}

/// sys.call() - the call of the current function
pub fn intrinsic_sys_call() -> IntrinsicFunction {
    IntrinsicFunction::special("sys.call", |_interp, call| {
        ensure_not_eager(call)?;
        Ok(call
            .caller
            .logical_function()
            .and_then(|frame| frame.call().cloned())
            .map(Value::Language)
            .unwrap_or(Value::Null))
    })
}

/// sys.function() - the current function
pub fn intrinsic_sys_function() -> IntrinsicFunction {
    IntrinsicFunction::special("sys.function", |_interp, call| {
        ensure_not_eager(call)?;
        Ok(call
            .caller
            .logical_function()
            .and_then(|frame| frame.function_value().cloned())
            .unwrap_or(Value::Null))
    })
}

/// parent.frame() - environment the current function was called from
pub fn intrinsic_parent_frame() -> IntrinsicFunction {
    IntrinsicFunction::special("parent.frame", |interp, call| {
        ensure_not_eager(call)?;
        let env = call
            .caller
            .logical_function()
            .and_then(|frame| frame.logical_parent())
            .and_then(|parent| parent.env())
            .unwrap_or_else(|| interp.global_env());
        Ok(Value::Env(env))
    })
}

/// environment(fun = NULL) - a closure's environment, or the current one
pub fn intrinsic_environment() -> IntrinsicFunction {
    IntrinsicFunction::special("environment", |interp, call| {
        let Some(expr) = call.arg("fun", 0) else {
            return Ok(Value::Env(call.env));
        };
        match interp.eval(expr, call.env, call.caller)? {
            Value::Closure(closure) => Ok(Value::Env(closure.env)),
            Value::Null => Ok(Value::Env(call.env)),
            _ => Ok(Value::Null),
        }
    })
}
