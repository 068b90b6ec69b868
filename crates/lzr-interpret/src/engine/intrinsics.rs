use super::*;
use crate::intrinsics::{InternalDispatch, SpecialCall};

impl Interpreter {
    pub(crate) fn intrinsic(&self, builtin: &BuiltinRef) -> Result<IntrinsicFunction> {
        match self.intrinsics.get(builtin.id) {
            Some(function) => Ok(function.clone()),
            None => Err(Error::internal(format!("unknown builtin '{}'", builtin.name))),
        }
    }

    pub(super) fn call_builtin(
        &mut self,
        builtin: &BuiltinRef,
        expr: &Expr,
        call: &ExprCall,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult {
        let function = self.intrinsic(builtin)?;
        if caller.eager_only() && !function.pure {
            return Err(Error::CannotOptimize.into());
        }
        match function.kind {
            IntrinsicKind::Special(special) => {
                let args = SpecialCall {
                    call: expr,
                    args: &call.args,
                    site: &call.site,
                    env,
                    caller,
                };
                special(self, &args).map_err(|flow| attribute_error(flow, expr))
            }
            IntrinsicKind::Strict(_) => {
                let (names, values) = self.evaluate_args(&call.args, env, caller)?;
                self.invoke_strict(&function, expr, names, values, env, caller, true)
            }
        }
    }

    /// Evaluates call arguments left to right, expanding `...` and forcing
    /// its promises.
    pub(crate) fn evaluate_args(
        &mut self,
        args: &[CallArg],
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult<(Vec<Option<Symbol>>, Vec<Value>)> {
        let mut names = Vec::with_capacity(args.len());
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match &arg.value.kind {
                ExprKind::Symbol(name) if name.is_varargs() => {
                    let dots = match self.heap.lookup(env, name)? {
                        Some((_, Value::Dots(dots))) => dots,
                        Some((_, Value::Missing)) => continue,
                        _ => {
                            return Err(invalid_argument("'...' used in an incorrect context")
                                .with_call(|| Self::error_call(caller))
                                .into())
                        }
                    };
                    for (name, value) in dots.names.iter().zip(dots.values.iter()) {
                        let value = match value {
                            Value::Promise(promise) => self.force(promise, caller)?,
                            other => other.clone(),
                        };
                        names.push(name.clone());
                        values.push(value);
                    }
                }
                ExprKind::Empty => {
                    names.push(arg.name.clone());
                    values.push(Value::Missing);
                }
                _ => {
                    names.push(arg.name.clone());
                    values.push(self.eval(&arg.value, env, caller)?);
                }
            }
        }
        Ok((names, values))
    }

    /// Runs a strict builtin on evaluated arguments. With `dispatch` set, a
    /// builtin that is internally generic first looks for an S3 method on
    /// classed arguments.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn invoke_strict(
        &mut self,
        function: &IntrinsicFunction,
        call: &Expr,
        names: Vec<Option<Symbol>>,
        values: Vec<Value>,
        env: EnvId,
        caller: &Rc<Caller>,
        dispatch: bool,
    ) -> EvalResult {
        if dispatch && function.dispatch != InternalDispatch::None {
            if let Some(value) =
                self.dispatch_internal(function, call, &names, &values, env, caller)?
            {
                return Ok(value);
            }
        }
        let IntrinsicKind::Strict(strict) = function.kind else {
            internal_bail!("'{}' is not a strict builtin", function.name);
        };
        let id = self.next_caller_id();
        let record = Caller::builtin(id, caller, call.clone(), function.name.clone());
        record.set_eager_only(caller.eager_only());
        let mut args = BuiltinArgs {
            names,
            values,
            call: call.clone(),
            env,
            caller: record,
        };
        strict(self, &mut args).map_err(|flow| attribute_error(flow, call))
    }
}

/// Errors raised inside a builtin belong to the builtin's call unless the
/// builtin already attributed them. User conditions from `stop` belong to the
/// function calling it, which at top level is no call at all.
fn attribute_error(flow: Flow, call: &Expr) -> Flow {
    match flow {
        Flow::Error(error) if error.kind() == Some(ConditionKind::User) => Flow::Error(error),
        Flow::Error(error) => Flow::Error(error.with_call(|| Some(call.to_string()))),
        other => other,
    }
}
