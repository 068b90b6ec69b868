use super::*;
use lzr_core::value::VectorData;

impl Interpreter {
    pub(crate) fn eval(&mut self, expr: &Expr, env: EnvId, caller: &Rc<Caller>) -> EvalResult {
        match &expr.kind {
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Symbol(name) => self.read_variable(name, env, caller),
            ExprKind::Empty => Ok(Value::Missing),
            ExprKind::Call(call) => self.eval_call(expr, call, env, caller),
            ExprKind::Function(def) => Ok(Value::Closure(Rc::new(Closure {
                def: def.clone(),
                env,
            }))),
            ExprKind::Block(exprs) => {
                let mut last = Value::Null;
                for expr in exprs {
                    last = self.eval(expr, env, caller)?;
                }
                Ok(last)
            }
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                let test = self.eval(cond, env, caller)?;
                if self.truthy(&test, caller)? {
                    self.eval(then, env, caller)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise, env, caller)
                } else {
                    Ok(Value::Null)
                }
            }
            ExprKind::Assign {
                target,
                value,
                superassign,
            } => {
                let value = self.eval(value, env, caller)?;
                self.assign(target, value.clone(), env, caller, *superassign)?;
                Ok(value)
            }
        }
    }

    fn truthy(&self, value: &Value, caller: &Rc<Caller>) -> EvalResult<bool> {
        let fail = |message: &str| -> Flow {
            invalid_argument(message)
                .with_call(|| Self::error_call(caller))
                .into()
        };
        let Some(vector) = value.as_vector() else {
            return Err(fail("argument is of length zero"));
        };
        let data = vector.data();
        if data.is_empty() {
            return Err(fail("argument is of length zero"));
        }
        match &*data {
            VectorData::Logical(v) => Ok(v[0]),
            VectorData::Integer(v) => Ok(v[0] != 0),
            VectorData::Double(v) if v[0].is_nan() => {
                Err(fail("missing value where TRUE/FALSE needed"))
            }
            VectorData::Double(v) => Ok(v[0] != 0.0),
            _ => Err(fail("argument is not interpretable as logical")),
        }
    }

    fn eval_call(
        &mut self,
        expr: &Expr,
        call: &ExprCall,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult {
        self.check_interrupt()?;
        let function = match &call.function.kind {
            ExprKind::Symbol(name) => self.lookup_function(name, env, caller)?,
            _ => {
                let function = self.eval(&call.function, env, caller)?;
                if !function.is_function() {
                    return Err(invalid_argument("attempt to apply non-function")
                        .with_call(|| Self::error_call(caller))
                        .into());
                }
                function
            }
        };
        match &function {
            Value::Closure(closure) => {
                if caller.eager_only() {
                    return Err(Error::CannotOptimize.into());
                }
                let (supplied, permutation) = self.closure_args(closure, expr, call, env, caller)?;
                self.apply_closure(closure, expr, supplied, &permutation, caller, None)
            }
            Value::Builtin(builtin) => self.call_builtin(builtin, expr, call, env, caller),
            _ => internal_bail!("non-function reached call dispatch"),
        }
    }

    /// Calls any function with already evaluated arguments.
    pub(crate) fn apply_values(
        &mut self,
        function: &Value,
        call: &Expr,
        names: Vec<Option<Symbol>>,
        values: Vec<Value>,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult {
        match function {
            Value::Closure(closure) => {
                let supplied = SuppliedArgs::new(names, values);
                self.invoke_closure(closure, call, supplied, caller, None)
            }
            Value::Builtin(builtin) => {
                let function = self.intrinsic(builtin)?;
                match function.kind {
                    IntrinsicKind::Strict(_) => {
                        self.invoke_strict(&function, call, names, values, env, caller, true)
                    }
                    IntrinsicKind::Special(_) => Err(invalid_argument(format!(
                        "'{}' cannot be applied to evaluated arguments",
                        function.name
                    ))
                    .into()),
                }
            }
            other => Err(invalid_argument(format!(
                "attempt to apply non-function of type '{}'",
                other.type_name()
            ))
            .into()),
        }
    }

    fn assign(
        &mut self,
        target: &Expr,
        value: Value,
        env: EnvId,
        caller: &Rc<Caller>,
        superassign: bool,
    ) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Symbol(name) => Ok(self.assign_variable(name, value, env, superassign)?),
            ExprKind::Call(call) => self.assign_replacement(call, value, env, caller, superassign),
            _ => Err(invalid_argument("invalid assignment target")
                .with_call(|| Self::error_call(caller))
                .into()),
        }
    }

    /// `f(x, extra) <- value` is `x <- "f<-"(x, extra, value = value)`, applied
    /// recursively when `x` is itself a call.
    fn assign_replacement(
        &mut self,
        call: &ExprCall,
        value: Value,
        env: EnvId,
        caller: &Rc<Caller>,
        superassign: bool,
    ) -> EvalResult<()> {
        let (Some(name), Some(first)) = (call.function_name(), call.args.first()) else {
            return Err(invalid_argument("invalid function in complex assignment")
                .with_call(|| Self::error_call(caller))
                .into());
        };
        let current = self.replacement_target(&first.value, env, caller, superassign)?;

        let mut names = vec![None];
        let mut values = vec![current];
        for arg in &call.args[1..] {
            names.push(arg.name.clone());
            values.push(self.eval(&arg.value, env, caller)?);
        }
        names.push(Some(Symbol::new("value")));
        values.push(value);

        let replacement = Symbol::from(format!("{}<-", name));
        let function = self.lookup_function(&replacement, env, caller)?;
        let setter_call = lzr_core::ast::build::call(&replacement, Vec::new());
        let updated = match &function {
            Value::Builtin(builtin) => {
                let intrinsic = self.intrinsic(builtin)?;
                self.invoke_strict(&intrinsic, &setter_call, names, values, env, caller, false)?
            }
            _ => self.apply_values(&function, &setter_call, names, values, env, caller)?,
        };

        match &first.value.kind {
            ExprKind::Symbol(target) => Ok(self.assign_variable(target, updated, env, superassign)?),
            ExprKind::Call(inner) => self.assign_replacement(inner, updated, env, caller, superassign),
            _ => Err(invalid_argument("invalid assignment target")
                .with_call(|| Self::error_call(caller))
                .into()),
        }
    }

    /// Current value of the object a replacement writes into.
    fn replacement_target(
        &mut self,
        expr: &Expr,
        env: EnvId,
        caller: &Rc<Caller>,
        superassign: bool,
    ) -> EvalResult {
        let ExprKind::Symbol(name) = &expr.kind else {
            return self.eval(expr, env, caller);
        };
        let start = if superassign {
            self.heap.parent(env)?.unwrap_or(env)
        } else {
            env
        };
        let Some((found_in, binding)) = self.heap.lookup(start, name)? else {
            return Err(object_not_found(name)
                .with_call(|| Self::error_call(caller))
                .into());
        };
        let value = self.resolve_binding(name, binding, caller)?;
        if found_in != start {
            // the local binding about to be made is a second owner
            sharing::share(&value);
        }
        Ok(value)
    }
}
