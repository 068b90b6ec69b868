use super::*;
use itertools::Itertools;
use lzr_core::error::Condition;

/// A supplied argument before promise creation.
enum Pending<'a> {
    /// Expression of the call's argument at `arg_index`.
    Expr { arg_index: usize, expr: &'a Expr },
    /// Already a value: the missing marker, or an entry forwarded from `...`.
    Value(Value),
}

impl Interpreter {
    /// Supplied arguments of a closure call: `...` expanded, names matched to
    /// the formals, then a promise per expression argument. Arguments that are
    /// both side-effect free and always forced by the callee are evaluated
    /// right away.
    pub(super) fn closure_args(
        &mut self,
        closure: &Rc<Closure>,
        expr: &Expr,
        call: &ExprCall,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult<(SuppliedArgs, MatchPermutation)> {
        let (names, pending) = self.expand_args(&call.args, env, caller)?;
        let signature = ArgumentsSignature::supplied(names.clone());
        let permutation = match_arguments(
            &closure.def.signature,
            &signature,
            self.options.partial_matching,
        )
        .map_err(|err| self.match_error(err, &signature, &pending_labels(&pending), expr))?;

        let eager_enabled = self.options.eager_promises && call.site.eager.is_valid();
        let simple = eager_enabled.then(|| {
            call.site
                .simple_args
                .get_or_init(|| {
                    call.args
                        .iter()
                        .map(|arg| eligibility::is_simple(&arg.value, &self.intrinsics))
                        .collect()
                })
                .clone()
        });
        let forced = eager_enabled.then(|| eligibility::always_forced(&closure.def, &self.intrinsics));

        let mut values = Vec::with_capacity(pending.len());
        for (index, item) in pending.into_iter().enumerate() {
            let value = match item {
                Pending::Value(value) => value,
                Pending::Expr { expr, .. } if is_constant(expr) => constant_promise(expr),
                Pending::Expr { arg_index, expr } => {
                    let eager = match (&simple, &forced, permutation.formal_of(index)) {
                        (Some(simple), Some(forced), Some(formal)) => {
                            simple[arg_index] && forced[formal] && call.site.eager.is_valid()
                        }
                        _ => false,
                    };
                    let promise = if eager {
                        self.eager_promise(expr, env, caller, &call.site.eager)?
                    } else {
                        Promise::new(expr.clone(), env, PromiseOrigin::Supplied, caller)
                    };
                    Value::Promise(promise)
                }
            };
            values.push(value);
        }
        Ok((SuppliedArgs { signature, values }, permutation))
    }

    fn expand_args<'a>(
        &mut self,
        args: &'a [CallArg],
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult<(Vec<Option<Symbol>>, Vec<Pending<'a>>)> {
        let mut names = Vec::with_capacity(args.len());
        let mut pending = Vec::with_capacity(args.len());
        for (arg_index, arg) in args.iter().enumerate() {
            match &arg.value.kind {
                ExprKind::Symbol(name) if name.is_varargs() => {
                    match self.heap.lookup(env, name)? {
                        Some((_, Value::Dots(dots))) => {
                            names.extend(dots.names.iter().cloned());
                            pending.extend(dots.values.iter().cloned().map(Pending::Value));
                        }
                        // an unfilled `...` formal
                        Some((_, Value::Missing)) => {}
                        _ => {
                            return Err(invalid_argument("'...' used in an incorrect context")
                                .with_call(|| Self::error_call(caller))
                                .into())
                        }
                    }
                }
                ExprKind::Empty => {
                    names.push(arg.name.clone());
                    pending.push(Pending::Value(Value::Missing));
                }
                _ => {
                    names.push(arg.name.clone());
                    pending.push(Pending::Expr {
                        arg_index,
                        expr: &arg.value,
                    });
                }
            }
        }
        Ok((names, pending))
    }

    /// Matches already built supplied arguments, as for dispatch and `apply`.
    pub(super) fn match_supplied(
        &self,
        def: &FunctionDef,
        supplied: &SuppliedArgs,
        call: &Expr,
    ) -> EvalResult<MatchPermutation> {
        match_arguments(&def.signature, &supplied.signature, self.options.partial_matching).map_err(
            |err| {
                let labels = supplied.values.iter().map(value_label).collect_vec();
                self.match_error(err, &supplied.signature, &labels, call)
            },
        )
    }

    fn match_error(
        &self,
        err: MatchError,
        supplied: &ArgumentsSignature,
        labels: &[String],
        call: &Expr,
    ) -> Flow {
        let (kind, message) = match &err {
            MatchError::TooManyPositional(unused) | MatchError::Unused(unused) => {
                let kind = match err {
                    MatchError::TooManyPositional(_) => ConditionKind::Arity,
                    _ => ConditionKind::UnusedArgument,
                };
                let rendered = unused
                    .iter()
                    .map(|&i| {
                        let label = labels.get(i).cloned().unwrap_or_default();
                        match supplied.name(i).filter(|n| !n.is_empty()) {
                            Some(name) => format!("{} = {}", name, label),
                            None => label,
                        }
                    })
                    .join(", ");
                let noun = if unused.len() == 1 { "argument" } else { "arguments" };
                (kind, format!("unused {} ({})", noun, rendered))
            }
            MatchError::FormalMatchedMultiple(_) | MatchError::AmbiguousPartialMatch(_) => {
                (ConditionKind::AmbiguousNameMatch, err.to_string())
            }
        };
        debug!(call = %call, %message, "argument matching failed");
        let mut condition = Condition::new(kind, message);
        condition.call = Some(call.to_string());
        Flow::Error(condition.into())
    }

    /// Allocates the frame of a closure call and binds every formal: matched
    /// arguments, default promises, the missing marker or the `...` list.
    pub(super) fn enter_frame(
        &mut self,
        closure: &Rc<Closure>,
        call: &Expr,
        supplied: SuppliedArgs,
        permutation: &MatchPermutation,
        caller: &Rc<Caller>,
        dispatch: Option<Rc<DispatchContext>>,
    ) -> EvalResult<(EnvId, Rc<Caller>)> {
        if caller.depth() >= self.options.max_depth {
            return Err(condition(
                ConditionKind::RecursionLimit,
                "evaluation nested too deeply: infinite recursion / options(expressions=)?",
            )
            .with_call(|| Some(call.to_string()))
            .into());
        }
        let env = self.heap.alloc(Some(closure.env), None);
        let supplied = Rc::new(supplied);
        let id = self.next_caller_id();
        let record = Caller::function(
            id,
            caller,
            call.clone(),
            env,
            Value::Closure(closure.clone()),
            supplied.clone(),
            dispatch.clone(),
        );

        let def = &closure.def;
        for (index, formal) in def.formals.iter().enumerate() {
            let slot = permutation.slots.get(index).unwrap_or(&FormalSlot::Unfilled);
            let value = match slot {
                FormalSlot::Varargs(indices) => Value::dots(DotArgs {
                    names: indices
                        .iter()
                        .map(|&i| supplied.signature.name(i).cloned())
                        .collect(),
                    values: indices.iter().map(|&i| supplied.values[i].clone()).collect(),
                }),
                FormalSlot::Supplied(i) if !supplied.values[*i].is_missing() => {
                    supplied.values[*i].clone()
                }
                _ => match &formal.default {
                    Some(default) => match &default.kind {
                        ExprKind::Constant(value) => Value::Promise(Promise::evaluated(
                            default.clone(),
                            value.clone(),
                            PromiseOrigin::Default,
                        )),
                        _ => Value::Promise(Promise::new(
                            default.clone(),
                            env,
                            PromiseOrigin::Default,
                            &record,
                        )),
                    },
                    None => Value::Missing,
                },
            };
            self.heap.define(env, formal.name.clone(), value)?;
        }

        if let Some(context) = &dispatch {
            self.heap
                .define(env, Symbol::new(".Generic"), Value::string(&context.generic))?;
            let classes: Vec<&str> = context
                .classes
                .iter()
                .skip(context.position)
                .map(Symbol::as_str)
                .collect();
            self.heap
                .define(env, Symbol::new(".Class"), Value::strings(&classes))?;
        }
        trace!(call = %call, env = %env, "entered closure frame");
        Ok((env, record))
    }

    /// Runs the closure body in a freshly built frame. A `return()` aimed at
    /// that frame ends the call with its value.
    pub(super) fn apply_closure(
        &mut self,
        closure: &Rc<Closure>,
        call: &Expr,
        supplied: SuppliedArgs,
        permutation: &MatchPermutation,
        caller: &Rc<Caller>,
        dispatch: Option<Rc<DispatchContext>>,
    ) -> EvalResult {
        let (env, record) =
            self.enter_frame(closure, call, supplied, permutation, caller, dispatch)?;
        let body = closure.def.body.clone();
        match self.eval(&body, env, &record) {
            Err(Flow::Return { env: target, value }) if target == env => Ok(value),
            other => other,
        }
    }

    /// Calls a closure with supplied arguments that are already promises or
    /// values, re-matching them against its formals.
    pub(crate) fn invoke_closure(
        &mut self,
        closure: &Rc<Closure>,
        call: &Expr,
        supplied: SuppliedArgs,
        caller: &Rc<Caller>,
        dispatch: Option<Rc<DispatchContext>>,
    ) -> EvalResult {
        if caller.eager_only() {
            return Err(Error::CannotOptimize.into());
        }
        let permutation = self.match_supplied(&closure.def, &supplied, call)?;
        self.apply_closure(closure, call, supplied, &permutation, caller, dispatch)
    }
}

fn is_constant(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Constant(_))
}

/// Constants need no environment; their promise starts out evaluated.
fn constant_promise(expr: &Expr) -> Value {
    let value = match &expr.kind {
        ExprKind::Constant(value) => value.clone(),
        _ => Value::Null,
    };
    Value::Promise(Promise::evaluated(expr.clone(), value, PromiseOrigin::Supplied))
}

fn pending_labels(pending: &[Pending<'_>]) -> Vec<String> {
    pending
        .iter()
        .map(|item| match item {
            Pending::Expr { expr, .. } => expr.to_string(),
            Pending::Value(value) => value_label(value),
        })
        .collect()
}

/// How an argument is shown in matching errors: its source text when known.
fn value_label(value: &Value) -> String {
    match value {
        Value::Promise(promise) => promise.expr().to_string(),
        other => other.to_string(),
    }
}
