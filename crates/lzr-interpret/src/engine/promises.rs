use super::*;

impl Interpreter {
    /// Value of a promise, evaluating it at most once.
    ///
    /// A promise forced while it is already under evaluation yields the
    /// missing marker unless `strict_promise_cycles` is set. A failed or
    /// interrupted evaluation leaves the promise unevaluated so it can be
    /// forced again.
    pub(crate) fn force(&mut self, promise: &Rc<Promise>, caller: &Rc<Caller>) -> EvalResult {
        match promise.state() {
            PromiseState::Evaluated => {
                return match promise.value() {
                    Some(value) => Ok(value),
                    None => internal_bail!("evaluated promise without a value"),
                }
            }
            PromiseState::UnderEvaluation => {
                if self.options.strict_promise_cycles {
                    return Err(condition(
                        ConditionKind::CyclicPromise,
                        "promise already under evaluation: recursive default argument reference or earlier problems?",
                    )
                    .with_call(|| Self::error_call(caller))
                    .into());
                }
                trace!(expr = %promise.expr(), "promise forced during its own evaluation");
                return Ok(Value::Missing);
            }
            PromiseState::Unevaluated => {}
        }

        if let Some(value) = self.take_eager_value(promise) {
            return Ok(value);
        }
        if caller.eager_only() {
            return Err(Error::CannotOptimize.into());
        }
        self.check_interrupt()?;

        let Some(env) = promise.env() else {
            internal_bail!("unevaluated promise without an environment");
        };
        promise.begin_evaluation()?;
        let id = self.next_caller_id();
        let logical = promise.caller();
        let wrapper = Caller::promise(id, caller, logical.as_ref());
        let expr = promise.expr().clone();
        match self.eval(&expr, env, &wrapper) {
            Ok(value) => {
                sharing::share(&value);
                promise.fulfil(value.clone());
                self.stats.promises_forced += 1;
                Ok(value)
            }
            Err(flow) => {
                promise.reset();
                Err(flow)
            }
        }
    }
}
