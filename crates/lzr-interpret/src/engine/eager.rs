use super::*;

impl Interpreter {
    /// Evaluates a supplied argument at the call site when that is
    /// indistinguishable from forcing it later. Falls back to a lazy promise
    /// whenever the evaluation would need anything beyond pure operations on
    /// already available values.
    pub(super) fn eager_promise(
        &mut self,
        expr: &Expr,
        env: EnvId,
        caller: &Rc<Caller>,
        assumption: &Rc<Assumption>,
    ) -> EvalResult<Rc<Promise>> {
        let snapshot = self.heap.version_snapshot(env)?;
        let previous = caller.set_eager_only(true);
        let result = self.eval(expr, env, caller);
        caller.set_eager_only(previous);

        match result {
            Ok(value) => {
                self.stats.eager_promises_created += 1;
                trace!(expr = %expr, "argument evaluated eagerly");
                let eager = EagerValue::new(value, assumption.clone(), snapshot);
                Ok(Promise::with_eager(expr.clone(), env, caller, eager))
            }
            Err(Flow::Error(Error::CannotOptimize)) => {
                if previous {
                    // an enclosing eager evaluation has to give up too
                    return Err(Error::CannotOptimize.into());
                }
                if assumption.invalidate() {
                    debug!(expr = %expr, "call site falls back to lazy arguments");
                }
                self.stats.eager_aborts += 1;
                Ok(Promise::new(expr.clone(), env, PromiseOrigin::Supplied, caller))
            }
            Err(Flow::Error(error)) if error.is_catchable() => {
                // raised again, at the right time, when the promise is forced
                debug!(expr = %expr, %error, "eager evaluation failed");
                self.stats.eager_aborts += 1;
                Ok(Promise::new(expr.clone(), env, PromiseOrigin::Supplied, caller))
            }
            Err(flow) => Err(flow),
        }
    }

    /// The precomputed value of an eager promise, if it is still valid. An
    /// invalid one is deoptimized and invalidates its call site.
    pub(super) fn take_eager_value(&mut self, promise: &Rc<Promise>) -> Option<Value> {
        let eager = promise.eager()?;
        if eager.is_deoptimized() {
            return None;
        }
        if eager.assumption.is_valid() && self.heap.snapshot_is_current(&eager.snapshot) {
            let value = eager.value.clone();
            sharing::share(&value);
            promise.fulfil(value.clone());
            self.stats.eager_hits += 1;
            self.stats.promises_forced += 1;
            return Some(value);
        }
        eager.deoptimize();
        if eager.assumption.invalidate() {
            debug!(expr = %promise.expr(), "eager argument invalidated");
        }
        self.stats.eager_deopts += 1;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lzr_core::ast::build::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stack_inspection_gives_up_and_invalidates_the_site() -> Result<()> {
        let mut interp = Interpreter::new(InterpreterOptions::default());
        let caller = interp.top_level_caller();
        let assumption = Assumption::new();
        let global = interp.global_env();

        let promise = interp
            .eager_promise(&call_pos("sys.call", vec![]), global, &caller, &assumption)
            .map_err(Flow::into_error)?;
        assert!(promise.eager().is_none());
        assert!(!assumption.is_valid());
        assert!(!caller.eager_only());
        assert_eq!(interp.stats().eager_aborts, 1);
        Ok(())
    }

    #[test]
    fn pure_arithmetic_is_kept_with_its_snapshot() -> Result<()> {
        let mut interp = Interpreter::new(InterpreterOptions::default());
        interp.define_global("x", Value::double(2.0))?;
        let caller = interp.top_level_caller();
        let assumption = Assumption::new();
        let global = interp.global_env();

        let promise = interp
            .eager_promise(&binary("*", sym("x"), num(3.0)), global, &caller, &assumption)
            .map_err(Flow::into_error)?;
        assert!(promise.eager().is_some());
        assert_eq!(interp.take_eager_value(&promise), Some(Value::double(6.0)));
        assert!(assumption.is_valid());
        Ok(())
    }
}
