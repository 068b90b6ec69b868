use super::*;

impl Interpreter {
    /// `missing(name)` for a binding in `env`: true when the argument was not
    /// supplied, or was supplied as a bare variable that is itself missing in
    /// the caller.
    pub(crate) fn is_missing_argument(&mut self, name: &Symbol, env: EnvId) -> EvalResult<bool> {
        let Some(binding) = self.heap.get_local(env, name)? else {
            return Err(invalid_argument("'missing' can only be used for arguments").into());
        };
        self.binding_is_missing(&binding, 0)
    }

    fn binding_is_missing(&mut self, binding: &Value, level: usize) -> EvalResult<bool> {
        let promise = match binding {
            Value::Missing => return Ok(true),
            Value::Dots(dots) => return Ok(dots.is_empty()),
            Value::Promise(promise) => promise,
            _ => return Ok(false),
        };
        if level == 0 && promise.origin() == PromiseOrigin::Default {
            return Ok(true);
        }
        match promise.state() {
            PromiseState::Evaluated => return Ok(false),
            PromiseState::UnderEvaluation => return Ok(true),
            PromiseState::Unevaluated => {}
        }
        if let Some(eager) = promise.eager().filter(|e| !e.is_deoptimized()) {
            return Ok(eager.value.is_missing());
        }
        let (ExprKind::Symbol(name), Some(env)) = (&promise.expr().kind, promise.env()) else {
            return Ok(false);
        };
        let Some(inner) = self.heap.get_local(env, name)? else {
            return Ok(false);
        };
        // marks the promise so a binding cycle answers true instead of looping
        promise.begin_evaluation()?;
        let result = self.binding_is_missing(&inner, level + 1);
        promise.reset();
        result
    }
}
