use super::*;

impl Interpreter {
    /// Value of `name` as seen from `env`, forcing a promise binding.
    pub(crate) fn read_variable(
        &mut self,
        name: &Symbol,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult {
        if name.is_varargs() {
            return Err(invalid_argument("'...' used in an incorrect context")
                .with_call(|| Self::error_call(caller))
                .into());
        }
        if name.is_dot_index() {
            return self.read_dot_index(name, env, caller);
        }
        let Some((_, value)) = self.heap.lookup(env, name)? else {
            return Err(object_not_found(name)
                .with_call(|| Self::error_call(caller))
                .into());
        };
        self.resolve_binding(name, value, caller)
    }

    pub(super) fn resolve_binding(&mut self, name: &Symbol, value: Value, caller: &Rc<Caller>) -> EvalResult {
        match value {
            Value::Missing => Err(missing_argument(name)
                .with_call(|| Self::error_call(caller))
                .into()),
            Value::Promise(promise) => self.force(&promise, caller),
            Value::Dots(_) => Err(invalid_argument("'...' used in an incorrect context")
                .with_call(|| Self::error_call(caller))
                .into()),
            value => Ok(value),
        }
    }

    /// `..1`, `..2`, ...: elements of the `...` binding.
    fn read_dot_index(&mut self, name: &Symbol, env: EnvId, caller: &Rc<Caller>) -> EvalResult {
        let index: usize = name[2..].parse().unwrap_or(0);
        let dots = match self.heap.lookup(env, "...")? {
            Some((_, Value::Dots(dots))) => dots,
            _ => {
                return Err(invalid_argument(format!("..{} used in an incorrect context, no ... to look in", index))
                    .with_call(|| Self::error_call(caller))
                    .into())
            }
        };
        let Some(value) = index.checked_sub(1).and_then(|i| dots.values.get(i)).cloned() else {
            return Err(invalid_argument(format!(
                "the ... list does not contain {} elements",
                index
            ))
            .with_call(|| Self::error_call(caller))
            .into());
        };
        self.resolve_binding(name, value, caller)
    }

    /// Nearest binding of `name` that is a function, forcing promises on the way.
    pub(crate) fn find_function(
        &mut self,
        name: &str,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult<Option<Value>> {
        let mut current = Some(env);
        while let Some(frame_env) = current {
            if let Some(value) = self.heap.get_local(frame_env, name)? {
                let value = match value {
                    Value::Promise(promise) => self.force(&promise, caller)?,
                    value => value,
                };
                if value.is_function() {
                    return Ok(Some(value));
                }
            }
            current = self.heap.parent(frame_env)?;
        }
        Ok(None)
    }

    pub(super) fn lookup_function(
        &mut self,
        name: &Symbol,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult {
        match self.find_function(name, env, caller)? {
            Some(function) => Ok(function),
            None => Err(condition(
                ConditionKind::ObjectNotFound,
                format!("could not find function \"{}\"", name),
            )
            .with_call(|| Self::error_call(caller))
            .into()),
        }
    }

    /// Binds `name` in `env` (or, for `<<-`, above it). The value gains an
    /// owner unless the binding already holds that very object.
    pub(super) fn assign_variable(
        &mut self,
        name: &Symbol,
        value: Value,
        env: EnvId,
        superassign: bool,
    ) -> Result<()> {
        let existing = if superassign {
            match self.heap.parent(env)? {
                Some(parent) => self.heap.lookup(parent, name)?.map(|(_, v)| v),
                None => None,
            }
        } else {
            self.heap.get_local(env, name)?
        };
        let same_object = existing.is_some_and(|current| {
            current.ptr_eq(&value)
                || current
                    .as_promise()
                    .and_then(|p| p.value())
                    .is_some_and(|v| v.ptr_eq(&value))
        });
        if !same_object {
            sharing::share(&value);
        }
        if superassign {
            self.heap.assign_super(env, name.clone(), value)?;
        } else {
            self.heap.define(env, name.clone(), value)?;
        }
        Ok(())
    }
}
