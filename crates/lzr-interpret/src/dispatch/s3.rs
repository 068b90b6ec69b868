//! Class-attribute dispatch: `UseMethod`, `NextMethod`, and the internal
//! dispatch of builtins on classed arguments.

use std::rc::Rc;

use lzr_core::ast::{Expr, ExprKind};
use lzr_core::caller::{Caller, DispatchContext, SuppliedArgs};
use lzr_core::class::{class_hierarchy, class_names, describe_classes, is_object};
use lzr_core::env::EnvId;
use lzr_core::error::Error;
use lzr_core::inline_cache::{CacheStamp, CachedMethod};
use lzr_core::promise::{Promise, PromiseOrigin};
use lzr_core::value::{Closure, Symbol, Value};
use lzr_core::{debug, sharing, trace};

use crate::condition_bail;
use crate::engine::{EvalResult, Flow, Interpreter};
use crate::intrinsics::{InternalDispatch, IntrinsicFunction, SpecialCall};

impl Interpreter {
    /// `UseMethod(generic, object)`: finds the method for the object's class
    /// chain, calls it with the generic's arguments and leaves the generic
    /// with its result.
    pub(crate) fn use_method(
        &mut self,
        generic: &Symbol,
        object: Option<Value>,
        call: &SpecialCall<'_>,
    ) -> EvalResult {
        let Some(frame) = call.caller.logical_function() else {
            condition_bail!(InvalidArgument, "UseMethod called from outside a function");
        };
        let (Some(env), Some(Value::Closure(closure))) = (frame.env(), frame.function_value().cloned())
        else {
            condition_bail!(InvalidArgument, "UseMethod called from outside a function");
        };
        let object = match object {
            Some(object) => object,
            None => self.dispatch_object(&closure, env, &frame)?,
        };
        let chain = class_hierarchy(&object, &self.implicit);
        let classes = class_names(&chain);
        let call_env = frame
            .logical_parent()
            .and_then(|parent| parent.env())
            .unwrap_or_else(|| self.global_env());
        let scope = vec![call_env, closure.env];

        // both counters only grow, so their sum changes whenever either does
        let stamp = CacheStamp {
            version: self.heap.function_epoch() + self.s3_registry_version,
            scope: scope.clone(),
        };
        let cached = call.site.dispatch.lookup(generic, &[chain.clone()], &stamp);
        let method = match cached {
            Some(method) => method,
            None => {
                self.stats.s3_slow_lookups += 1;
                let group = self
                    .intrinsics
                    .lookup(generic)
                    .and_then(|f| f.dispatch.group());
                let found =
                    self.find_s3_method(generic, group, &classes, 0, &scope, true, call.caller)?;
                let Some(method) = found else {
                    condition_bail!(
                        DispatchNotFound,
                        "no applicable method for '{}' applied to an object of class {}",
                        generic,
                        describe_classes(&classes)
                    );
                };
                call.site
                    .dispatch
                    .insert(generic, &[chain.clone()], &stamp, method.clone());
                method
            }
        };
        trace!(generic = %generic, target = %method.target, "S3 method selected");

        let context = DispatchContext {
            generic: generic.clone(),
            group: method.group.clone(),
            classes,
            position: method.position,
            object,
            call_env,
            def_env: Some(closure.env),
        };
        let (supplied, parent, method_call) = self.frame_call(&frame, call.call);
        let value = self.call_method(&method.method, &method_call, supplied, &parent, context)?;
        Err(Flow::Return { env, value })
    }

    /// First argument of the generic: its first formal, or the first
    /// element of `...`.
    fn dispatch_object(&mut self, closure: &Closure, env: EnvId, frame: &Rc<Caller>) -> EvalResult {
        let Some(first) = closure.def.formals.first() else {
            return Ok(Value::Null);
        };
        if !first.name.is_varargs() {
            return self.read_variable(&first.name, env, frame);
        }
        match self.heap.get_local(env, &first.name)? {
            Some(Value::Dots(dots)) => match dots.values.first() {
                Some(Value::Promise(promise)) => self.force(promise, frame),
                Some(value) => Ok(value.clone()),
                None => Ok(Value::Null),
            },
            _ => Ok(Value::Null),
        }
    }

    /// Arguments, parent record and call expression of a function record,
    /// reused when a method runs in place of that function.
    fn frame_call(&mut self, frame: &Rc<Caller>, fallback: &Expr) -> (SuppliedArgs, Rc<Caller>, Expr) {
        let supplied = frame
            .supplied()
            .map(|supplied| (**supplied).clone())
            .unwrap_or_else(SuppliedArgs::empty);
        let parent = match frame.parent() {
            Some(parent) => parent.clone(),
            None => self.top_level_caller(),
        };
        let call = frame.call().cloned().unwrap_or_else(|| fallback.clone());
        (supplied, parent, call)
    }

    /// Searches `generic.class` then `Group.class` for each class from
    /// `start` on. With `fallbacks`, then `generic.default` and finally a
    /// builtin of the same name.
    #[allow(clippy::too_many_arguments)]
    fn find_s3_method(
        &mut self,
        generic: &Symbol,
        group: Option<&str>,
        classes: &[Symbol],
        start: usize,
        scope: &[EnvId],
        fallbacks: bool,
        caller: &Rc<Caller>,
    ) -> EvalResult<Option<CachedMethod>> {
        for (position, class) in classes.iter().enumerate().skip(start) {
            let target = Symbol::from(format!("{}.{}", generic, class));
            if let Some(method) = self.find_s3_function(&target, scope, caller)? {
                return Ok(Some(found_method(method, target, position, None)));
            }
            if let Some(group) = group {
                let target = Symbol::from(format!("{}.{}", group, class));
                if let Some(method) = self.find_s3_function(&target, scope, caller)? {
                    return Ok(Some(found_method(
                        method,
                        target,
                        position,
                        Some(Symbol::new(group)),
                    )));
                }
            }
        }
        if !fallbacks {
            return Ok(None);
        }
        if start <= classes.len() {
            let target = Symbol::from(format!("{}.default", generic));
            if let Some(method) = self.find_s3_function(&target, scope, caller)? {
                return Ok(Some(found_method(method, target, classes.len(), None)));
            }
        }
        let base = self.base_env();
        match self.heap.get_local(base, generic)? {
            Some(builtin @ Value::Builtin(_)) => {
                let mut method = found_method(builtin, generic.clone(), classes.len() + 1, None);
                method.deferred = true;
                Ok(Some(method))
            }
            _ => Ok(None),
        }
    }

    /// A method visible from any scope environment, else one registered
    /// with `registerS3method`.
    fn find_s3_function(
        &mut self,
        name: &Symbol,
        scope: &[EnvId],
        caller: &Rc<Caller>,
    ) -> EvalResult<Option<Value>> {
        for &env in scope {
            if let Some(function) = self.find_function(name, env, caller)? {
                return Ok(Some(function));
            }
        }
        Ok(self.s3_methods.get(name).cloned())
    }

    fn call_method(
        &mut self,
        method: &Value,
        call: &Expr,
        supplied: SuppliedArgs,
        parent: &Rc<Caller>,
        context: DispatchContext,
    ) -> EvalResult {
        match method {
            Value::Closure(closure) => {
                self.invoke_closure(closure, call, supplied, parent, Some(Rc::new(context)))
            }
            other => self.call_default_method(other, call, &supplied, context.call_env, parent),
        }
    }

    /// Runs a builtin in place of a method, forcing the supplied promises.
    /// The builtin does not dispatch again.
    pub(crate) fn call_default_method(
        &mut self,
        method: &Value,
        call: &Expr,
        supplied: &SuppliedArgs,
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult {
        let Value::Builtin(builtin) = method else {
            condition_bail!(
                InvalidArgument,
                "method of type '{}' cannot be called",
                method.type_name()
            );
        };
        let function = self.intrinsic(builtin)?;
        if !function.is_strict() {
            condition_bail!(
                InvalidArgument,
                "'{}' cannot be used as a default method",
                function.name
            );
        }
        let mut values = Vec::with_capacity(supplied.len());
        for value in &supplied.values {
            values.push(match value {
                Value::Promise(promise) => self.force(promise, caller)?,
                other => other.clone(),
            });
        }
        let names = supplied.names().to_vec();
        self.invoke_strict(&function, call, names, values, env, caller, false)
    }

    /// `NextMethod()`: the method for the next class in the chain of the
    /// current dispatch, called with the current method's arguments plus any
    /// extra ones given here.
    pub(crate) fn next_method(&mut self, call: &SpecialCall<'_>) -> EvalResult {
        let Some(frame) = call.caller.logical_function() else {
            condition_bail!(InvalidArgument, "NextMethod called from outside a method dispatch");
        };
        let Some(context) = frame.dispatch().cloned() else {
            condition_bail!(InvalidArgument, "NextMethod called from outside a method dispatch");
        };
        let mut scope = vec![context.call_env];
        scope.extend(context.def_env);
        let group = context.group.clone();
        let found = self.find_s3_method(
            &context.generic,
            group.as_deref(),
            &context.classes,
            context.position + 1,
            &scope,
            true,
            call.caller,
        )?;
        let Some(method) = found else {
            condition_bail!(DispatchNotFound, "no more methods for '{}'", context.generic);
        };
        debug!(generic = %context.generic, target = %method.target, "next method selected");

        let (supplied, parent, method_call) = self.frame_call(&frame, call.call);
        let supplied = with_extra_args(supplied, call);
        let next = DispatchContext {
            group: method.group.clone(),
            position: method.position,
            ..(*context).clone()
        };
        self.call_method(&method.method, &method_call, supplied, &parent, next)
    }

    /// `registerS3method(generic, class, method)`.
    pub(crate) fn register_s3_method(&mut self, generic: &Symbol, class: &Symbol, method: Value) {
        let name = Symbol::from(format!("{}.{}", generic, class));
        sharing::share(&method);
        self.s3_methods.insert(name.clone(), method);
        self.s3_registry_version += 1;
        debug!(method = %name, version = self.s3_registry_version, "S3 method registered");
    }

    /// Dispatch performed by an internally generic builtin before it runs.
    /// `Ok(None)` means no method applies and the builtin runs itself.
    pub(crate) fn dispatch_internal(
        &mut self,
        function: &IntrinsicFunction,
        call: &Expr,
        names: &[Option<Symbol>],
        values: &[Value],
        env: EnvId,
        caller: &Rc<Caller>,
    ) -> EvalResult<Option<Value>> {
        let operands = match function.dispatch {
            InternalDispatch::None => return Ok(None),
            InternalDispatch::Ops => values.len().min(2),
            _ => values.len().min(1),
        };
        let group = function.dispatch.group();
        let mut found: Vec<(Value, Vec<Symbol>, CachedMethod)> = Vec::new();
        for object in values[..operands].iter().filter(|v| is_object(v)) {
            let classes = class_names(&class_hierarchy(object, &self.implicit));
            let method =
                self.find_s3_method(&function.name, group, &classes, 0, &[env], false, caller)?;
            if let Some(method) = method {
                found.push((object.clone(), classes, method));
            }
        }
        let (object, classes, method) = match found.as_slice() {
            [] => return Ok(None),
            [only] => only.clone(),
            [lhs, rhs, ..] => {
                if !lhs.2.method.ptr_eq(&rhs.2.method) {
                    if caller.eager_only() {
                        return Err(Error::CannotOptimize.into());
                    }
                    self.warning(
                        format!(
                            "Incompatible methods (\"{}\", \"{}\") for \"{}\"",
                            lhs.2.target, rhs.2.target, function.name
                        ),
                        Some(call.to_string()),
                    );
                    return Ok(None);
                }
                lhs.clone()
            }
        };
        let Value::Closure(closure) = &method.method else {
            return Ok(None);
        };
        trace!(builtin = %function.name, target = %method.target, "internal dispatch");
        let context = DispatchContext {
            generic: function.name.clone(),
            group: method.group.clone(),
            classes,
            position: method.position,
            object,
            call_env: env,
            def_env: None,
        };
        // the method frame becomes a second owner of each operand
        values.iter().for_each(sharing::share);
        let supplied = SuppliedArgs::new(names.to_vec(), values.to_vec());
        self.invoke_closure(closure, call, supplied, caller, Some(Rc::new(context)))
            .map(Some)
    }
}

fn found_method(method: Value, target: Symbol, position: usize, group: Option<Symbol>) -> CachedMethod {
    CachedMethod {
        method,
        target,
        position,
        group,
        deferred: false,
    }
}

/// Arguments of a `NextMethod` call beyond `generic` and `object` become
/// promises in the calling method's frame. Named ones replace a supplied
/// argument of the same name.
fn with_extra_args(supplied: SuppliedArgs, call: &SpecialCall<'_>) -> SuppliedArgs {
    let mut names = supplied.names().to_vec();
    let mut values = supplied.values;
    let mut skipped = 0;
    for arg in call.args {
        match (&arg.name, &arg.value.kind) {
            (Some(name), _) if name.as_str() == "generic" || name.as_str() == "object" => continue,
            (None, _) if skipped < 2 => {
                skipped += 1;
                continue;
            }
            // already forwarded with the supplied arguments
            (_, ExprKind::Symbol(name)) if name.is_varargs() => continue,
            (_, ExprKind::Empty) => continue,
            _ => {}
        }
        let value = match &arg.value.kind {
            ExprKind::Constant(constant) => Value::Promise(Promise::evaluated(
                arg.value.clone(),
                constant.clone(),
                PromiseOrigin::Supplied,
            )),
            _ => Value::Promise(Promise::new(
                arg.value.clone(),
                call.env,
                PromiseOrigin::Supplied,
                call.caller,
            )),
        };
        let existing = arg
            .name
            .as_ref()
            .and_then(|name| names.iter().position(|n| n.as_ref() == Some(name)));
        match existing {
            Some(index) => values[index] = value,
            None => {
                names.push(arg.name.clone());
                values.push(value);
            }
        }
    }
    SuppliedArgs::new(names, values)
}
