use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::WrapErr;
use lzr_core::ast::{CallArg, Expr, ExprCall, ExprKind, FunctionDef};
use lzr_core::caller::{Caller, DispatchContext, SuppliedArgs};
use lzr_core::class::ImplicitClasses;
use lzr_core::config::{bool_from_env, usize_from_env};
use lzr_core::diagnostics::{Diagnostic, DiagnosticManager, DiagnosticTemplate};
use lzr_core::env::{EnvId, Heap};
use lzr_core::error::{ConditionKind, Error, Result};
use lzr_core::promise::{Assumption, EagerValue, Promise, PromiseOrigin, PromiseState};
use lzr_core::sharing;
use lzr_core::signature::ArgumentsSignature;
use lzr_core::value::{BuiltinRef, Closure, DotArgs, Symbol, Value};
use lzr_core::{debug, internal_bail, trace};
use serde::{Deserialize, Serialize};

use crate::dispatch::{InheritedMethodResolver, MethodTable, S4Registry, SuperclassResolver};
use crate::error::{condition, invalid_argument, missing_argument, object_not_found};
use crate::intrinsics::{BuiltinArgs, IntrinsicFunction, IntrinsicKind, IntrinsicsRegistry};

mod closures;
mod eager;
pub mod eligibility;
mod env;
mod eval;
mod intrinsics;
pub mod matcher;
mod missing;
mod promises;

pub use matcher::{match_arguments, FormalSlot, MatchError, MatchPermutation};

const DEFAULT_DIAGNOSTIC_CONTEXT: &str = "lzr";

/// Non-local exits unwinding through the evaluator.
#[derive(Debug)]
pub enum Flow {
    Error(Error),
    /// `return(value)` (or a dispatched method's result) leaving the function whose frame is `env`.
    Return { env: EnvId, value: Value },
}

impl From<Error> for Flow {
    fn from(error: Error) -> Self {
        Flow::Error(error)
    }
}

impl Flow {
    pub fn into_error(self) -> Error {
        match self {
            Flow::Error(error) => error,
            Flow::Return { .. } => condition(
                ConditionKind::InvalidArgument,
                "no function to return from, jumping to top level",
            ),
        }
    }
}

pub type EvalResult<T = Value> = std::result::Result<T, Flow>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterOptions {
    /// Evaluate side-effect-free, always-forced arguments at the call site.
    pub eager_promises: bool,
    /// Allow unique prefixes of formal names to match.
    pub partial_matching: bool,
    /// Raise a condition, rather than yield the missing marker, when a promise
    /// is forced while already under evaluation.
    pub strict_promise_cycles: bool,
    pub max_depth: usize,
    pub diagnostic_context: String,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            eager_promises: true,
            partial_matching: true,
            strict_promise_cycles: false,
            max_depth: 256,
            diagnostic_context: DEFAULT_DIAGNOSTIC_CONTEXT.to_string(),
        }
    }
}

impl InterpreterOptions {
    /// Defaults overridden by `LZR_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read interpreter options from {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn with_env_overrides(self) -> Self {
        Self {
            eager_promises: bool_from_env("LZR_EAGER_PROMISES", self.eager_promises),
            partial_matching: bool_from_env("LZR_PARTIAL_MATCHING", self.partial_matching),
            strict_promise_cycles: bool_from_env(
                "LZR_STRICT_PROMISE_CYCLES",
                self.strict_promise_cycles,
            ),
            max_depth: usize_from_env("LZR_MAX_DEPTH").unwrap_or(self.max_depth),
            diagnostic_context: self.diagnostic_context,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub promises_forced: u64,
    pub eager_promises_created: u64,
    pub eager_hits: u64,
    pub eager_deopts: u64,
    pub eager_aborts: u64,
    pub s3_slow_lookups: u64,
    pub s4_slow_paths: u64,
    pub frames_collected: u64,
}

/// Lets another thread cancel the running evaluation.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

pub struct Interpreter {
    pub(crate) heap: Heap,
    global: EnvId,
    base: EnvId,
    pub(crate) intrinsics: IntrinsicsRegistry,
    options: InterpreterOptions,
    diagnostics: DiagnosticManager,
    pub(crate) implicit: ImplicitClasses,
    /// Methods registered with `registerS3method`, keyed `generic.class`.
    pub(crate) s3_methods: HashMap<Symbol, Value>,
    pub(crate) s3_registry_version: u64,
    pub(crate) s4: S4Registry,
    pub(crate) resolver: Rc<dyn InheritedMethodResolver>,
    pub(crate) stats: EngineStats,
    output: String,
    interrupt: InterruptHandle,
    next_caller_id: u64,
}

impl Interpreter {
    pub fn new(options: InterpreterOptions) -> Self {
        let mut heap = Heap::new();
        let base = heap.alloc(None, Some(Symbol::new("base")));
        let global = heap.alloc(Some(base), Some(Symbol::new("R_GlobalEnv")));
        let mut interpreter = Self {
            heap,
            global,
            base,
            intrinsics: IntrinsicsRegistry::new(),
            options,
            diagnostics: DiagnosticManager::new(),
            implicit: ImplicitClasses::new(),
            s3_methods: HashMap::new(),
            s3_registry_version: 0,
            s4: S4Registry::new(),
            resolver: Rc::new(SuperclassResolver),
            stats: EngineStats::default(),
            output: String::new(),
            interrupt: InterruptHandle::default(),
            next_caller_id: 0,
        };
        interpreter.bind_intrinsics();
        interpreter
    }

    fn bind_intrinsics(&mut self) {
        let bindings: Vec<(Symbol, usize)> = self
            .intrinsics
            .iter()
            .map(|(id, function)| (function.name.clone(), id))
            .collect();
        for (name, id) in bindings {
            let value = Value::Builtin(Rc::new(BuiltinRef {
                name: name.clone(),
                id,
            }));
            // the base frame is allocated above and never collected
            if let Err(err) = self.heap.define(self.base, name, value) {
                lzr_core::error!(%err, "failed to bind builtin");
            }
        }
    }

    /// Adds a builtin and binds it in the base environment.
    pub fn register_builtin(&mut self, function: IntrinsicFunction) -> Result<()> {
        let name = function.name.clone();
        let id = self.intrinsics.register(function);
        let value = Value::Builtin(Rc::new(BuiltinRef {
            name: name.clone(),
            id,
        }));
        self.heap.define(self.base, name, value)
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn diagnostics(&self) -> &DiagnosticManager {
        &self.diagnostics
    }

    /// Collected warnings and errors as display lines, labelled with the
    /// configured diagnostic context.
    pub fn render_diagnostics(&self, template: DiagnosticTemplate) -> Vec<String> {
        self.diagnostics
            .render(&self.options.diagnostic_context, template)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn global_env(&self) -> EnvId {
        self.global
    }

    pub fn base_env(&self) -> EnvId {
        self.base
    }

    /// Text written by `cat`.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn set_resolver(&mut self, resolver: Rc<dyn InheritedMethodResolver>) {
        self.resolver = resolver;
    }

    /// Method table of an S4 generic created with `setGeneric`.
    pub fn method_table(&self, generic: &str) -> Option<Rc<MethodTable>> {
        self.s4.generic(generic).map(|g| g.table.clone())
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.heap.get_local(self.global, name).ok().flatten()
    }

    pub fn define_global(&mut self, name: &str, value: Value) -> Result<()> {
        sharing::share(&value);
        self.heap.define(self.global, Symbol::new(name), value)
    }

    pub(crate) fn next_caller_id(&mut self) -> u64 {
        self.next_caller_id += 1;
        self.next_caller_id
    }

    pub(crate) fn top_level_caller(&mut self) -> Rc<Caller> {
        let id = self.next_caller_id();
        Caller::top_level(id)
    }

    pub(crate) fn check_interrupt(&self) -> EvalResult<()> {
        if self.interrupt.take() {
            debug!("evaluation interrupted");
            return Err(Error::Interrupted.into());
        }
        Ok(())
    }

    /// Rendered call of the logical frame errors raised under `caller` belong to.
    pub(crate) fn error_call(caller: &Rc<Caller>) -> Option<String> {
        caller
            .logical_function()
            .and_then(|frame| frame.call().map(|call| call.to_string()))
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>, call: Option<String>) {
        let mut diagnostic = Diagnostic::warning(message)
            .with_source_context(self.options.diagnostic_context.clone());
        if let Some(call) = call {
            diagnostic = diagnostic.with_call(call);
        }
        lzr_core::warn!(message = %diagnostic.message, "warning raised");
        self.diagnostics.add_diagnostic(diagnostic);
    }

    /// Evaluates `expr` in the global environment.
    pub fn eval_toplevel(&mut self, expr: &Expr) -> Result<Value> {
        let global = self.global;
        self.eval_in(expr, global)
    }

    /// Evaluates each expression in turn, returning the last value.
    pub fn eval_all(&mut self, exprs: &[Expr]) -> Result<Value> {
        let mut last = Value::Null;
        for expr in exprs {
            last = self.eval_toplevel(expr)?;
        }
        Ok(last)
    }

    pub fn eval_in(&mut self, expr: &Expr, env: EnvId) -> Result<Value> {
        let top = self.top_level_caller();
        match self.eval(expr, env, &top) {
            Ok(value) => Ok(value),
            Err(flow) => {
                let error = flow.into_error();
                if let Some(condition) = error.as_condition() {
                    self.diagnostics.add_diagnostic(
                        Diagnostic::error(condition.message.clone())
                            .with_code(error.code())
                            .with_source_context(self.options.diagnostic_context.clone()),
                    );
                }
                Err(error)
            }
        }
    }

    /// A lazy promise over `expr` in `env`, created under a fresh top-level record.
    pub fn make_promise(&mut self, expr: Expr, env: EnvId) -> Rc<Promise> {
        let top = self.top_level_caller();
        Promise::new(expr, env, PromiseOrigin::Supplied, &top)
    }

    pub fn force_promise(&mut self, promise: &Rc<Promise>) -> Result<Value> {
        let top = self.top_level_caller();
        self.force(promise, &top).map_err(Flow::into_error)
    }

    /// Calls `function` with already evaluated arguments.
    pub fn apply(&mut self, function: &Value, args: Vec<(Option<&str>, Value)>) -> Result<Value> {
        let top = self.top_level_caller();
        let (names, values): (Vec<_>, Vec<_>) = args
            .into_iter()
            .map(|(name, value)| (name.map(Symbol::new), value))
            .unzip();
        let call = lzr_core::ast::build::call_expr(
            lzr_core::ast::build::constant(function.clone()),
            Vec::new(),
        );
        let global = self.global;
        self.apply_values(function, &call, names, values, global, &top)
            .map_err(Flow::into_error)
    }

    /// Matches `supplied` against the closure's formals and builds its frame
    /// without running the body.
    pub fn build_frame(&mut self, function: &Value, supplied: SuppliedArgs) -> Result<EnvId> {
        let Value::Closure(closure) = function else {
            return Err(invalid_argument("only closures have call frames"));
        };
        let top = self.top_level_caller();
        let call = lzr_core::ast::build::call_expr(
            lzr_core::ast::build::constant(function.clone()),
            Vec::new(),
        );
        let permutation = self
            .match_supplied(&closure.def, &supplied, &call)
            .map_err(Flow::into_error)?;
        let (env, _) = self
            .enter_frame(closure, &call, supplied, &permutation, &top, None)
            .map_err(Flow::into_error)?;
        Ok(env)
    }

    /// Frees environments unreachable from the global and base frames and
    /// from registered methods. Call only between top-level evaluations.
    pub fn collect_garbage(&mut self) -> usize {
        let mut values: Vec<Value> = self.s3_methods.values().cloned().collect();
        values.extend(self.s4.method_values());
        let freed = self.heap.collect([self.global, self.base], values.iter());
        self.stats.frames_collected += freed as u64;
        freed
    }
}
