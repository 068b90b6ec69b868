//! Formal classes, generics with method tables, and inherited-method
//! resolution.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use itertools::Itertools;
use lzr_core::caller::{Caller, SuppliedArgs};
use lzr_core::class::{class_hierarchy, class_names, describe_classes, dispatch_key};
use lzr_core::inline_cache::{CacheStamp, CachedMethod, DispatchCache};
use lzr_core::promise::PromiseOrigin;
use lzr_core::value::{Symbol, Value, Vector};
use lzr_core::{debug, trace};

use crate::{condition_bail, condition_ensure};
use crate::engine::{EvalResult, Interpreter};
use crate::intrinsics::{BuiltinArgs, SpecialCall};

const ANY: &str = "ANY";

// ===== CLASSES =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: Symbol,
    /// Direct superclasses, nearest first.
    pub contains: Vec<Symbol>,
}

#[derive(Debug)]
pub struct ClassRegistry {
    classes: HashMap<Symbol, ClassDef>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            classes: HashMap::new(),
        };
        for basic in ["numeric", "logical", "character", "list", "function", "NULL", "missing"] {
            registry.define(Symbol::new(basic), Vec::new());
        }
        registry.define(Symbol::new("integer"), vec![Symbol::new("numeric")]);
        registry.define(Symbol::new("double"), vec![Symbol::new("numeric")]);
        registry
    }

    pub fn define(&mut self, name: Symbol, contains: Vec<Symbol>) {
        debug!(class = %name, contains = ?contains, "class defined");
        self.classes
            .insert(name.clone(), ClassDef { name, contains });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// `name` followed by all of its superclasses, breadth-first, each with
    /// its inheritance distance.
    pub fn linearize(&self, name: &Symbol) -> Vec<(Symbol, usize)> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(name.clone(), 0)]);
        while let Some((class, distance)) = queue.pop_front() {
            if !seen.insert(class.clone()) {
                continue;
            }
            if let Some(def) = self.classes.get(&class) {
                queue.extend(def.contains.iter().map(|c| (c.clone(), distance + 1)));
            }
            order.push((class, distance));
        }
        order
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ===== METHOD TABLES =====

/// Methods of one generic keyed by `#`-joined class names. Entries installed
/// by inherited-method resolution are dropped whenever a method is defined.
#[derive(Debug)]
pub struct MethodTable {
    pub generic: Symbol,
    methods: RefCell<HashMap<String, Value>>,
    inherited: RefCell<HashSet<String>>,
    version: Cell<u64>,
    lookups: Cell<u64>,
    slow_path_calls: Cell<u64>,
}

impl MethodTable {
    pub fn new(generic: Symbol) -> Self {
        Self {
            generic,
            methods: RefCell::new(HashMap::new()),
            inherited: RefCell::new(HashSet::new()),
            version: Cell::new(0),
            lookups: Cell::new(0),
            slow_path_calls: Cell::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lookups.set(self.lookups.get() + 1);
        self.methods.borrow().get(key).cloned()
    }

    /// Looks at an entry without counting a lookup.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.methods.borrow().get(key).cloned()
    }

    /// Explicit definition; invalidates call-site caches and inherited entries.
    pub fn define(&self, key: &str, method: Value) {
        let mut methods = self.methods.borrow_mut();
        for stale in self.inherited.borrow_mut().drain() {
            methods.remove(&stale);
        }
        methods.insert(key.to_string(), method);
        self.version.set(self.version.get() + 1);
    }

    /// Entry found by inheritance, stored under the key it was resolved for.
    pub fn install(&self, key: &str, method: Value) {
        self.inherited.borrow_mut().insert(key.to_string());
        self.methods.borrow_mut().insert(key.to_string(), method);
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.get()
    }

    pub fn slow_path_calls(&self) -> u64 {
        self.slow_path_calls.get()
    }

    fn record_slow_path(&self) {
        self.slow_path_calls.set(self.slow_path_calls.get() + 1);
    }

    pub fn keys(&self) -> Vec<String> {
        self.methods.borrow().keys().cloned().sorted().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.methods.borrow().values().cloned().collect()
    }
}

#[derive(Debug)]
pub struct S4Generic {
    pub name: Symbol,
    /// Formals dispatched on, in order.
    pub signature: Vec<Symbol>,
    pub table: Rc<MethodTable>,
}

#[derive(Debug, Default)]
pub struct S4Registry {
    pub classes: ClassRegistry,
    generics: HashMap<Symbol, Rc<S4Generic>>,
}

impl S4Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generic(&self, name: &str) -> Option<&Rc<S4Generic>> {
        self.generics.get(name)
    }

    pub fn insert_generic(&mut self, generic: S4Generic) -> Rc<S4Generic> {
        let generic = Rc::new(generic);
        self.generics.insert(generic.name.clone(), generic.clone());
        generic
    }

    /// Every method of every generic, for garbage-collection roots.
    pub fn method_values(&self) -> Vec<Value> {
        self.generics
            .values()
            .flat_map(|generic| generic.table.values())
            .collect()
    }
}

// ===== INHERITED METHOD RESOLUTION =====

/// Slow path of formal dispatch: finds a method for class chains that have
/// no entry of their own.
pub trait InheritedMethodResolver {
    /// Installs a method for `key` into `table`, returning whether one was found.
    /// `chains` holds the class chain of each signature argument.
    fn resolve(
        &self,
        classes: &ClassRegistry,
        chains: &[Vec<Symbol>],
        table: &MethodTable,
        key: &str,
    ) -> bool;
}

/// Tries every combination of the arguments' classes and their declared
/// superclasses, nearest total distance first, then `ANY`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuperclassResolver;

impl SuperclassResolver {
    fn candidates(classes: &ClassRegistry, chain: &[Symbol]) -> Vec<(Symbol, usize)> {
        let mut candidates: Vec<(Symbol, usize)> = Vec::new();
        for (index, class) in chain.iter().enumerate() {
            for (ancestor, distance) in classes.linearize(class) {
                candidates.push((ancestor, index + distance));
            }
        }
        let furthest = candidates.iter().map(|(_, d)| *d).max().unwrap_or(0);
        candidates.push((Symbol::new(ANY), furthest + 1));
        candidates.sort_by_key(|(_, distance)| *distance);
        candidates
            .into_iter()
            .unique_by(|(class, _)| class.clone())
            .collect()
    }
}

impl InheritedMethodResolver for SuperclassResolver {
    fn resolve(
        &self,
        classes: &ClassRegistry,
        chains: &[Vec<Symbol>],
        table: &MethodTable,
        key: &str,
    ) -> bool {
        if chains.is_empty() {
            return false;
        }
        let combinations = chains
            .iter()
            .map(|chain| Self::candidates(classes, chain))
            .multi_cartesian_product()
            .sorted_by_key(|combo| combo.iter().map(|(_, d)| d).sum::<usize>());
        for combo in combinations {
            let names: Vec<Symbol> = combo.into_iter().map(|(class, _)| class).collect();
            let candidate = dispatch_key(&names);
            if let Some(method) = table.peek(&candidate) {
                trace!(generic = %table.generic, key, inherited = %candidate, "inherited method found");
                table.install(key, method);
                return true;
            }
        }
        false
    }
}

// ===== DISPATCH ENGINE =====

#[derive(Debug, Clone)]
pub enum DispatchResult {
    Found(Value),
    /// The method is a builtin; run its default behavior.
    Deferred(Value),
    NotFound,
}

pub struct DispatchEngine<'a> {
    pub classes: &'a ClassRegistry,
    pub resolver: &'a dyn InheritedMethodResolver,
}

impl DispatchEngine<'_> {
    /// Method of `generic` for one class chain per signature argument:
    /// call-site cache, then the table, then one slow-path resolution.
    pub fn dispatch(
        &self,
        generic: &Symbol,
        chains: &[Rc<Vector>],
        table: &MethodTable,
        cache: &DispatchCache,
    ) -> DispatchResult {
        let stamp = CacheStamp {
            version: table.version(),
            scope: Vec::new(),
        };
        if let Some(cached) = cache.lookup(generic, chains, &stamp) {
            return Self::result(cached.method, cached.deferred);
        }

        let names: Vec<Vec<Symbol>> = chains.iter().map(|c| class_names(c)).collect();
        let first: Vec<Symbol> = names
            .iter()
            .map(|chain| chain.first().cloned().unwrap_or_else(|| Symbol::new(ANY)))
            .collect();
        let key = dispatch_key(&first);

        let method = match table.get(&key) {
            Some(method) => Some(method),
            None => {
                table.record_slow_path();
                debug!(generic = %generic, key = %key, "method table miss");
                if self.resolver.resolve(self.classes, &names, table, &key) {
                    table.get(&key)
                } else {
                    None
                }
            }
        };
        let Some(method) = method else {
            return DispatchResult::NotFound;
        };
        let deferred = matches!(method, Value::Builtin(_));
        cache.insert(
            generic,
            chains,
            &stamp,
            CachedMethod {
                method: method.clone(),
                target: Symbol::from(key),
                position: 0,
                group: None,
                deferred,
            },
        );
        Self::result(method, deferred)
    }

    fn result(method: Value, deferred: bool) -> DispatchResult {
        if deferred {
            DispatchResult::Deferred(method)
        } else {
            DispatchResult::Found(method)
        }
    }
}

// ===== INTERPRETER ENTRY POINTS =====

impl Interpreter {
    /// Body of a formal generic: dispatches on the classes of its signature
    /// arguments and calls the method with the generic's arguments.
    pub(crate) fn standard_generic(&mut self, name: &Symbol, call: &SpecialCall<'_>) -> EvalResult {
        let Some(generic) = self.s4.generic(name).cloned() else {
            condition_bail!(InvalidArgument, "no generic function found for '{}'", name);
        };
        let Some((frame, env)) = call
            .caller
            .logical_function()
            .and_then(|frame| frame.env().map(|env| (frame, env)))
        else {
            condition_bail!(
                InvalidArgument,
                "call to standardGeneric(\"{}\") apparently not from the body of that generic function",
                name
            );
        };

        let mut chains = Vec::with_capacity(generic.signature.len());
        for formal in &generic.signature {
            let value = match self.heap.get_local(env, formal)? {
                None | Some(Value::Missing) => Value::Missing,
                Some(Value::Promise(promise)) if promise.origin() == PromiseOrigin::Default => {
                    Value::Missing
                }
                Some(Value::Promise(promise)) => self.force(&promise, call.caller)?,
                Some(value) => value,
            };
            chains.push(class_hierarchy(&value, &self.implicit));
        }

        let resolver = self.resolver.clone();
        let before = generic.table.slow_path_calls();
        let result = DispatchEngine {
            classes: &self.s4.classes,
            resolver: &*resolver,
        }
        .dispatch(&generic.name, &chains, &generic.table, &call.site.dispatch);
        self.stats.s4_slow_paths += generic.table.slow_path_calls() - before;

        let supplied = frame
            .supplied()
            .map(|s| (**s).clone())
            .unwrap_or_else(SuppliedArgs::empty);
        let parent = match frame.parent() {
            Some(parent) => parent.clone(),
            None => self.top_level_caller(),
        };
        let method_call = frame.call().cloned().unwrap_or_else(|| call.call.clone());
        match result {
            DispatchResult::Found(Value::Closure(method)) => {
                self.invoke_closure(&method, &method_call, supplied, &parent, None)
            }
            DispatchResult::Found(method) | DispatchResult::Deferred(method) => {
                self.call_default_method(&method, &method_call, &supplied, env, &parent)
            }
            DispatchResult::NotFound => {
                let signature = generic
                    .signature
                    .iter()
                    .zip(&chains)
                    .map(|(formal, chain)| {
                        let first = class_names(chain).into_iter().take(1).collect_vec();
                        format!("{} = {}", formal, describe_classes(&first))
                    })
                    .join(", ");
                condition_bail!(
                    DispatchNotFound,
                    "unable to find an inherited method for function '{}' for signature '{}'",
                    name,
                    signature
                )
            }
        }
    }

    /// `setGeneric(name, def)`. Without `def`, an existing function of that
    /// name becomes the `ANY` method of a new `(x, ...)` generic.
    pub(crate) fn set_generic(
        &mut self,
        name: &Symbol,
        def: Option<Value>,
        args: &BuiltinArgs,
    ) -> EvalResult<Rc<S4Generic>> {
        let (generic_fn, default) = match def {
            Some(Value::Closure(closure)) => (Value::Closure(closure), None),
            Some(other) => condition_bail!(
                InvalidArgument,
                "generic definition must be a function, not a {}",
                other.type_name()
            ),
            None => {
                let Some(existing) = self.find_function(name, args.env, &args.caller)? else {
                    condition_bail!(
                        InvalidArgument,
                        "must supply a function skeleton for '{}', explicitly or via an existing function",
                        name
                    );
                };
                (self.skeleton_generic(name, &args.caller)?, Some(existing))
            }
        };
        let Value::Closure(closure) = &generic_fn else {
            condition_bail!(InvalidArgument, "generic definition must be a function");
        };
        let signature = match args
            .arg("signature", 2)
            .and_then(|v| v.as_vector())
            .and_then(|v| v.strings())
        {
            Some(signature) => signature,
            None => closure
                .def
                .formals
                .iter()
                .map(|f| f.name.clone())
                .filter(|n| !n.is_varargs())
                .collect(),
        };

        let table = Rc::new(MethodTable::new(name.clone()));
        if let Some(default) = default {
            let any = vec![Symbol::new(ANY); signature.len().max(1)];
            table.define(&dispatch_key(&any), default);
        }
        let generic = self.s4.insert_generic(S4Generic {
            name: name.clone(),
            signature,
            table,
        });
        let global = self.global_env();
        self.heap.define(global, name.clone(), generic_fn)?;
        debug!(generic = %name, "formal generic created");
        Ok(generic)
    }

    fn skeleton_generic(&mut self, name: &Symbol, caller: &Rc<Caller>) -> EvalResult {
        use lzr_core::ast::build::{arg, call, formal, function, text};
        let body = call("standardGeneric", vec![arg(text(name.as_str()))]);
        let expr = function(vec![formal("x"), formal("...")], body)?;
        let global = self.global_env();
        self.eval(&expr, global, caller)
    }

    /// `setMethod(name, signature, definition)`, creating the generic if needed.
    pub(crate) fn set_method(
        &mut self,
        name: &Symbol,
        signature: &[Symbol],
        definition: Value,
        args: &BuiltinArgs,
    ) -> EvalResult<()> {
        let generic = match self.s4.generic(name).cloned() {
            Some(generic) => generic,
            None => self.set_generic(name, None, args)?,
        };
        condition_ensure!(
            signature.len() <= generic.signature.len().max(1),
            InvalidArgument,
            "the method for '{}' has more arguments in its signature than the generic",
            name
        );
        let mut classes = signature.to_vec();
        classes.resize(generic.signature.len().max(1), Symbol::new(ANY));
        let key = dispatch_key(&classes);
        generic.table.define(&key, definition);
        debug!(generic = %name, key = %key, version = generic.table.version(), "method defined");
        Ok(())
    }
}
