//! Call records: the logical call stack.
//!
//! Records are owned by the call that pushed them (through `parent` links of
//! deeper records) and only weakly referenced from promises.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use crate::ast::Expr;
use crate::env::EnvId;
use crate::signature::ArgumentsSignature;
use crate::value::{Symbol, Value};

/// Arguments as supplied at a call site after `...` expansion: promises,
/// evaluated values or the missing marker.
#[derive(Debug, Clone)]
pub struct SuppliedArgs {
    pub signature: ArgumentsSignature,
    pub values: Vec<Value>,
}

impl SuppliedArgs {
    pub fn new(names: Vec<Option<Symbol>>, values: Vec<Value>) -> Self {
        Self {
            signature: ArgumentsSignature::supplied(names),
            values,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[Option<Symbol>] {
        self.signature.names()
    }
}

/// State of an S3 dispatch, kept on the method's record for `NextMethod`.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub generic: Symbol,
    /// Group generic (`Ops`, `Math`, `Summary`) the method was found through.
    pub group: Option<Symbol>,
    /// Full class chain of the dispatch object.
    pub classes: Vec<Symbol>,
    /// Index into `classes` of the class that matched; `classes.len()` for the default method.
    pub position: usize,
    pub object: Value,
    /// Environment the generic was called from.
    pub call_env: EnvId,
    /// Defining environment of the generic.
    pub def_env: Option<EnvId>,
}

#[derive(Debug)]
pub enum CallerKind {
    TopLevel,
    Function {
        env: EnvId,
        function: Value,
        supplied: Rc<SuppliedArgs>,
        dispatch: Option<Rc<DispatchContext>>,
    },
    /// Pushed while a promise is forced; `logical` is the record it was created under.
    Promise { logical: Weak<Caller> },
    Builtin { name: Symbol },
}

#[derive(Debug)]
pub struct Caller {
    id: u64,
    parent: Option<Rc<Caller>>,
    call: Option<Expr>,
    depth: usize,
    kind: CallerKind,
    eager_only: Cell<bool>,
}

impl Caller {
    pub fn top_level(id: u64) -> Rc<Self> {
        Rc::new(Self {
            id,
            parent: None,
            call: None,
            depth: 0,
            kind: CallerKind::TopLevel,
            eager_only: Cell::new(false),
        })
    }

    pub fn function(
        id: u64,
        parent: &Rc<Caller>,
        call: Expr,
        env: EnvId,
        function: Value,
        supplied: Rc<SuppliedArgs>,
        dispatch: Option<Rc<DispatchContext>>,
    ) -> Rc<Self> {
        Self::child(
            id,
            parent,
            Some(call),
            CallerKind::Function {
                env,
                function,
                supplied,
                dispatch,
            },
        )
    }

    pub fn promise(id: u64, parent: &Rc<Caller>, logical: Option<&Rc<Caller>>) -> Rc<Self> {
        let logical = logical.map(Rc::downgrade).unwrap_or_default();
        Self::child(id, parent, None, CallerKind::Promise { logical })
    }

    pub fn builtin(id: u64, parent: &Rc<Caller>, call: Expr, name: Symbol) -> Rc<Self> {
        Self::child(id, parent, Some(call), CallerKind::Builtin { name })
    }

    fn child(id: u64, parent: &Rc<Caller>, call: Option<Expr>, kind: CallerKind) -> Rc<Self> {
        Rc::new(Self {
            id,
            parent: Some(parent.clone()),
            call,
            depth: parent.depth + 1,
            kind,
            eager_only: Cell::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent(&self) -> Option<&Rc<Caller>> {
        self.parent.as_ref()
    }

    pub fn call(&self) -> Option<&Expr> {
        self.call.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn kind(&self) -> &CallerKind {
        &self.kind
    }

    pub fn eager_only(&self) -> bool {
        self.eager_only.get()
    }

    /// Sets the flag, returning its previous value.
    pub fn set_eager_only(&self, eager_only: bool) -> bool {
        self.eager_only.replace(eager_only)
    }

    pub fn env(&self) -> Option<EnvId> {
        match &self.kind {
            CallerKind::Function { env, .. } => Some(*env),
            _ => None,
        }
    }

    pub fn function_value(&self) -> Option<&Value> {
        match &self.kind {
            CallerKind::Function { function, .. } => Some(function),
            _ => None,
        }
    }

    pub fn supplied(&self) -> Option<&Rc<SuppliedArgs>> {
        match &self.kind {
            CallerKind::Function { supplied, .. } => Some(supplied),
            _ => None,
        }
    }

    pub fn dispatch(&self) -> Option<&Rc<DispatchContext>> {
        match &self.kind {
            CallerKind::Function { dispatch, .. } => dispatch.as_ref(),
            _ => None,
        }
    }

    /// Nearest function record, skipping builtin wrappers and jumping from a
    /// promise wrapper to the record the promise was created under.
    pub fn logical_function(self: &Rc<Self>) -> Option<Rc<Caller>> {
        let mut current = self.clone();
        loop {
            let next = match &current.kind {
                CallerKind::Function { .. } => return Some(current),
                CallerKind::TopLevel => return None,
                CallerKind::Promise { logical } => {
                    logical.upgrade().or_else(|| current.parent.clone())
                }
                CallerKind::Builtin { .. } => current.parent.clone(),
            };
            current = next?;
        }
    }

    /// The function record this function was called from; `None` at top level.
    pub fn logical_parent(self: &Rc<Self>) -> Option<Rc<Caller>> {
        self.parent.as_ref()?.logical_function()
    }
}
