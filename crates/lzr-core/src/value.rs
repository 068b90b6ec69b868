use std::borrow::Borrow;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use derive_more::{Deref, Display};
use itertools::Itertools;

use crate::ast::{Expr, FunctionDef};
use crate::env::EnvId;
use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::sharing::{self, SharingState};

pub const VARARGS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Deref)]
#[deref(forward)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Symbol(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_varargs(&self) -> bool {
        &*self.0 == VARARGS
    }

    /// `..1`, `..2`, ...
    pub fn is_dot_index(&self) -> bool {
        self.0
            .strip_prefix("..")
            .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Symbol(Rc::from(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Logical(Vec<bool>),
    Integer(Vec<i64>),
    Double(Vec<f64>),
    Character(Vec<Symbol>),
    List(Vec<Value>),
}

impl VectorData {
    pub fn len(&self) -> usize {
        match self {
            VectorData::Logical(v) => v.len(),
            VectorData::Integer(v) => v.len(),
            VectorData::Double(v) => v.len(),
            VectorData::Character(v) => v.len(),
            VectorData::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            VectorData::Logical(_) => "logical",
            VectorData::Integer(_) => "integer",
            VectorData::Double(_) => "double",
            VectorData::Character(_) => "character",
            VectorData::List(_) => "list",
        }
    }

    /// Position in the coercion order logical < integer < double < character < list.
    pub fn rank(&self) -> u8 {
        match self {
            VectorData::Logical(_) => 0,
            VectorData::Integer(_) => 1,
            VectorData::Double(_) => 2,
            VectorData::Character(_) => 3,
            VectorData::List(_) => 4,
        }
    }

    pub fn empty_of_rank(rank: u8) -> VectorData {
        match rank {
            0 => VectorData::Logical(Vec::new()),
            1 => VectorData::Integer(Vec::new()),
            2 => VectorData::Double(Vec::new()),
            3 => VectorData::Character(Vec::new()),
            _ => VectorData::List(Vec::new()),
        }
    }

    /// Converts to the given rank; never narrows.
    pub fn coerce_to(&self, rank: u8) -> VectorData {
        if rank <= self.rank() {
            return self.clone();
        }
        let strings = || -> Vec<Symbol> {
            (0..self.len())
                .map(|i| Symbol::from(self.format_element(i, false)))
                .collect()
        };
        match (self, rank) {
            (VectorData::Logical(v), 1) => VectorData::Integer(v.iter().map(|b| *b as i64).collect()),
            (VectorData::Logical(v), 2) => {
                VectorData::Double(v.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect())
            }
            (VectorData::Integer(v), 2) => VectorData::Double(v.iter().map(|i| *i as f64).collect()),
            (_, 3) => VectorData::Character(strings()),
            (_, _) => VectorData::List((0..self.len()).filter_map(|i| self.element(i)).collect()),
        }
    }

    /// Element `index` (0-based) as a value; atomic elements become fresh length-one vectors.
    pub fn element(&self, index: usize) -> Option<Value> {
        let value = match self {
            VectorData::Logical(v) => Value::logical(*v.get(index)?),
            VectorData::Integer(v) => Value::integer(*v.get(index)?),
            VectorData::Double(v) => Value::double(*v.get(index)?),
            VectorData::Character(v) => Value::string(v.get(index)?.as_str()),
            VectorData::List(v) => v.get(index)?.clone(),
        };
        Some(value)
    }

    pub fn format_element(&self, index: usize, quote: bool) -> String {
        match self {
            VectorData::Logical(v) => if v[index] { "TRUE" } else { "FALSE" }.to_string(),
            VectorData::Integer(v) => v[index].to_string(),
            VectorData::Double(v) => format_double(v[index]),
            VectorData::Character(v) if quote => format!("\"{}\"", v[index]),
            VectorData::Character(v) => v[index].to_string(),
            VectorData::List(v) => v[index].to_string(),
        }
    }
}

pub fn format_double(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Attributes(Vec<(Symbol, Value)>);

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n.as_str() == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: Symbol, value: Value) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.0.iter().position(|(n, _)| n.as_str() == name)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Symbol, Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn identical(&self, other: &Attributes) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(name, value)| other.get(name).is_some_and(|v| v.identical(value)))
    }
}

/// A mutable vector-like container with copy-on-write sharing state.
pub struct Vector {
    data: RefCell<VectorData>,
    attributes: RefCell<Attributes>,
    sharing: Cell<SharingState>,
}

impl Vector {
    pub fn new(data: VectorData) -> Rc<Self> {
        Self::with_attributes(data, Attributes::default())
    }

    pub fn with_attributes(data: VectorData, attributes: Attributes) -> Rc<Self> {
        Rc::new(Self {
            data: RefCell::new(data),
            attributes: RefCell::new(attributes),
            sharing: Cell::new(SharingState::Temporary),
        })
    }

    pub fn data(&self) -> Ref<'_, VectorData> {
        self.data.borrow()
    }

    pub fn attributes(&self) -> Ref<'_, Attributes> {
        self.attributes.borrow()
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.borrow().get(name).cloned()
    }

    /// The explicit `class` attribute, preserving its identity.
    pub fn class_attribute(&self) -> Option<Rc<Vector>> {
        match self.attributes.borrow().get("class") {
            Some(Value::Vector(classes))
                if matches!(&*classes.data(), VectorData::Character(names) if !names.is_empty()) =>
            {
                Some(classes.clone())
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        self.data.borrow().type_name()
    }

    pub fn sharing(&self) -> SharingState {
        self.sharing.get()
    }

    /// Moves to `state`, failing on any backwards transition.
    pub fn transition(&self, state: SharingState) -> Result<()> {
        let current = self.sharing.get();
        if state < current {
            return Err(Error::internal(format!(
                "sharing state cannot move from {} to {}",
                current, state
            )));
        }
        self.sharing.set(state);
        Ok(())
    }

    /// One step up the sharing lattice.
    pub(crate) fn promote(&self) {
        self.sharing.set(self.sharing.get().promoted());
    }

    pub(crate) fn make_permanent(&self) {
        self.sharing.set(SharingState::SharedPermanent);
    }

    pub fn element(&self, index: usize) -> Option<Value> {
        self.data.borrow().element(index)
    }

    /// Character contents, if this is a character vector.
    pub fn strings(&self) -> Option<Vec<Symbol>> {
        match &*self.data.borrow() {
            VectorData::Character(names) => Some(names.clone()),
            _ => None,
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        let state = self.sharing.get();
        if state.is_shared() {
            return Err(Error::internal(format!(
                "in-place write to a {} container",
                state
            )));
        }
        Ok(())
    }

    /// Writes element `index` (0-based) in place, appending when `index == len`.
    /// Storing `NULL` into a list removes the element.
    pub fn set_element(&self, index: usize, value: &Value) -> Result<()> {
        self.ensure_writable()?;
        let mut data = self.data.borrow_mut();
        let len = data.len();
        if index > len {
            return Err(Error::condition(
                crate::error::ConditionKind::InvalidArgument,
                "subscript out of bounds",
            ));
        }
        if let VectorData::List(items) = &mut *data {
            if value.is_null() {
                if index < len {
                    items.remove(index);
                }
            } else if index == len {
                items.push(value.clone());
            } else {
                items[index] = value.clone();
            }
            return Ok(());
        }
        let Some(incoming) = value.as_vector() else {
            return Err(Error::condition(
                crate::error::ConditionKind::InvalidArgument,
                format!("cannot store a {} in a {} vector", value.type_name(), data.type_name()),
            ));
        };
        let incoming = incoming.data().clone();
        if incoming.len() != 1 {
            return Err(Error::condition(
                crate::error::ConditionKind::InvalidArgument,
                "more elements supplied than there are to replace",
            ));
        }
        let rank = data.rank().max(incoming.rank());
        if rank > data.rank() {
            *data = data.coerce_to(rank);
        }
        match (&mut *data, incoming.coerce_to(rank)) {
            (VectorData::Logical(v), VectorData::Logical(n)) => store(v, index, n[0]),
            (VectorData::Integer(v), VectorData::Integer(n)) => store(v, index, n[0]),
            (VectorData::Double(v), VectorData::Double(n)) => store(v, index, n[0]),
            (VectorData::Character(v), VectorData::Character(n)) => store(v, index, n[0].clone()),
            (VectorData::List(v), VectorData::List(n)) => store(v, index, n[0].clone()),
            _ => return Err(Error::internal("vector coercion produced mismatched types")),
        }
        Ok(())
    }

    /// Sets or, with `None`, removes an attribute in place.
    pub fn set_attribute(&self, name: Symbol, value: Option<Value>) -> Result<()> {
        self.ensure_writable()?;
        let mut attributes = self.attributes.borrow_mut();
        match value {
            Some(value) if !value.is_null() => attributes.set(name, value),
            _ => {
                attributes.remove(&name);
            }
        }
        Ok(())
    }

    /// Shallow copy in state `Temporary`; contained containers become shared.
    pub fn duplicate(&self) -> Rc<Vector> {
        let data = self.data.borrow().clone();
        if let VectorData::List(items) = &data {
            items.iter().for_each(sharing::share);
        }
        let attributes = self.attributes.borrow().clone();
        attributes.iter().for_each(|(_, v)| sharing::share(v));
        Vector::with_attributes(data, attributes)
    }

    pub fn format_elements(&self) -> Vec<String> {
        let data = self.data.borrow();
        (0..data.len()).map(|i| data.format_element(i, false)).collect()
    }
}

fn store<T>(items: &mut Vec<T>, index: usize, value: T) {
    if index == items.len() {
        items.push(value);
    } else {
        items[index] = value;
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("data", &*self.data.borrow())
            .field("attributes", &*self.attributes.borrow())
            .field("sharing", &self.sharing.get())
            .finish()
    }
}

#[derive(Debug)]
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: EnvId,
}

/// Handle to an entry of the interpreter's builtin registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinRef {
    pub name: Symbol,
    pub id: usize,
}

/// Contents of a `...` binding: promises (or values) with their names.
#[derive(Debug, Clone, Default)]
pub struct DotArgs {
    pub names: Vec<Option<Symbol>>,
    pub values: Vec<Value>,
}

impl DotArgs {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// The distinguished marker bound to an unsupplied formal without default.
    Missing,
    Vector(Rc<Vector>),
    Closure(Rc<Closure>),
    Builtin(Rc<BuiltinRef>),
    Promise(Rc<Promise>),
    Env(EnvId),
    Dots(Rc<DotArgs>),
    Language(Expr),
}

impl Value {
    pub fn vector(data: VectorData) -> Value {
        Value::Vector(Vector::new(data))
    }

    pub fn double(value: f64) -> Value {
        Value::vector(VectorData::Double(vec![value]))
    }

    pub fn doubles(values: Vec<f64>) -> Value {
        Value::vector(VectorData::Double(values))
    }

    pub fn integer(value: i64) -> Value {
        Value::vector(VectorData::Integer(vec![value]))
    }

    pub fn logical(value: bool) -> Value {
        Value::vector(VectorData::Logical(vec![value]))
    }

    pub fn string(value: &str) -> Value {
        Value::vector(VectorData::Character(vec![Symbol::new(value)]))
    }

    pub fn strings<S: AsRef<str>>(values: &[S]) -> Value {
        Value::vector(VectorData::Character(
            values.iter().map(|s| Symbol::new(s.as_ref())).collect(),
        ))
    }

    pub fn list(values: Vec<Value>) -> Value {
        Value::vector(VectorData::List(values))
    }

    pub fn dots(args: DotArgs) -> Value {
        Value::Dots(Rc::new(args))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Missing => "missing",
            Value::Vector(v) => v.type_name(),
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
            Value::Promise(_) => "promise",
            Value::Env(_) => "environment",
            Value::Dots(_) => "...",
            Value::Language(_) => "language",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    pub fn as_vector(&self) -> Option<&Rc<Vector>> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Rc<Promise>> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// Scalar numeric view of a length-one logical, integer or double vector.
    pub fn as_f64(&self) -> Option<f64> {
        let vector = self.as_vector()?;
        let data = vector.data();
        if data.len() != 1 {
            return None;
        }
        match &*data {
            VectorData::Logical(v) => Some(if v[0] { 1.0 } else { 0.0 }),
            VectorData::Integer(v) => Some(v[0] as f64),
            VectorData::Double(v) => Some(v[0]),
            _ => None,
        }
    }

    /// First element of a character vector.
    pub fn as_symbol(&self) -> Option<Symbol> {
        match &*self.as_vector()?.data() {
            VectorData::Character(v) => v.first().cloned(),
            _ => None,
        }
    }

    /// Object identity: same container, closure, promise or environment.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.id == b.id,
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Dots(a), Value::Dots(b)) => Rc::ptr_eq(a, b),
            (Value::Env(a), Value::Env(b)) => a == b,
            (Value::Language(a), Value::Language(b)) => Rc::ptr_eq(a, b),
            (Value::Null, Value::Null) | (Value::Missing, Value::Missing) => true,
            _ => false,
        }
    }

    /// Structural equality in the sense of `identical()`.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Vector(a), Value::Vector(b)) => {
                Rc::ptr_eq(a, b)
                    || (vector_data_identical(&a.data(), &b.data())
                        && a.attributes().identical(&b.attributes()))
            }
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(&a.def, &b.def) && a.env == b.env,
            (Value::Language(a), Value::Language(b)) => {
                Rc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            _ => self.ptr_eq(other),
        }
    }
}

fn vector_data_identical(a: &VectorData, b: &VectorData) -> bool {
    match (a, b) {
        (VectorData::List(x), VectorData::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| p.identical(q))
        }
        (VectorData::Double(x), VectorData::Double(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|(p, q)| p == q || (p.is_nan() && q.is_nan()))
        }
        _ => a == b,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Missing => write!(f, "<missing>"),
            Value::Vector(v) => {
                let data = v.data();
                let elements = (0..data.len()).map(|i| data.format_element(i, true));
                match &*data {
                    VectorData::List(_) => write!(f, "list({})", elements.format(", ")),
                    _ if data.len() == 1 => write!(f, "{}", elements.format("")),
                    _ => write!(f, "c({})", elements.format(", ")),
                }
            }
            Value::Closure(c) => write!(f, "function({})", c.def.signature),
            Value::Builtin(b) => write!(f, ".Primitive(\"{}\")", b.name),
            Value::Promise(_) => write!(f, "<promise>"),
            Value::Env(id) => write!(f, "<environment: {}>", id),
            Value::Dots(d) => write!(f, "<... of {}>", d.len()),
            Value::Language(expr) => write!(f, "{}", expr),
        }
    }
}
