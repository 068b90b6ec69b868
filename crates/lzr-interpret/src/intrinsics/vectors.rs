//! Vector construction, element access and replacement.

use std::rc::Rc;

use lzr_core::sharing;
use lzr_core::value::{Symbol, Value, Vector, VectorData};

use super::{BuiltinArgs, IntrinsicFunction, InternalDispatch};
use crate::condition_bail;
use crate::engine::EvalResult;
use crate::error::invalid_argument;

// ===== CONSTRUCTION =====

/// c(...) - concatenate into the highest ranked vector type
pub fn intrinsic_c() -> IntrinsicFunction {
    IntrinsicFunction::strict("c", |_interp, args| {
        let values: Vec<&Value> = args.values.iter().filter(|v| !v.is_null()).collect();
        if values.is_empty() {
            return Ok(Value::Null);
        }
        let mut rank = 0;
        for value in &values {
            match value.as_vector() {
                Some(vector) => rank = rank.max(vector.data().rank()),
                None => rank = VectorData::List(Vec::new()).rank(),
            }
        }
        let mut result = VectorData::empty_of_rank(rank);
        for value in values {
            match (&mut result, value.as_vector()) {
                (VectorData::List(items), Some(vector)) => match &*vector.data() {
                    VectorData::List(children) => {
                        children.iter().for_each(sharing::share);
                        items.extend(children.iter().cloned());
                    }
                    data => items.extend((0..data.len()).filter_map(|i| data.element(i))),
                },
                (VectorData::List(items), None) => {
                    sharing::share(value);
                    items.push(value.clone());
                }
                (result, Some(vector)) => append(result, &vector.data().coerce_to(rank)),
                (_, None) => condition_bail!(
                    InvalidArgument,
                    "cannot combine a {} with atomic values",
                    value.type_name()
                ),
            }
        }
        Ok(Value::vector(result))
    })
    .pure()
}

fn append(target: &mut VectorData, source: &VectorData) {
    match (target, source) {
        (VectorData::Logical(t), VectorData::Logical(s)) => t.extend_from_slice(s),
        (VectorData::Integer(t), VectorData::Integer(s)) => t.extend_from_slice(s),
        (VectorData::Double(t), VectorData::Double(s)) => t.extend_from_slice(s),
        (VectorData::Character(t), VectorData::Character(s)) => t.extend_from_slice(s),
        (VectorData::List(t), VectorData::List(s)) => t.extend_from_slice(s),
        _ => {}
    }
}

/// list(...) - a list owning each of its arguments
pub fn intrinsic_list() -> IntrinsicFunction {
    IntrinsicFunction::strict("list", |_interp, args| {
        args.values.iter().for_each(sharing::share);
        let vector = Vector::new(VectorData::List(args.values.clone()));
        if args.names.iter().any(Option::is_some) {
            let names = args
                .names
                .iter()
                .map(|n| n.clone().unwrap_or_else(|| Symbol::new("")))
                .collect();
            vector.set_attribute(
                Symbol::new("names"),
                Some(Value::vector(VectorData::Character(names))),
            )?;
        }
        Ok(Value::Vector(vector))
    })
    .pure()
}

// ===== ACCESS =====

/// Zero-based position addressed by a `[[` index: a 1-based number or an
/// element name.
fn resolve_index(vector: &Vector, index: &Value, allow_append: bool) -> EvalResult<Option<usize>> {
    if let Some(name) = index.as_symbol() {
        let names = vector
            .attribute("names")
            .and_then(|n| n.as_vector().and_then(|v| v.strings()))
            .unwrap_or_default();
        return Ok(names.iter().position(|n| *n == name));
    }
    let Some(position) = index.as_f64() else {
        condition_bail!(InvalidArgument, "invalid subscript type '{}'", index.type_name());
    };
    if position < 1.0 || position.fract() != 0.0 {
        condition_bail!(InvalidArgument, "subscript out of bounds");
    }
    let position = position as usize - 1;
    if position < vector.len() || (allow_append && position == vector.len()) {
        Ok(Some(position))
    } else {
        Ok(None)
    }
}

/// x[[i]] - extract one element
pub fn intrinsic_index() -> IntrinsicFunction {
    IntrinsicFunction::strict("[[", |_interp, args| {
        let target = args.required("x", 0)?.clone();
        let index = args.required("i", 1)?.clone();
        let Some(vector) = target.as_vector() else {
            condition_bail!(InvalidArgument, "object of type '{}' is not subsettable", target.type_name());
        };
        let Some(position) = resolve_index(vector, &index, false)? else {
            condition_bail!(InvalidArgument, "subscript out of bounds");
        };
        let element = vector.element(position).unwrap_or(Value::Null);
        sharing::update_child_on_assign(&target, &element);
        Ok(element)
    })
    .pure()
    .with_dispatch(InternalDispatch::Generic)
}

/// `[[<-`(x, i, value) - replace one element, copying `x` first if it is shared
pub fn intrinsic_index_assign() -> IntrinsicFunction {
    IntrinsicFunction::strict("[[<-", |_interp, args| {
        let target = args.required("x", 0)?.clone();
        let index = args.required("i", 1)?.clone();
        let value = args.required("value", 2)?.clone();
        let vector = match &target {
            Value::Vector(vector) => sharing::make_mutable(vector),
            Value::Null => Vector::new(VectorData::List(Vec::new())),
            other => condition_bail!(
                InvalidArgument,
                "object of type '{}' is not subsettable",
                other.type_name()
            ),
        };
        let position = match resolve_index(&vector, &index, true)? {
            Some(position) => position,
            None => match index.as_symbol() {
                Some(name) => append_name(&vector, name)?,
                None => condition_bail!(InvalidArgument, "subscript out of bounds"),
            },
        };
        let already_there = vector.element(position).is_some_and(|e| e.ptr_eq(&value));
        if !already_there && matches!(&*vector.data(), VectorData::List(_)) {
            sharing::share(&value);
        }
        vector.set_element(position, &value)?;
        Ok(Value::Vector(vector))
    })
}

/// Position of a new element appended under `name`.
fn append_name(vector: &Rc<Vector>, name: Symbol) -> EvalResult<usize> {
    let position = vector.len();
    let mut names = vector
        .attribute("names")
        .and_then(|n| n.as_vector().and_then(|v| v.strings()))
        .unwrap_or_else(|| vec![Symbol::new(""); position]);
    names.push(name);
    vector.set_attribute(
        Symbol::new("names"),
        Some(Value::vector(VectorData::Character(names))),
    )?;
    Ok(position)
}

/// length(x)
pub fn intrinsic_length() -> IntrinsicFunction {
    IntrinsicFunction::strict("length", |_interp, args| {
        let length = match args.arg("x", 0) {
            None | Some(Value::Null) => 0,
            Some(Value::Vector(vector)) => vector.len(),
            Some(Value::Dots(dots)) => dots.len(),
            Some(_) => 1,
        };
        Ok(Value::integer(length as i64))
    })
    .pure()
    .with_dispatch(InternalDispatch::Generic)
}

/// identical(x, y)
pub fn intrinsic_identical() -> IntrinsicFunction {
    IntrinsicFunction::strict("identical", |_interp, args| {
        let x = args.required("x", 0)?;
        let y = args.required("y", 1)?;
        Ok(Value::logical(x.identical(y)))
    })
    .pure()
}

/// is.null(x)
pub fn intrinsic_is_null() -> IntrinsicFunction {
    IntrinsicFunction::strict("is.null", |_interp, args| {
        Ok(Value::logical(args.arg("x", 0).map_or(true, Value::is_null)))
    })
    .pure()
}

pub(crate) fn expect_string(args: &BuiltinArgs, name: &str, position: usize) -> EvalResult<Symbol> {
    match args.required(name, position)?.as_symbol() {
        Some(text) => Ok(text),
        None => Err(invalid_argument(format!("invalid '{}' argument", name)).into()),
    }
}
