//! Attributes, classes and the method-dispatch builtins.

use lzr_core::class::{class_hierarchy, class_names};
use lzr_core::sharing;
use lzr_core::value::{Symbol, Value, Vector, VectorData};

use super::{expect_string, IntrinsicFunction};
use crate::condition_bail;
use crate::engine::EvalResult;

/// Writable container for attribute replacement, copying a shared `x`.
fn writable(value: &Value) -> EvalResult<std::rc::Rc<Vector>> {
    match value {
        Value::Vector(vector) => Ok(sharing::make_mutable(vector)),
        Value::Null => condition_bail!(InvalidArgument, "attempt to set an attribute on NULL"),
        other => condition_bail!(
            InvalidArgument,
            "cannot set attributes on a {}",
            other.type_name()
        ),
    }
}

/// Stores `value` as attribute `name` of `vector`; the attribute is a new owner.
fn store_attribute(vector: &Vector, name: Symbol, value: &Value) -> EvalResult<()> {
    let already_there = vector.attribute(&name).is_some_and(|v| v.ptr_eq(value));
    if !already_there {
        sharing::share(value);
    }
    vector.set_attribute(name, Some(value.clone()))?;
    Ok(())
}

// ===== ATTRIBUTES =====

/// attr(x, which)
pub fn intrinsic_attr() -> IntrinsicFunction {
    IntrinsicFunction::strict("attr", |_interp, args| {
        let target = args.required("x", 0)?.clone();
        let which = expect_string(args, "which", 1)?;
        let value = target
            .as_vector()
            .and_then(|v| v.attribute(&which))
            .unwrap_or(Value::Null);
        sharing::update_child_on_assign(&target, &value);
        Ok(value)
    })
    .pure()
}

/// `attr<-`(x, which, value)
pub fn intrinsic_attr_assign() -> IntrinsicFunction {
    IntrinsicFunction::strict("attr<-", |_interp, args| {
        let vector = writable(args.required("x", 0)?)?;
        let which = expect_string(args, "which", 1)?;
        match args.arg("value", 2) {
            Some(value) if !value.is_null() => store_attribute(&vector, which, value)?,
            _ => vector.set_attribute(which, None)?,
        }
        Ok(Value::Vector(vector))
    })
}

/// structure(.Data, ...) - `.Data` with the named arguments as attributes
pub fn intrinsic_structure() -> IntrinsicFunction {
    IntrinsicFunction::strict("structure", |_interp, args| {
        let vector = writable(args.required(".Data", 0)?)?;
        for (name, value) in args.rest(&[".Data"]) {
            let Some(name) = name else {
                continue;
            };
            if value.is_null() {
                vector.set_attribute(name, None)?;
            } else {
                store_attribute(&vector, name, &value)?;
            }
        }
        Ok(Value::Vector(vector))
    })
}

// ===== CLASSES =====

/// class(x) - the explicit class attribute, or the implicit class
pub fn intrinsic_class() -> IntrinsicFunction {
    IntrinsicFunction::strict("class", |interp, args| {
        let target = args.arg("x", 0).cloned().unwrap_or(Value::Null);
        if let Some(classes) = target.as_vector().and_then(|v| v.class_attribute()) {
            let classes = Value::Vector(classes);
            sharing::update_child_on_assign(&target, &classes);
            return Ok(classes);
        }
        let implicit = class_names(&class_hierarchy(&target, &interp.implicit));
        let shown = match implicit.as_slice() {
            [kind, numeric] if kind.as_str() == "double" => numeric.clone(),
            [first, ..] => first.clone(),
            [] => Symbol::new("NULL"),
        };
        Ok(Value::string(&shown))
    })
    .pure()
}

/// oldClass(x) - the class attribute only
pub fn intrinsic_old_class() -> IntrinsicFunction {
    IntrinsicFunction::strict("oldClass", |_interp, args| {
        let Some(target) = args.arg("x", 0) else {
            return Ok(Value::Null);
        };
        let classes = target
            .as_vector()
            .and_then(|v| v.class_attribute())
            .map(Value::Vector)
            .unwrap_or(Value::Null);
        sharing::update_child_on_assign(target, &classes);
        Ok(classes)
    })
    .pure()
}

/// `class<-`(x, value)
pub fn intrinsic_class_assign() -> IntrinsicFunction {
    IntrinsicFunction::strict("class<-", |_interp, args| {
        let vector = writable(args.required("x", 0)?)?;
        match args.arg("value", 1) {
            Some(value) if !value.is_null() => {
                store_attribute(&vector, Symbol::new("class"), value)?
            }
            _ => vector.set_attribute(Symbol::new("class"), None)?,
        }
        Ok(Value::Vector(vector))
    })
}

/// unclass(x) - `x` without its class attribute
pub fn intrinsic_unclass() -> IntrinsicFunction {
    IntrinsicFunction::strict("unclass", |_interp, args| {
        let target = args.required("x", 0)?;
        let Some(vector) = target.as_vector() else {
            return Ok(target.clone());
        };
        if vector.class_attribute().is_none() {
            return Ok(target.clone());
        }
        let copy = vector.duplicate();
        copy.set_attribute(Symbol::new("class"), None)?;
        Ok(Value::Vector(copy))
    })
    .pure()
}

/// inherits(x, what)
pub fn intrinsic_inherits() -> IntrinsicFunction {
    IntrinsicFunction::strict("inherits", |interp, args| {
        let target = args.required("x", 0)?;
        let what = args
            .required("what", 1)?
            .as_vector()
            .and_then(|v| v.strings())
            .unwrap_or_default();
        let classes = class_names(&class_hierarchy(target, &interp.implicit));
        Ok(Value::logical(classes.iter().any(|c| what.contains(c))))
    })
    .pure()
}

// ===== S3 DISPATCH =====

/// UseMethod(generic, object) - dispatches and returns from the calling function
pub fn intrinsic_use_method() -> IntrinsicFunction {
    IntrinsicFunction::special("UseMethod", |interp, call| {
        let Some(generic) = call.arg("generic", 0) else {
            condition_bail!(Arity, "'UseMethod' called with no arguments");
        };
        let generic = interp.eval(generic, call.env, call.caller)?;
        let Some(generic) = generic.as_symbol() else {
            condition_bail!(InvalidArgument, "'generic' argument must be a character string");
        };
        let object = match call.arg("object", 1) {
            Some(expr) => Some(interp.eval(expr, call.env, call.caller)?),
            None => None,
        };
        interp.use_method(&generic, object, call)
    })
}

/// NextMethod() - the method after the current one in the class chain
pub fn intrinsic_next_method() -> IntrinsicFunction {
    IntrinsicFunction::special("NextMethod", |interp, call| interp.next_method(call))
}

/// registerS3method(generic, class, method)
pub fn intrinsic_register_s3_method() -> IntrinsicFunction {
    IntrinsicFunction::strict("registerS3method", |interp, args| {
        let generic = expect_string(args, "genname", 0)?;
        let class = expect_string(args, "class", 1)?;
        let method = args.required("method", 2)?.clone();
        if !method.is_function() {
            condition_bail!(InvalidArgument, "'method' must be a function");
        }
        interp.register_s3_method(&generic, &class, method);
        Ok(Value::Null)
    })
}

// ===== S4 DISPATCH =====

/// standardGeneric(f) - dispatches on the signature arguments of the calling generic
pub fn intrinsic_standard_generic() -> IntrinsicFunction {
    IntrinsicFunction::special("standardGeneric", |interp, call| {
        let Some(name) = call.arg("f", 0) else {
            condition_bail!(Arity, "argument \"f\" is missing, with no default");
        };
        let name = interp.eval(name, call.env, call.caller)?;
        let Some(name) = name.as_symbol() else {
            condition_bail!(InvalidArgument, "argument 'f' must be a string");
        };
        interp.standard_generic(&name, call)
    })
}

/// setClass(Class, contains = character())
pub fn intrinsic_set_class() -> IntrinsicFunction {
    IntrinsicFunction::strict("setClass", |interp, args| {
        let name = expect_string(args, "Class", 0)?;
        let contains = args
            .arg("contains", 1)
            .and_then(|v| v.as_vector())
            .and_then(|v| v.strings())
            .unwrap_or_default();
        interp.s4.classes.define(name.clone(), contains);
        Ok(Value::string(&name))
    })
}

/// setGeneric(name, def)
pub fn intrinsic_set_generic() -> IntrinsicFunction {
    IntrinsicFunction::strict("setGeneric", |interp, args| {
        let name = expect_string(args, "name", 0)?;
        let def = args.arg("def", 1).cloned();
        interp.set_generic(&name, def, args)?;
        Ok(Value::string(&name))
    })
}

/// setMethod(f, signature, definition)
pub fn intrinsic_set_method() -> IntrinsicFunction {
    IntrinsicFunction::strict("setMethod", |interp, args| {
        let name = expect_string(args, "f", 0)?;
        let signature = args
            .required("signature", 1)?
            .as_vector()
            .and_then(|v| v.strings())
            .unwrap_or_default();
        let definition = args.required("definition", 2)?.clone();
        if !definition.is_function() {
            condition_bail!(InvalidArgument, "'definition' must be a function");
        }
        interp.set_method(&name, &signature, definition, args)?;
        Ok(Value::string(&name))
    })
}

/// new(Class, ...) - a list of the named slots carrying the class
pub fn intrinsic_new() -> IntrinsicFunction {
    IntrinsicFunction::strict("new", |interp, args| {
        let class = expect_string(args, "Class", 0)?;
        if !interp.s4.classes.contains(&class) {
            condition_bail!(
                InvalidArgument,
                "undefined class \"{}\"",
                class
            );
        }
        let mut slots = args.rest(&["Class"]);
        let class_named = args.names.iter().flatten().any(|n| n.as_str() == "Class");
        if !class_named {
            if let Some(position) = slots.iter().position(|(n, _)| n.is_none()) {
                slots.remove(position);
            }
        }
        let names: Vec<Symbol> = slots
            .iter()
            .map(|(n, _)| n.clone().unwrap_or_else(|| Symbol::new("")))
            .collect();
        let values: Vec<Value> = slots.into_iter().map(|(_, v)| v).collect();
        values.iter().for_each(sharing::share);
        let object = Vector::new(VectorData::List(values));
        if !names.is_empty() {
            object.set_attribute(
                Symbol::new("names"),
                Some(Value::vector(VectorData::Character(names))),
            )?;
        }
        object.set_attribute(Symbol::new("class"), Some(Value::string(&class)))?;
        Ok(Value::Vector(object))
    })
}
