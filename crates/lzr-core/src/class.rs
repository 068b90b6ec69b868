//! Class hierarchies of values.

use std::rc::Rc;

use itertools::Itertools;

use crate::sharing;
use crate::value::{Symbol, Value, Vector, VectorData};

/// Implicit class chains, interned once per interpreter context so repeated
/// dispatch on plain values sees reference-identical vectors.
#[derive(Debug)]
pub struct ImplicitClasses {
    logical: Rc<Vector>,
    integer: Rc<Vector>,
    double: Rc<Vector>,
    character: Rc<Vector>,
    list: Rc<Vector>,
    function: Rc<Vector>,
    null: Rc<Vector>,
    environment: Rc<Vector>,
    language: Rc<Vector>,
    missing: Rc<Vector>,
}

fn interned(names: &[&str]) -> Rc<Vector> {
    let vector = Vector::new(VectorData::Character(
        names.iter().map(|n| Symbol::new(n)).collect(),
    ));
    sharing::mark_permanent(&Value::Vector(vector.clone()));
    vector
}

impl ImplicitClasses {
    pub fn new() -> Self {
        Self {
            logical: interned(&["logical"]),
            integer: interned(&["integer", "numeric"]),
            double: interned(&["double", "numeric"]),
            character: interned(&["character"]),
            list: interned(&["list"]),
            function: interned(&["function"]),
            null: interned(&["NULL"]),
            environment: interned(&["environment"]),
            language: interned(&["call"]),
            missing: interned(&["missing"]),
        }
    }

    pub fn for_value(&self, value: &Value) -> Rc<Vector> {
        let vector = match value {
            Value::Vector(v) => match &*v.data() {
                VectorData::Logical(_) => &self.logical,
                VectorData::Integer(_) => &self.integer,
                VectorData::Double(_) => &self.double,
                VectorData::Character(_) => &self.character,
                VectorData::List(_) => &self.list,
            },
            Value::Closure(_) | Value::Builtin(_) => &self.function,
            Value::Env(_) => &self.environment,
            Value::Language(_) => &self.language,
            Value::Missing => &self.missing,
            Value::Null | Value::Promise(_) | Value::Dots(_) => &self.null,
        };
        vector.clone()
    }
}

impl Default for ImplicitClasses {
    fn default() -> Self {
        Self::new()
    }
}

/// The explicit `class` attribute if set, otherwise the implicit chain.
pub fn class_hierarchy(value: &Value, implicit: &ImplicitClasses) -> Rc<Vector> {
    value
        .as_vector()
        .and_then(|v| v.class_attribute())
        .unwrap_or_else(|| implicit.for_value(value))
}

/// Whether `value` carries an explicit class attribute.
pub fn is_object(value: &Value) -> bool {
    value
        .as_vector()
        .is_some_and(|v| v.class_attribute().is_some())
}

pub fn class_names(classes: &Vector) -> Vec<Symbol> {
    classes.strings().unwrap_or_default()
}

/// Dispatch key for one or more class names: `#`-joined for multi-dispatch.
pub fn dispatch_key(names: &[Symbol]) -> String {
    names.iter().join("#")
}

/// R-style rendering of a class chain for messages: `"foo"` or `c('a', 'b')`.
pub fn describe_classes(names: &[Symbol]) -> String {
    match names {
        [single] => format!("\"{}\"", single),
        _ => format!(
            "\"c({})\"",
            names.iter().map(|n| format!("'{}'", n)).join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn implicit_chains_are_interned() {
        let implicit = ImplicitClasses::new();
        let a = class_hierarchy(&Value::double(1.0), &implicit);
        let b = class_hierarchy(&Value::double(2.0), &implicit);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(class_names(&a), vec![Symbol::new("double"), Symbol::new("numeric")]);
    }

    #[test]
    fn describes_chains_like_r() {
        let names = vec![Symbol::new("a"), Symbol::new("b")];
        assert_eq!(describe_classes(&names), "\"c('a', 'b')\"");
        assert_eq!(dispatch_key(&names), "a#b");
    }
}
