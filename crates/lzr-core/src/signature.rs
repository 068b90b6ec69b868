use std::fmt;
use std::rc::Rc;

use itertools::Itertools;

use crate::error::{ConditionKind, Error, Result};
use crate::value::Symbol;

/// Ordered argument names with at most one `...` slot. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgumentsSignature {
    names: Rc<[Option<Symbol>]>,
    varargs: Option<usize>,
}

impl ArgumentsSignature {
    /// Signature of a formal parameter list: every slot named, names unique.
    pub fn formals(names: Vec<Symbol>) -> Result<Self> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::condition(
                    ConditionKind::InvalidArgument,
                    format!("repeated formal argument '{}'", name),
                ));
            }
        }
        Ok(Self::new(names.into_iter().map(Some).collect()))
    }

    /// Signature of the arguments supplied at a call, after `...` expansion.
    pub fn supplied(names: Vec<Option<Symbol>>) -> Self {
        Self {
            names: names.into(),
            varargs: None,
        }
    }

    fn new(names: Vec<Option<Symbol>>) -> Self {
        let varargs = names
            .iter()
            .position(|n| n.as_ref().is_some_and(Symbol::is_varargs));
        Self {
            names: names.into(),
            varargs,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&Symbol> {
        self.names.get(index).and_then(Option::as_ref)
    }

    pub fn names(&self) -> &[Option<Symbol>] {
        &self.names
    }

    pub fn varargs_index(&self) -> Option<usize> {
        self.varargs
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|n| n.as_ref().is_some_and(|n| n.as_str() == name))
    }
}

impl fmt::Display for ArgumentsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .names
            .iter()
            .map(|n| n.as_ref().map(Symbol::as_str).unwrap_or(""))
            .format(", ");
        write!(f, "{}", rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formals_locate_varargs() {
        let sig = ArgumentsSignature::formals(vec!["x".into(), "...".into(), "y".into()]).unwrap();
        assert_eq!(sig.varargs_index(), Some(1));
        assert_eq!(sig.to_string(), "x, ..., y");
    }

    #[test]
    fn formals_reject_duplicates() {
        let err = ArgumentsSignature::formals(vec!["x".into(), "x".into()]).unwrap_err();
        assert_eq!(err.kind(), Some(ConditionKind::InvalidArgument));
    }
}
