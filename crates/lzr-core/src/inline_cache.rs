//! Two-tier per-call-site method cache: the last-seen class vectors by
//! identity, then a map keyed by class names.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::env::EnvId;
use crate::value::{Symbol, Value, Vector};

/// What a cached entry was resolved against. An entry only hits when the
/// stamp of the lookup equals the stamp it was stored with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheStamp {
    /// Method table version or function-definition epoch.
    pub version: u64,
    /// Environments the resolution searched.
    pub scope: Vec<EnvId>,
}

#[derive(Debug, Clone)]
pub struct CachedMethod {
    pub method: Value,
    /// Name the method was found under, e.g. `print.foo`.
    pub target: Symbol,
    /// Index of the matching class in the dispatch chain.
    pub position: usize,
    /// The group generic the method belongs to, if found through one.
    pub group: Option<Symbol>,
    /// The method is a builtin's default behavior.
    pub deferred: bool,
}

/// The class vectors are compared by identity, and their contents at the
/// time of caching are kept because a class vector can be edited in place
/// while it has a single owner.
#[derive(Debug)]
struct IdentityEntry {
    generic: Symbol,
    classes: Vec<Rc<Vector>>,
    names: Vec<Vec<Symbol>>,
    stamp: CacheStamp,
    method: CachedMethod,
}

type ValueKey = (Symbol, Vec<Vec<Symbol>>);

#[derive(Debug, Default)]
pub struct DispatchCache {
    last: RefCell<Option<IdentityEntry>>,
    by_value: RefCell<HashMap<ValueKey, (CacheStamp, CachedMethod)>>,
    identity_hits: Cell<u64>,
    value_hits: Cell<u64>,
    misses: Cell<u64>,
}

impl DispatchCache {
    pub fn lookup(
        &self,
        generic: &Symbol,
        classes: &[Rc<Vector>],
        stamp: &CacheStamp,
    ) -> Option<CachedMethod> {
        if let Some(entry) = &*self.last.borrow() {
            let same_classes = entry.classes.len() == classes.len()
                && entry.classes.iter().zip(classes).all(|(a, b)| Rc::ptr_eq(a, b))
                && entry
                    .names
                    .iter()
                    .zip(classes)
                    .all(|(names, current)| {
                        current.strings().as_deref() == Some(names.as_slice())
                    });
            if same_classes && entry.generic == *generic && entry.stamp == *stamp {
                self.identity_hits.set(self.identity_hits.get() + 1);
                return Some(entry.method.clone());
            }
        }

        let key = value_key(generic, classes);
        let found = match self.by_value.borrow().get(&key) {
            Some((entry_stamp, method)) if entry_stamp == stamp => Some(method.clone()),
            _ => None,
        };
        match found {
            Some(method) => {
                self.value_hits.set(self.value_hits.get() + 1);
                self.remember(generic, classes, stamp, &method);
                Some(method)
            }
            None => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    pub fn insert(
        &self,
        generic: &Symbol,
        classes: &[Rc<Vector>],
        stamp: &CacheStamp,
        method: CachedMethod,
    ) {
        self.remember(generic, classes, stamp, &method);
        self.by_value
            .borrow_mut()
            .insert(value_key(generic, classes), (stamp.clone(), method));
    }

    fn remember(
        &self,
        generic: &Symbol,
        classes: &[Rc<Vector>],
        stamp: &CacheStamp,
        method: &CachedMethod,
    ) {
        *self.last.borrow_mut() = Some(IdentityEntry {
            generic: generic.clone(),
            classes: classes.to_vec(),
            names: value_key(generic, classes).1,
            stamp: stamp.clone(),
            method: method.clone(),
        });
    }

    pub fn identity_hits(&self) -> u64 {
        self.identity_hits.get()
    }

    pub fn value_hits(&self) -> u64 {
        self.value_hits.get()
    }

    pub fn misses(&self) -> u64 {
        self.misses.get()
    }
}

fn value_key(generic: &Symbol, classes: &[Rc<Vector>]) -> ValueKey {
    let names = classes
        .iter()
        .map(|c| c.strings().unwrap_or_default())
        .collect();
    (generic.clone(), names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::VectorData;

    fn classes(names: &[&str]) -> Rc<Vector> {
        Vector::new(VectorData::Character(names.iter().map(|n| Symbol::new(n)).collect()))
    }

    fn method(name: &str) -> CachedMethod {
        CachedMethod {
            method: Value::Null,
            target: Symbol::new(name),
            position: 0,
            group: None,
            deferred: false,
        }
    }

    #[test]
    fn equal_but_distinct_class_vectors_hit_the_value_tier() {
        let cache = DispatchCache::default();
        let generic = Symbol::new("g");
        let stamp = CacheStamp {
            version: 1,
            scope: Vec::new(),
        };
        let first = classes(&["a", "b"]);
        cache.insert(&generic, &[first.clone()], &stamp, method("g.a"));

        assert!(cache.lookup(&generic, &[first.clone()], &stamp).is_some());
        assert_eq!(cache.identity_hits(), 1);

        let second = classes(&["a", "b"]);
        assert!(cache.lookup(&generic, &[second], &stamp).is_some());
        assert_eq!(cache.value_hits(), 1);
    }

    #[test]
    fn class_vector_edited_in_place_misses_the_identity_tier() -> crate::Result<()> {
        let cache = DispatchCache::default();
        let generic = Symbol::new("g");
        let stamp = CacheStamp {
            version: 1,
            scope: Vec::new(),
        };
        let cls = classes(&["a"]);
        cache.insert(&generic, &[cls.clone()], &stamp, method("g.a"));

        cls.set_element(0, &Value::string("z"))?;
        assert!(cache.lookup(&generic, &[cls], &stamp).is_none());
        assert_eq!(cache.identity_hits(), 0);
        assert_eq!(cache.misses(), 1);
        Ok(())
    }

    #[test]
    fn stale_stamp_misses() {
        let cache = DispatchCache::default();
        let generic = Symbol::new("g");
        let cls = classes(&["a"]);
        let old = CacheStamp {
            version: 1,
            scope: Vec::new(),
        };
        cache.insert(&generic, &[cls.clone()], &old, method("g.a"));

        let new = CacheStamp {
            version: 2,
            scope: Vec::new(),
        };
        assert!(cache.lookup(&generic, &[cls], &new).is_none());
        assert_eq!(cache.misses(), 1);
    }
}
