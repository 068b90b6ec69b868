//! Matching of supplied arguments to formal parameters.
//!
//! Order: exact names, then unique prefixes of formals before `...`, then
//! positional filling of formals before `...`. Whatever is left goes to `...`
//! in call order, or is an error when there is no `...`.

use lzr_core::signature::ArgumentsSignature;
use lzr_core::value::Symbol;
use thiserror::Error;

/// What a formal is bound to after matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormalSlot {
    /// Index into the supplied arguments.
    Supplied(usize),
    /// The `...` formal with the supplied indices it collects.
    Varargs(Vec<usize>),
    /// Nothing matched: the default, or the missing marker.
    Unfilled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPermutation {
    pub slots: Vec<FormalSlot>,
}

impl MatchPermutation {
    /// The formal a supplied argument was matched to, unless it went to `...`.
    pub fn formal_of(&self, supplied: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, FormalSlot::Supplied(i) if *i == supplied))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Positional arguments beyond a formal list without `...`.
    #[error("too many positional arguments: {0:?}")]
    TooManyPositional(Vec<usize>),
    /// Leftover arguments, at least one of them named.
    #[error("unused arguments: {0:?}")]
    Unused(Vec<usize>),
    #[error("formal argument \"{0}\" matched by multiple actual arguments")]
    FormalMatchedMultiple(Symbol),
    #[error("argument {} matches multiple formal arguments", .0 + 1)]
    AmbiguousPartialMatch(usize),
}

pub fn match_arguments(
    formals: &ArgumentsSignature,
    supplied: &ArgumentsSignature,
    partial: bool,
) -> Result<MatchPermutation, MatchError> {
    let varargs = formals.varargs_index();
    let before_varargs = varargs.unwrap_or(formals.len());
    let mut bound: Vec<Option<usize>> = vec![None; formals.len()];
    let mut exact = vec![false; formals.len()];
    let mut used = vec![false; supplied.len()];

    let supplied_name = |i: usize| supplied.name(i).filter(|n| !n.is_empty());

    for i in 0..supplied.len() {
        let Some(name) = supplied_name(i) else {
            continue;
        };
        let Some(formal) = formals.index_of(name).filter(|f| Some(*f) != varargs) else {
            continue;
        };
        if bound[formal].is_some() {
            return Err(MatchError::FormalMatchedMultiple(name.clone()));
        }
        bound[formal] = Some(i);
        exact[formal] = true;
        used[i] = true;
    }

    if partial {
        for i in 0..supplied.len() {
            if used[i] {
                continue;
            }
            let Some(name) = supplied_name(i) else {
                continue;
            };
            let candidates: Vec<usize> = (0..before_varargs)
                .filter(|f| !exact[*f])
                .filter(|f| {
                    formals
                        .name(*f)
                        .is_some_and(|formal| formal.starts_with(name.as_str()))
                })
                .collect();
            match candidates.as_slice() {
                [] => {}
                [formal] => {
                    if bound[*formal].is_some() {
                        let formal_name = formals.name(*formal).cloned().unwrap_or_else(|| name.clone());
                        return Err(MatchError::FormalMatchedMultiple(formal_name));
                    }
                    bound[*formal] = Some(i);
                    used[i] = true;
                }
                _ => return Err(MatchError::AmbiguousPartialMatch(i)),
            }
        }
    }

    let mut next_formal = 0;
    for i in 0..supplied.len() {
        if used[i] || supplied_name(i).is_some() {
            continue;
        }
        while next_formal < before_varargs && bound[next_formal].is_some() {
            next_formal += 1;
        }
        if next_formal >= before_varargs {
            break;
        }
        bound[next_formal] = Some(i);
        used[i] = true;
        next_formal += 1;
    }

    let leftovers: Vec<usize> = (0..supplied.len()).filter(|i| !used[*i]).collect();
    let mut slots: Vec<FormalSlot> = bound
        .into_iter()
        .map(|b| b.map(FormalSlot::Supplied).unwrap_or(FormalSlot::Unfilled))
        .collect();
    match varargs {
        Some(index) => slots[index] = FormalSlot::Varargs(leftovers),
        None if leftovers.is_empty() => {}
        None if leftovers.iter().any(|i| supplied_name(*i).is_some()) => {
            return Err(MatchError::Unused(leftovers))
        }
        None => return Err(MatchError::TooManyPositional(leftovers)),
    }

    Ok(MatchPermutation { slots })
}
