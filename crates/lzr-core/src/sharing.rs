//! Copy-on-write bookkeeping for mutable containers.
//!
//! Every [`Vector`] carries a [`SharingState`]. A container may be written in
//! place while it is `Temporary` or `NonShared`; once `Shared` every writer
//! must work on a copy obtained through [`make_mutable`].

use std::rc::Rc;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::value::{Value, Vector};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
pub enum SharingState {
    /// Freshly produced, reachable only from the expression that made it.
    Temporary,
    /// Bound to exactly one owner.
    NonShared,
    /// Reachable from more than one owner.
    Shared,
    /// Never writable again, e.g. literal constants.
    SharedPermanent,
}

impl SharingState {
    pub fn is_shared(self) -> bool {
        matches!(self, SharingState::Shared | SharingState::SharedPermanent)
    }

    pub fn is_temporary(self) -> bool {
        self == SharingState::Temporary
    }

    /// One step up the lattice; `Shared` and `SharedPermanent` are fixed points.
    pub fn promoted(self) -> Self {
        match self {
            SharingState::Temporary => SharingState::NonShared,
            SharingState::NonShared => SharingState::Shared,
            other => other,
        }
    }
}

/// Records one more owner of `value`.
pub fn share(value: &Value) {
    if let Some(vector) = value.as_vector() {
        vector.promote();
    }
}

pub fn mark_permanent(value: &Value) {
    if let Some(vector) = value.as_vector() {
        vector.make_permanent();
    }
}

pub fn is_shared(value: &Value) -> bool {
    value
        .as_vector()
        .map(|vector| vector.sharing().is_shared())
        .unwrap_or(false)
}

/// Adjusts `child` after it has been stored into or extracted from `owner`.
pub fn update_child_on_assign(owner: &Value, child: &Value) {
    let (Some(owner), Some(child)) = (owner.as_vector(), child.as_vector()) else {
        return;
    };
    if Rc::ptr_eq(owner, child) || child.sharing().is_shared() {
        return;
    }
    let owner_state = owner.sharing();
    if owner_state.is_temporary() {
        return;
    }
    if child.sharing().is_temporary() {
        child.promote();
    }
    if owner_state.is_shared() {
        child.promote();
    }
}

/// Returns a container that may be written in place: `vector` itself unless it
/// is shared, in which case a fresh `Temporary` copy.
pub fn make_mutable(vector: &Rc<Vector>) -> Rc<Vector> {
    if vector.sharing().is_shared() {
        vector.duplicate()
    } else {
        vector.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_monotone() {
        let states = [
            SharingState::Temporary,
            SharingState::NonShared,
            SharingState::Shared,
            SharingState::SharedPermanent,
        ];
        for state in states {
            assert!(state.promoted() >= state);
        }
        assert_eq!(SharingState::Shared.promoted(), SharingState::Shared);
    }
}
