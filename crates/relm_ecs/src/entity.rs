//! Generational entity handles.
//!
//! An [`EntityId`] pairs a slot index with a generation counter. When a slot
//! is recycled its generation increments, so a handle kept past its entity's
//! destruction never resolves to the slot's next occupant.
//!
//! ```text
//! EntityId { index: 5, generation: 0 }  <- original
//! EntityId { index: 5, generation: 1 }  <- after recycle
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl EntityId {
    /// Slot index. Useful for diagnostics, not for lookups.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = EntityId {
            index: 3,
            generation: 2,
        };
        assert_eq!(e.to_string(), "Entity(3v2)");
        assert_eq!(format!("{e:?}"), "Entity(3v2)");
    }

    #[test]
    fn test_ordering_is_by_index_then_generation() {
        let a = EntityId {
            index: 1,
            generation: 5,
        };
        let b = EntityId {
            index: 2,
            generation: 0,
        };
        assert!(a < b);
    }
}
