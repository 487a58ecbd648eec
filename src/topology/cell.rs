//! `CellId`: a generational handle for tree cells
//!
//! Cells live in slots of an arena that are recycled after coarsening. A
//! `CellId` pairs the slot index with the slot generation so a handle kept
//! across a collapse (for example inside a priority queue) can be recognised
//! as stale instead of silently aliasing the slot's next occupant.
//!
//! This module provides:
//! - The `CellId` handle with accessors for slot and generation.
//! - Formatting traits so handles print compactly in logs and errors.

use std::fmt;

/// Handle of a cell in an [`AdaptiveTree`](crate::topology::tree::AdaptiveTree).
///
/// Ordering is by slot index first, then generation; it carries no spatial
/// meaning.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    index: u32,
    generation: u32,
}

impl CellId {
    /// Creates a handle from a slot index and a slot generation.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index, suitable for indexing per-cell scratch arrays.
    #[inline]
    pub const fn slot(self) -> usize {
        self.index as usize
    }

    /// Generation of the slot at the time the handle was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

// -----------------------------------------------------------------------------
// Formatting traits
// -----------------------------------------------------------------------------

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellId")
            .field(&self.index)
            .field(&self.generation)
            .finish()
    }
}

/// Prints `slot.generation`, e.g. `17.2`.
impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_round_trip() {
        let id = CellId::new(7, 3);
        assert_eq!(id.slot(), 7);
        assert_eq!(id.generation(), 3);
    }

    #[test]
    fn generations_distinguish_reused_slots() {
        let old = CellId::new(4, 0);
        let new = CellId::new(4, 1);
        assert_ne!(old, new);
        assert_eq!(old.slot(), new.slot());
    }

    #[test]
    fn display_and_debug() {
        let id = CellId::new(17, 2);
        assert_eq!(format!("{id}"), "17.2");
        assert_eq!(format!("{id:?}"), "CellId(17, 2)");
    }
}
