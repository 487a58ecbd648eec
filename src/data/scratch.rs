//! Per-cell scratch storage owned by a single adaptation call.
//!
//! A [`ScratchSlots`] is acquired from the tree at the start of a balancer
//! run and released when it goes out of scope, on every exit path. Slots
//! are indexed by [`CellId::slot`]; cells created during the run (whose
//! slots may lie past the initial capacity) read the fill value until
//! written.

use crate::topology::cell::CellId;
use crate::topology::tree::AdaptiveTree;

#[derive(Clone, Debug)]
pub struct ScratchSlots<V> {
    slots: Vec<V>,
    fill: V,
}

impl<V: Clone> ScratchSlots<V> {
    /// Allocate one slot per live cell of `tree`, every slot set to `fill`.
    pub fn allocate<T: AdaptiveTree>(tree: &T, fill: V) -> Self {
        Self {
            slots: vec![fill.clone(); tree.slot_capacity()],
            fill,
        }
    }

    #[inline]
    pub fn get(&self, cell: CellId) -> &V {
        self.slots.get(cell.slot()).unwrap_or(&self.fill)
    }

    /// Mutable access, growing the storage if `cell` was created after
    /// allocation.
    pub fn get_mut(&mut self, cell: CellId) -> &mut V {
        let slot = cell.slot();
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, self.fill.clone());
        }
        &mut self.slots[slot]
    }

    #[inline]
    pub fn set(&mut self, cell: CellId, value: V) {
        *self.get_mut(cell) = value;
    }

    /// Return the slot of `cell` to the fill value.
    pub fn reset(&mut self, cell: CellId) {
        if let Some(slot) = self.slots.get_mut(cell.slot()) {
            *slot = self.fill.clone();
        }
    }
}
