//! Graded refinement and predicate-driven coarsening for [`Forest`].
//!
//! Both mutations keep adjacent leaves (sharing a face or a corner) within one
//! level of each other: refinement first splits coarser neighbors, coarsening
//! refuses collapses that would leave a leaf next to grandchildren.

use super::Forest;
use crate::topology::cell::CellId;
use crate::topology::tree::{AdaptiveTree, CoarsenVisitor};
use itertools::Itertools;
use std::collections::HashSet;

/// All `3^D - 1` lattice offsets to face, edge and corner neighbors.
pub fn neighbor_offsets<const D: usize>() -> Vec<[i64; D]> {
    (0..D)
        .map(|_| -1i64..=1)
        .multi_cartesian_product()
        .filter(|offset| offset.iter().any(|&o| o != 0))
        .map(|offset| {
            let mut out = [0i64; D];
            out.copy_from_slice(&offset);
            out
        })
        .collect()
}

fn shifted<const D: usize>(coords: [i64; D], offset: &[i64; D]) -> [i64; D] {
    let mut out = coords;
    for axis in 0..D {
        out[axis] += offset[axis];
    }
    out
}

impl<const D: usize> Forest<D> {
    /// Children of `neighbor` that touch the cell sitting at `-offset` from it.
    fn touching_children<'a>(
        &'a self,
        neighbor: CellId,
        offset: &'a [i64; D],
    ) -> impl Iterator<Item = CellId> + 'a {
        self.children(neighbor).iter().copied().filter(move |child| {
            let coords = self.lattice_coords(*child);
            (0..D).all(|axis| match offset[axis] {
                1 => coords[axis] & 1 == 0,
                -1 => coords[axis] & 1 == 1,
                _ => true,
            })
        })
    }

    /// `true` if some same-level neighbor of `cell` has split children on the
    /// side facing `cell`, i.e. leaves two levels finer than `cell` would be
    /// once `cell` is a leaf.
    pub(crate) fn adjacent_to_split_children(&self, cell: CellId) -> bool {
        let level = self.level(cell);
        let coords = self.lattice_coords(cell);
        neighbor_offsets::<D>().iter().any(|offset| {
            match self.cell_at(level, shifted(coords, offset)) {
                Some(n) if n != cell && !self.is_leaf(n) => self
                    .touching_children(n, offset)
                    .any(|child| !self.is_leaf(child)),
                _ => false,
            }
        })
    }

    /// Number of cells `refine_graded(cell)` would split, computed on the
    /// `(level, coords)` lattice without touching the tree.
    pub(crate) fn graded_split_count(&self, cell: CellId) -> usize {
        if !self.is_leaf(cell) {
            return 0;
        }
        let mut planned = HashSet::new();
        self.plan_graded(self.level(cell), self.lattice_coords(cell), &mut planned);
        planned.len()
    }

    fn plan_graded(&self, level: u32, coords: [i64; D], planned: &mut HashSet<(u32, [i64; D])>) {
        if planned.contains(&(level, coords)) {
            return;
        }
        for offset in neighbor_offsets::<D>() {
            let Some(target) = self.wrap(level, shifted(coords, &offset)) else {
                continue;
            };
            while let Some((l, c)) = self.planned_leaf(level, target, planned) {
                if l >= level {
                    break;
                }
                self.plan_graded(l, c, planned);
            }
        }
        planned.insert((level, coords));
    }

    /// Leaf covering `target` once every cell in `planned` is split, stopping
    /// at `level`.
    fn planned_leaf(
        &self,
        level: u32,
        target: [i64; D],
        planned: &HashSet<(u32, [i64; D])>,
    ) -> Option<(u32, [i64; D])> {
        let found = self.locate(level, target)?;
        let mut l = self.level(found);
        let mut coords = self.lattice_coords(found);
        while l < level && planned.contains(&(l, coords)) {
            l += 1;
            coords = target.map(|c| c >> (level - l));
        }
        Some((l, coords))
    }

    pub(crate) fn refine_graded(&mut self, cell: CellId, split: &mut Vec<CellId>) {
        if !self.is_leaf(cell) {
            return;
        }
        let level = self.level(cell);
        let coords = self.lattice_coords(cell);
        for offset in neighbor_offsets::<D>() {
            let target = shifted(coords, &offset);
            loop {
                match self.locate(level, target) {
                    Some(n) if self.level(n) < level => self.refine_graded(n, split),
                    _ => break,
                }
            }
        }
        self.refine_single(cell);
        split.push(cell);
    }

    pub(crate) fn coarsen_recursive(
        &mut self,
        cell: CellId,
        visitor: &mut dyn CoarsenVisitor<Self>,
    ) -> bool {
        if self.is_leaf(cell) {
            return visitor.coarsenable(self, cell);
        }
        let children = self.children(cell).to_vec();
        let mut all = true;
        for child in &children {
            let collapsed = self.coarsen_recursive(*child, visitor);
            all &= collapsed;
        }
        if !all || !visitor.coarsenable(self, cell) || self.adjacent_to_split_children(cell) {
            return false;
        }
        for child in &children {
            visitor.cleanup(self, *child);
        }
        self.collapse(cell);
        true
    }
}
