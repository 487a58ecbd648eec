//! Restoring mesh invariants after a topology change.
//!
//! The [`Reshaper`] runs four steps in order: a 2:1 grading pass, boundary
//! matching, cut-cell bookkeeping and a boundary-condition refresh of every
//! field variable. The last three are collaborators behind traits so that a
//! solver can plug in its own partition protocol, solid geometry and boundary
//! conditions. Collaborator errors abort the reshape and are returned as-is.

use crate::data::bc::{BoundaryConditions, NoBoundaryConditions};
use crate::forest::Forest;
use crate::mesh_error::MeshAmrError;
use crate::topology::cell::CellId;
use crate::topology::tree::AdaptiveTree;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Makes boundary and partition-seam cells consistent with the interior.
pub trait BoundaryMatcher<T: ?Sized>: Send {
    fn match_boundaries(&mut self, tree: &mut T) -> Result<(), MeshAmrError>;
}

/// Recomputes the cut-cell state (solid fractions, merge partners).
pub trait CutCellHook<T: ?Sized>: Send {
    fn recompute(&mut self, tree: &mut T) -> Result<(), MeshAmrError>;

    /// Cell that a small cut cell is merged with, if any.
    fn merge_partner(&self, _cell: CellId) -> Option<CellId> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoBoundaryMatching;

impl<T: ?Sized> BoundaryMatcher<T> for NoBoundaryMatching {
    fn match_boundaries(&mut self, _tree: &mut T) -> Result<(), MeshAmrError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoCutCells;

impl<T: ?Sized> CutCellHook<T> for NoCutCells {
    fn recompute(&mut self, _tree: &mut T) -> Result<(), MeshAmrError> {
        Ok(())
    }
}

/// Refines boundary leaves until each one is at least as fine as its
/// interior face neighbors.
///
/// With a level limit, a boundary leaf that would have to split past it is
/// reported as [`MeshAmrError::BoundaryMatch`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GhostMatcher {
    max_level: Option<u32>,
}

impl GhostMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boundary leaves never split to a level above `max_level`.
    pub fn up_to_level(max_level: u32) -> Self {
        Self {
            max_level: Some(max_level),
        }
    }
}

impl<const D: usize> BoundaryMatcher<Forest<D>> for GhostMatcher {
    fn match_boundaries(&mut self, tree: &mut Forest<D>) -> Result<(), MeshAmrError> {
        let mut splits = 0usize;
        loop {
            let pending: Vec<CellId> = tree
                .leaves()
                .into_iter()
                .filter(|&leaf| tree.is_boundary(leaf) && finer_interior_neighbor(tree, leaf))
                .collect();
            if pending.is_empty() {
                break;
            }
            if let Some(max) = self.max_level {
                if let Some(&leaf) = pending.iter().find(|&&l| tree.level(l) >= max) {
                    return Err(MeshAmrError::BoundaryMatch(format!(
                        "boundary leaf {leaf} at level {} cannot follow its interior past level {max}",
                        tree.level(leaf)
                    )));
                }
            }
            for leaf in pending {
                if tree.contains(leaf) && tree.is_leaf(leaf) {
                    splits += tree.refine_with_corner_grading(leaf).len();
                }
            }
        }
        if splits > 0 {
            debug!("boundary matching split {splits} cells");
        }
        Ok(())
    }
}

fn finer_interior_neighbor<const D: usize>(tree: &Forest<D>, leaf: CellId) -> bool {
    let level = tree.level(leaf);
    let coords = tree.lattice_coords(leaf);
    (0..D).any(|axis| {
        [-1i64, 1].into_iter().any(|step| {
            let mut target = coords;
            target[axis] += step;
            tree.cell_at(level, target)
                .is_some_and(|n| !tree.is_boundary(n) && !tree.is_leaf(n))
        })
    })
}

/// Solid fraction of a cell in `[0, 1]`: 0 is fully solid, 1 fully fluid.
pub type FractionFn<const D: usize> = Arc<dyn Fn(&Forest<D>, CellId) -> f64 + Send + Sync>;

/// Embedded-solid bookkeeping.
///
/// Every leaf cut by the solid boundary is pinned (made permanent) so that no
/// balancer collapses it. Cut leaves whose fluid fraction falls below
/// `merge_below` get a merge partner: the face neighbor leaf with the largest
/// fluid fraction. Cells pinned by an earlier call that are no longer cut are
/// released.
pub struct SolidCells<const D: usize> {
    fraction: FractionFn<D>,
    merge_below: f64,
    pinned: HashSet<CellId>,
    partners: HashMap<CellId, CellId>,
}

impl<const D: usize> std::fmt::Debug for SolidCells<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolidCells")
            .field("merge_below", &self.merge_below)
            .field("pinned", &self.pinned.len())
            .field("partners", &self.partners.len())
            .finish_non_exhaustive()
    }
}

impl<const D: usize> SolidCells<D> {
    pub fn new(fraction: impl Fn(&Forest<D>, CellId) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            fraction: Arc::new(fraction),
            merge_below: 0.5,
            pinned: HashSet::new(),
            partners: HashMap::new(),
        }
    }

    pub fn with_merge_threshold(mut self, merge_below: f64) -> Self {
        self.merge_below = merge_below;
        self
    }

    /// Cut leaves found by the last recompute.
    pub fn cut_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.pinned.iter().copied()
    }

    pub fn is_cut(&self, cell: CellId) -> bool {
        self.pinned.contains(&cell)
    }

    fn fraction_of(&self, tree: &Forest<D>, cell: CellId) -> Result<f64, MeshAmrError> {
        let a = (self.fraction)(tree, cell);
        if a.is_nan() {
            return Err(MeshAmrError::CutCell(format!(
                "solid fraction of {cell} is not a number"
            )));
        }
        Ok(a.clamp(0.0, 1.0))
    }
}

impl<const D: usize> CutCellHook<Forest<D>> for SolidCells<D> {
    fn recompute(&mut self, tree: &mut Forest<D>) -> Result<(), MeshAmrError> {
        let mut fractions = HashMap::new();
        for leaf in tree.leaves() {
            fractions.insert(leaf, self.fraction_of(tree, leaf)?);
        }
        let cut: HashSet<CellId> = fractions
            .iter()
            .filter(|(_, a)| **a > 0.0 && **a < 1.0)
            .map(|(c, _)| *c)
            .collect();

        for stale in self.pinned.difference(&cut) {
            if tree.contains(*stale) {
                tree.set_permanent(*stale, false);
            }
        }
        for &cell in &cut {
            tree.set_permanent(cell, true);
        }

        self.partners.clear();
        for &cell in &cut {
            if fractions[&cell] >= self.merge_below {
                continue;
            }
            let best = (0..Forest::<D>::FACES)
                .filter_map(|dir| tree.neighbor(cell, dir))
                .filter_map(|n| fractions.get(&n).map(|a| (n, *a)))
                .filter(|(_, a)| *a > 0.0)
                .fold(None::<(CellId, f64)>, |best, (n, a)| match best {
                    Some((_, b)) if b >= a => best,
                    _ => Some((n, a)),
                });
            match best {
                Some((partner, _)) => {
                    self.partners.insert(cell, partner);
                }
                None => {
                    return Err(MeshAmrError::CutCell(format!(
                        "small cut cell {cell} has no fluid neighbor to merge with"
                    )));
                }
            }
        }
        debug!(
            "cut cells: {} pinned, {} merged",
            cut.len(),
            self.partners.len()
        );
        self.pinned = cut;
        Ok(())
    }

    fn merge_partner(&self, cell: CellId) -> Option<CellId> {
        self.partners.get(&cell).copied()
    }
}

/// Result of one reshape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReshapeOutcome {
    /// Net leaves added by grading and boundary matching.
    pub created: usize,
    /// Net leaves removed, when a boundary matcher coarsens more than the
    /// pass refines.
    pub removed: usize,
    pub depth: u32,
}

/// Post-adaptation consistency pass.
pub struct Reshaper<T> {
    matcher: Box<dyn BoundaryMatcher<T>>,
    cut_cells: Box<dyn CutCellHook<T>>,
    boundary_conditions: Box<dyn BoundaryConditions<T> + Send>,
}

impl<T: AdaptiveTree> Default for Reshaper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AdaptiveTree> Reshaper<T> {
    /// Grading only; every collaborator is a no-op.
    pub fn new() -> Self {
        Self {
            matcher: Box::new(NoBoundaryMatching),
            cut_cells: Box::new(NoCutCells),
            boundary_conditions: Box::new(NoBoundaryConditions),
        }
    }

    pub fn with_matcher(mut self, matcher: impl BoundaryMatcher<T> + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_cut_cells(mut self, hook: impl CutCellHook<T> + 'static) -> Self {
        self.cut_cells = Box::new(hook);
        self
    }

    pub fn with_boundary_conditions(
        mut self,
        bc: impl BoundaryConditions<T> + Send + 'static,
    ) -> Self {
        self.boundary_conditions = Box::new(bc);
        self
    }

    pub fn cut_cells(&self) -> &dyn CutCellHook<T> {
        self.cut_cells.as_ref()
    }

    /// Split every leaf that touches cells two levels finer, deepest levels
    /// first. `depth` bounds the deepest leaf level.
    pub fn grade(&self, tree: &mut T, depth: u32) -> u32 {
        let mut depth = depth;
        for level in (0..depth.saturating_sub(1)).rev() {
            for cell in tree.cells_at_level(level) {
                if !tree.contains(cell) || !tree.needs_corner_refinement(cell) {
                    continue;
                }
                for split in tree.refine_with_corner_grading(cell) {
                    depth = depth.max(tree.level(split) + 1);
                }
            }
        }
        depth
    }

    /// Run the whole pass. Must be called on every partition whenever the
    /// reduced change flag is set.
    pub fn reshape(&mut self, tree: &mut T, depth: u32) -> Result<ReshapeOutcome, MeshAmrError> {
        let start = tree.leaf_count();
        let depth = self.grade(tree, depth);
        self.matcher.match_boundaries(tree)?;
        let end = tree.leaf_count();
        let created = end.saturating_sub(start);
        let removed = start.saturating_sub(end);
        self.cut_cells.recompute(tree)?;
        for variable in tree.variable_names() {
            self.boundary_conditions.apply(tree, &variable)?;
        }
        debug!("reshape: {created} leaves added, {removed} removed, depth bound {depth}");
        Ok(ReshapeOutcome {
            created,
            removed,
            depth: depth.max(tree.depth()),
        })
    }
}
