//! Budgeted balancing with two candidate queues.
//!
//! Refine candidates are leaves below their maximum level, most expensive
//! first. Coarsen candidates are parents of leaves, cheapest first. The loop
//! trades between the two ends until neither is worth acting on under the
//! leaf-count budget:
//!
//! - above `maxcells`, the cheapest parent collapses whatever its cost;
//! - when the best refinement is worth more than the cheapest parent and its
//!   graded split would not fit, the parent collapses to make room;
//! - a parent cheaper than `cmax` collapses while the count stays at or
//!   above `mincells`;
//! - below `mincells`, the best leaf splits whatever its cost;
//! - a leaf more expensive than `cmax` splits while the split fits under
//!   `maxcells`.
//!
//! A split is measured with [`AdaptiveTree::refine_growth`], which includes
//! the coarser neighbors the grading pre-pass splits first. No split ever
//! takes the leaf count past `maxcells`.
//!
//! Every branch consumes the candidate it acts on and nothing is queued
//! again, so the loop terminates.

use crate::adapt::criterion::{ActiveCriteria, Budget};
use crate::adapt::queue::{CandidateQueue, QueueOrder};
use crate::adapt::stats::AdaptStats;
use crate::data::scratch::ScratchSlots;
use crate::topology::cell::CellId;
use crate::topology::tree::{AdaptiveTree, CoarsenVisitor};
use log::{debug, warn};

/// Result of one balancer run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceOutcome {
    /// Whether the topology changed.
    pub changed: bool,
    /// Upper bound of the deepest leaf level.
    pub depth: u32,
}

/// Decides which children of a popped parent may disappear.
struct FineCoarsener<'c, 'a, T> {
    active: &'c ActiveCriteria<'a, T>,
    costs: &'c ScratchSlots<f64>,
    limit: f64,
    refine: &'c mut CandidateQueue,
    coarsen: &'c mut CandidateQueue,
}

impl<T: AdaptiveTree> CoarsenVisitor<T> for FineCoarsener<'_, '_, T> {
    fn coarsenable(&mut self, tree: &T, cell: CellId) -> bool {
        if tree.is_boundary(cell) {
            return true;
        }
        if tree.is_permanent(cell) {
            return false;
        }
        if *self.costs.get(cell) >= self.limit {
            return false;
        }
        tree.level(cell) >= self.active.combined_min_level(tree, cell)
    }

    fn cleanup(&mut self, _tree: &T, cell: CellId) {
        self.refine.purge(cell);
        self.coarsen.purge(cell);
    }
}

/// Dual-queue balancer enforcing a leaf-count budget.
pub struct GlobalBalancer<'c, 'a, T> {
    active: &'c ActiveCriteria<'a, T>,
    budget: Budget,
}

impl<'c, 'a, T: AdaptiveTree> GlobalBalancer<'c, 'a, T> {
    pub fn new(active: &'c ActiveCriteria<'a, T>, budget: Budget) -> Self {
        Self { active, budget }
    }

    /// Run the balancing loop on `tree`, whose costs were aggregated into
    /// `costs`. `depth` is the current depth bound.
    pub fn run(
        &self,
        tree: &mut T,
        costs: &mut ScratchSlots<f64>,
        depth: u32,
        stats: &mut AdaptStats,
    ) -> BalanceOutcome {
        let Budget {
            mincells,
            maxcells,
            cmax,
        } = self.budget;
        let maxcells = maxcells.unwrap_or(usize::MAX);
        if mincells > maxcells {
            warn!("mincells ({mincells}) exceeds maxcells ({maxcells}); refinement stops at maxcells");
        }
        let growth = T::CHILDREN - 1;
        let split_growth = |tree: &T, c: Option<(CellId, f64)>| {
            c.map_or(growth, |(cell, _)| tree.refine_growth(cell))
        };

        let mut refine = CandidateQueue::new(tree, QueueOrder::HighestFirst);
        let mut coarsen = CandidateQueue::new(tree, QueueOrder::LowestFirst);
        self.fill_queues(tree, costs, &mut refine, &mut coarsen);

        let is_refinable = |tree: &T, c: CellId| tree.contains(c) && tree.is_leaf(c);
        let is_coarsenable = |tree: &T, c: CellId| {
            tree.contains(c) && !tree.is_leaf(c) && tree.depth_below(c) == tree.level(c) + 1
        };

        let mut depth = depth;
        let mut changed = false;
        let mut coarse = refine.pop_valid(|c| is_refinable(tree, c));
        let mut fine = coarsen.pop_valid(|c| is_coarsenable(tree, c));
        debug!(
            "global balance start: {} leaves, refine top {:?}, coarsen top {:?}",
            tree.leaf_count(),
            coarse.map(|(_, k)| k),
            fine.map(|(_, k)| k)
        );
        loop {
            // candidates may have been merged or split by the previous step
            if coarse.is_some_and(|(c, _)| !is_refinable(tree, c)) {
                coarse = refine.pop_valid(|c| is_refinable(tree, c));
            }
            if fine.is_some_and(|(c, _)| !is_coarsenable(tree, c)) {
                fine = coarsen.pop_valid(|c| is_coarsenable(tree, c));
            }
            let ccost = coarse.map_or(f64::NEG_INFINITY, |(_, k)| k);
            let nc = tree.leaf_count();
            let mut stepped = false;

            if let Some((parent, fcost)) = fine {
                let over = nc > maxcells;
                let exchange = ccost > fcost
                    && ccost > cmax
                    && nc.saturating_add(split_growth(tree, coarse)) > maxcells;
                let cheap = fcost < cmax && nc >= mincells.saturating_add(growth);
                if over || exchange || cheap {
                    let limit = if over { f64::INFINITY } else { ccost.max(cmax) };
                    let mut visitor = FineCoarsener {
                        active: self.active,
                        costs: &*costs,
                        limit,
                        refine: &mut refine,
                        coarsen: &mut coarsen,
                    };
                    tree.coarsen(parent, &mut visitor);
                    let removed = nc - tree.leaf_count();
                    stats.removed += removed;
                    changed |= removed > 0;
                    debug!("coarsen {parent} (cost {fcost}, limit {limit}): {} leaves", tree.leaf_count());
                    fine = coarsen.pop_valid(|c| is_coarsenable(tree, c));
                    stepped = true;
                }
            }

            let nc = tree.leaf_count();
            if let Some((cell, cost)) = coarse.filter(|(c, _)| is_refinable(tree, *c)) {
                let fits = nc.saturating_add(tree.refine_growth(cell)) <= maxcells;
                let floor = nc < mincells;
                let worth = cost > cmax;
                if fits && (floor || worth) {
                    for split in tree.refine_with_corner_grading(cell) {
                        depth = depth.max(tree.level(split) + 1);
                        for &child in tree.children(split) {
                            costs.set(child, f64::MAX);
                        }
                    }
                    let created = tree.leaf_count() - nc;
                    stats.created += created;
                    changed = true;
                    debug!("refine {cell} (cost {cost}): {} leaves", tree.leaf_count());
                    coarse = refine.pop_valid(|c| is_refinable(tree, c));
                    stepped = true;
                }
            }

            if !stepped {
                break;
            }
        }

        let final_cost = coarse.map_or(0.0, |(_, k)| k);
        stats.cmax.add_value(final_cost);
        stats.ncells.add_value(tree.leaf_count() as f64);
        debug!(
            "global balance done: {} leaves, final cost {final_cost}",
            tree.leaf_count()
        );
        BalanceOutcome { changed, depth }
    }

    fn fill_queues(
        &self,
        tree: &T,
        costs: &ScratchSlots<f64>,
        refine: &mut CandidateQueue,
        coarsen: &mut CandidateQueue,
    ) {
        for leaf in tree.leaves() {
            let level = tree.level(leaf);
            if level < self.active.combined_max_level(tree, leaf) {
                refine.push(leaf, *costs.get(leaf));
            }
            let Some(parent) = tree.parent(leaf) else {
                continue;
            };
            if coarsen.contains(parent) || tree.is_permanent(parent) || tree.is_boundary(parent) {
                continue;
            }
            if level > self.active.combined_min_level(tree, parent) {
                coarsen.push(parent, *costs.get(parent));
            }
        }
    }
}
