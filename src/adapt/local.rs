//! Unbudgeted mark/refine/coarsen balancing.

use crate::adapt::criterion::ActiveCriteria;
use crate::adapt::global::BalanceOutcome;
use crate::adapt::stats::AdaptStats;
use crate::data::scratch::ScratchSlots;
use crate::topology::cell::CellId;
use crate::topology::tree::{AdaptiveTree, CoarsenVisitor};
use log::debug;

/// Per-cell decision of the mark phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Marks {
    pub refinable: bool,
    pub coarsenable: bool,
}

struct MarkedCoarsener<'m> {
    marks: &'m ScratchSlots<Marks>,
}

impl<T: AdaptiveTree> CoarsenVisitor<T> for MarkedCoarsener<'_> {
    fn coarsenable(&mut self, tree: &T, cell: CellId) -> bool {
        tree.is_boundary(cell) || self.marks.get(cell).coarsenable
    }
}

/// Single-pass balancer used when no cell budget is set.
///
/// Every leaf whose cost exceeds some criterion's threshold splits once.
/// Cells that no criterion holds on to merge back, except within the
/// `cmax / cfactor` hysteresis band, where they stay as they are.
pub struct LocalBalancer<'c, 'a, T> {
    active: &'c ActiveCriteria<'a, T>,
}

impl<'c, 'a, T: AdaptiveTree> LocalBalancer<'c, 'a, T> {
    pub fn new(active: &'c ActiveCriteria<'a, T>) -> Self {
        Self { active }
    }

    /// Mark phase: refinable/coarsenable flags for every cell.
    pub fn mark(&self, tree: &T) -> ScratchSlots<Marks> {
        let mut marks = ScratchSlots::allocate(tree, Marks::default());
        for cell in tree.cells() {
            let mut m = Marks {
                refinable: false,
                coarsenable: !tree.is_permanent(cell),
            };
            let level = tree.level(cell);
            let leaf = tree.is_leaf(cell);
            for criterion in self.active.iter() {
                let max_level = criterion.max_level_at(tree, cell);
                let cost = criterion.cost(tree, cell);
                if leaf && level < max_level && cost > criterion.cmax() {
                    m.refinable = true;
                    m.coarsenable = false;
                    break;
                }
                if level < criterion.min_level_at(tree, cell)
                    || (level < max_level && cost > criterion.cmax() / criterion.cfactor())
                {
                    m.coarsenable = false;
                }
            }
            if m.refinable && level >= self.active.combined_max_level(tree, cell) {
                m.refinable = false;
            }
            marks.set(cell, m);
            // pre-order: the parent is already marked, so this sticks
            if !leaf {
                if let Some(parent) = tree.parent(cell) {
                    marks.get_mut(parent).coarsenable = false;
                }
            }
        }
        marks
    }

    pub fn run(&self, tree: &mut T, depth: u32, stats: &mut AdaptStats) -> BalanceOutcome {
        let marks = self.mark(tree);
        let mut depth = depth;
        let start = tree.leaf_count();

        let mut refined = 0usize;
        for leaf in tree.leaves() {
            if !marks.get(leaf).refinable || !tree.contains(leaf) || !tree.is_leaf(leaf) {
                continue;
            }
            for split in tree.refine_with_corner_grading(leaf) {
                depth = depth.max(tree.level(split) + 1);
            }
            refined += 1;
        }
        let after_refine = tree.leaf_count();
        stats.created += after_refine - start;

        let mut visitor = MarkedCoarsener { marks: &marks };
        for root in tree.roots() {
            tree.coarsen(root, &mut visitor);
        }
        let removed = after_refine - tree.leaf_count();
        stats.removed += removed;
        stats.ncells.add_value(tree.leaf_count() as f64);

        debug!(
            "local balance: {refined} leaves refined, {} created, {removed} removed, {} leaves",
            after_refine - start,
            tree.leaf_count()
        );
        BalanceOutcome {
            changed: after_refine != start || removed > 0,
            depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapt::criterion::{CostModel, Criterion};
    use crate::forest::{ForestLayout, QuadForest};

    struct Constant(f64);
    impl CostModel<QuadForest> for Constant {
        fn name(&self) -> &str {
            "constant"
        }
        fn cost(&self, _tree: &QuadForest, _cell: CellId) -> f64 {
            self.0
        }
    }

    fn criterion(cost: f64) -> Criterion<QuadForest> {
        Criterion::new("c").with_model(Constant(cost))
    }

    #[test]
    fn dead_band_neither_refines_nor_releases() {
        let forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
        let criteria = vec![criterion(0.6).with_cmax(1.0).with_cfactor(2.0)];
        let active = ActiveCriteria::gather(&criteria);
        let marks = LocalBalancer::new(&active).mark(&forest);
        for leaf in forest.leaves() {
            assert_eq!(
                *marks.get(leaf),
                Marks {
                    refinable: false,
                    coarsenable: false
                }
            );
        }
    }

    #[test]
    fn cheap_leaves_are_released_and_expensive_ones_refined() {
        let forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
        let cheap = vec![criterion(0.1).with_cmax(1.0)];
        let active = ActiveCriteria::gather(&cheap);
        let marks = LocalBalancer::new(&active).mark(&forest);
        let leaf = forest.leaves()[0];
        assert!(marks.get(leaf).coarsenable);
        assert!(!marks.get(leaf).refinable);

        let dear = vec![criterion(2.0).with_cmax(1.0)];
        let active = ActiveCriteria::gather(&dear);
        let marks = LocalBalancer::new(&active).mark(&forest);
        assert!(marks.get(leaf).refinable);
        assert!(!marks.get(leaf).coarsenable);
    }

    #[test]
    fn any_criterion_can_trigger_refinement() {
        let forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
        let criteria = vec![
            criterion(0.0).with_cmax(1.0),
            criterion(5.0).with_cmax(1.0),
        ];
        let active = ActiveCriteria::gather(&criteria);
        let marks = LocalBalancer::new(&active).mark(&forest);
        assert!(marks.get(forest.leaves()[2]).refinable);
    }

    #[test]
    fn non_leaf_pins_its_parent() {
        let mut forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
        let first = forest.cell_at(1, [0, 0]).unwrap();
        forest.refine_single(first);
        let criteria = vec![criterion(0.0).with_cmax(1.0)];
        let active = ActiveCriteria::gather(&criteria);
        let marks = LocalBalancer::new(&active).mark(&forest);
        let root = forest.roots()[0];
        assert!(!marks.get(root).coarsenable);
        assert!(marks.get(first).coarsenable);
    }

    #[test]
    fn permanent_and_minimum_level_block_coarsening() {
        let mut forest = QuadForest::uniform(ForestLayout::default(), 2).unwrap();
        let pinned = forest.leaves()[0];
        forest.set_permanent(pinned, true);
        let criteria = vec![criterion(0.0).with_cmax(1.0).with_min_level(1)];
        let active = ActiveCriteria::gather(&criteria);
        let marks = LocalBalancer::new(&active).mark(&forest);
        assert!(!marks.get(pinned).coarsenable);
        assert!(marks.get(forest.leaves()[5]).coarsenable);
        let level1 = forest.cell_at(1, [1, 1]).unwrap();
        assert!(marks.get(level1).coarsenable);
        assert!(!marks.get(forest.roots()[0]).coarsenable);

        let mut stats = AdaptStats::new();
        let outcome = LocalBalancer::new(&active).run(&mut forest, 2, &mut stats);
        assert!(outcome.changed);
        // three level-1 parents collapse, the one holding `pinned` stays
        assert_eq!(forest.leaf_count(), 7);
        assert_eq!(stats.removed, 9);
        assert!(forest.contains(pinned));
    }

    #[test]
    fn each_leaf_refines_once_per_call() {
        let mut forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
        let criteria = vec![criterion(1.0).with_cmax(0.5).with_max_level(3)];
        let active = ActiveCriteria::gather(&criteria);
        let mut stats = AdaptStats::new();
        let outcome = LocalBalancer::new(&active).run(&mut forest, 1, &mut stats);
        assert_eq!(outcome, BalanceOutcome { changed: true, depth: 2 });
        assert_eq!(forest.leaf_count(), 16);
        assert_eq!(stats.created, 12);
        assert_eq!(stats.removed, 0);
    }
}
