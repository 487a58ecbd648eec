//! Bottom-up aggregation of the combined cost.
//!
//! Leaves carry the combined cost of the active criteria. A parent carries
//! the larger of its own combined cost and the maximum over its children, and
//! that children maximum is also pushed onto the parents of its same-level
//! face neighbors. A parent next to an expensive region therefore never looks
//! cheaper than that region, which keeps the budgeted balancer from
//! collapsing cells whose collapse would break grading.

use crate::adapt::criterion::ActiveCriteria;
use crate::data::scratch::ScratchSlots;
use crate::mesh_error::MeshAmrError;
use crate::topology::tree::AdaptiveTree;
use log::debug;

/// Description stored with the exported cost variable.
pub const COST_EXPORT_DESCRIPTION: &str = "Adaptive cost";

/// Compute the aggregated cost of every cell of `tree`.
pub fn aggregate_costs<T: AdaptiveTree>(tree: &T, active: &ActiveCriteria<'_, T>) -> ScratchSlots<f64> {
    let mut costs = ScratchSlots::allocate(tree, f64::NEG_INFINITY);
    let depth = tree.depth() as usize;
    let mut by_level = vec![Vec::new(); depth + 1];
    for cell in tree.cells() {
        let level = tree.level(cell) as usize;
        if level < by_level.len() {
            by_level[level].push(cell);
        }
    }
    for cells in by_level.iter().rev() {
        for &cell in cells {
            let own = active.combined_cost(tree, cell);
            if tree.is_leaf(cell) {
                costs.set(cell, own);
                continue;
            }
            let children_max = tree
                .children(cell)
                .iter()
                .map(|c| *costs.get(*c))
                .fold(f64::NEG_INFINITY, f64::max);
            let cost = own.max(children_max);
            if cost > *costs.get(cell) {
                costs.set(cell, cost);
            }
            for neighbor in tree.same_level_neighbors(cell) {
                if let Some(parent) = tree.parent(neighbor) {
                    if children_max > *costs.get(parent) {
                        costs.set(parent, children_max);
                    }
                }
            }
        }
    }
    debug!("aggregated costs over {} levels", depth + 1);
    costs
}

/// Store `costs` into the variable `name`, registering it if needed.
pub fn export_costs<T: AdaptiveTree>(
    tree: &mut T,
    costs: &ScratchSlots<f64>,
    name: &str,
) -> Result<(), MeshAmrError> {
    tree.ensure_export_variable(name, COST_EXPORT_DESCRIPTION)?;
    for cell in tree.cells() {
        tree.set_value(name, cell, *costs.get(cell))?;
    }
    Ok(())
}
