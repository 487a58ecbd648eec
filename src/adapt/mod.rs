//! Adaptive refinement scheduling.
//!
//! One call of [`adapt_mesh`] runs the whole pipeline on a partition:
//!
//! 1. the active criteria are gathered and prepared (no-op when none is
//!    active);
//! 2. costs are aggregated bottom-up ([`cost`]) when a cell budget or a cost
//!    export asks for them;
//! 3. the [`global::GlobalBalancer`] runs when the combined budget has a
//!    `maxcells`, the [`local::LocalBalancer`] otherwise;
//! 4. the local change flags are or-reduced across partitions;
//! 5. every partition reshapes ([`reshape`]) if any partition changed;
//! 6. the running [`stats::AdaptStats`] are updated.
//!
//! [`MeshAdaptor`] bundles the criteria, the reshaper and the statistics of
//! one mesh and drives criterion schedules from the time loop.

pub mod cost;
pub mod criterion;
pub mod estimators;
pub mod global;
pub mod local;
pub mod queue;
pub mod registry;
pub mod reshape;
pub mod schedule;
pub mod stats;

use crate::adapt::cost::{aggregate_costs, export_costs};
use crate::adapt::criterion::{ActiveCriteria, Criterion};
use crate::adapt::global::GlobalBalancer;
use crate::adapt::local::LocalBalancer;
use crate::adapt::reshape::Reshaper;
use crate::adapt::stats::AdaptStats;
use crate::algs::communicator::Communicator;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshAmrError;
use crate::topology::tree::AdaptiveTree;
use log::{debug, info, trace};
use std::time::Instant;

/// What one adaptation call did on this partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdaptOutcome {
    /// Reduced across partitions: `true` if any partition changed.
    pub changed: bool,
    pub created: usize,
    pub removed: usize,
    /// Leaf count after the call.
    pub leaves: usize,
}

/// Adapt `tree` once.
///
/// `comm` must span every partition of the mesh; each of them has to make
/// this call with the same active criteria.
pub fn adapt_mesh<T, C>(
    tree: &mut T,
    criteria: &mut [Criterion<T>],
    reshaper: &mut Reshaper<T>,
    stats: &mut AdaptStats,
    comm: &C,
) -> Result<AdaptOutcome, MeshAmrError>
where
    T: AdaptiveTree + DebugInvariants,
    C: Communicator + ?Sized,
{
    if !criteria.iter().any(Criterion::is_active) {
        trace!("adapt: no active criterion");
        return Ok(AdaptOutcome {
            leaves: tree.leaf_count(),
            ..AdaptOutcome::default()
        });
    }
    let started = Instant::now();
    for criterion in criteria.iter_mut().filter(|c| c.is_active()) {
        criterion.prepare(tree)?;
    }
    let active = ActiveCriteria::gather(criteria);
    let budget = active.budget();
    let created = stats.created;
    let removed = stats.removed;
    let depth = tree.depth();

    let local = if budget.is_bounded() || active.cost_export().is_some() {
        let mut costs = aggregate_costs(tree, &active);
        if let Some(name) = active.cost_export() {
            export_costs(tree, &costs, name)?;
        }
        if budget.is_bounded() {
            GlobalBalancer::new(&active, budget).run(tree, &mut costs, depth, stats)
        } else {
            LocalBalancer::new(&active).run(tree, depth, stats)
        }
    } else {
        LocalBalancer::new(&active).run(tree, depth, stats)
    };

    let changed = comm.all_reduce_or(local.changed)?;
    if changed {
        let reshaped = reshaper.reshape(tree, local.depth)?;
        stats.created += reshaped.created;
        stats.removed += reshaped.removed;
        crate::debug_invariants!(tree.validate_invariants(), "adapted tree");
    } else if local.changed {
        debug!("adapt: rank {} changed but the reduction says otherwise", comm.rank());
    }

    let elapsed = started.elapsed().as_secs_f64();
    stats.timing.add_value(elapsed);
    let outcome = AdaptOutcome {
        changed,
        created: stats.created - created,
        removed: stats.removed - removed,
        leaves: tree.leaf_count(),
    };
    info!(
        "adapt: {} criteria, {} created, {} removed, {} leaves in {elapsed:.3}s",
        active.len(),
        outcome.created,
        outcome.removed,
        outcome.leaves
    );
    Ok(outcome)
}

/// Criteria, reshaper and statistics of one mesh.
pub struct MeshAdaptor<T> {
    criteria: Vec<Criterion<T>>,
    reshaper: Reshaper<T>,
    stats: AdaptStats,
}

impl<T: AdaptiveTree + DebugInvariants> Default for MeshAdaptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AdaptiveTree + DebugInvariants> MeshAdaptor<T> {
    pub fn new() -> Self {
        Self {
            criteria: Vec::new(),
            reshaper: Reshaper::new(),
            stats: AdaptStats::new(),
        }
    }

    pub fn with_reshaper(mut self, reshaper: Reshaper<T>) -> Self {
        self.reshaper = reshaper;
        self
    }

    /// Validate and append `criterion`.
    pub fn add_criterion(&mut self, criterion: Criterion<T>) -> Result<(), MeshAmrError> {
        criterion.validate()?;
        self.criteria.push(criterion);
        Ok(())
    }

    pub fn criteria(&self) -> &[Criterion<T>] {
        &self.criteria
    }

    pub fn criteria_mut(&mut self) -> &mut [Criterion<T>] {
        &mut self.criteria
    }

    pub fn reshaper(&self) -> &Reshaper<T> {
        &self.reshaper
    }

    pub fn stats(&self) -> &AdaptStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Update which criteria take part in the next call, at simulated time
    /// `t` and iteration `i`. Criteria without a cost model are dropped;
    /// criteria with a schedule are active only when it fires.
    pub fn advance(&mut self, t: f64, i: u64) {
        self.criteria.retain(|c| {
            if !c.has_model() {
                debug!("dropping criterion `{}` without cost model", c.name());
            }
            c.has_model()
        });
        for criterion in &mut self.criteria {
            if let Some(schedule) = criterion.schedule_mut() {
                let fires = schedule.fires(t, i);
                criterion.set_active(fires);
            }
        }
    }

    pub fn adapt<C: Communicator + ?Sized>(
        &mut self,
        tree: &mut T,
        comm: &C,
    ) -> Result<AdaptOutcome, MeshAmrError> {
        adapt_mesh(
            tree,
            &mut self.criteria,
            &mut self.reshaper,
            &mut self.stats,
            comm,
        )
    }
}
