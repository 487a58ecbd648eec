//! Refinement criteria and their combination.
//!
//! A [`Criterion`] pairs an optional [`CostModel`] (the scoring policy) with
//! the thresholds and level bounds that turn scores into refine/coarsen
//! decisions. [`ActiveCriteria`] combines the active criteria of one call:
//! costs add up (weighted), level bounds and cell budgets take the tightest
//! value, cost thresholds add up.

use crate::adapt::schedule::EventSchedule;
use crate::mesh_error::MeshAmrError;
use crate::topology::cell::CellId;
use std::fmt;
use std::sync::Arc;

/// Default finest level a criterion allows.
pub const DEFAULT_MAX_LEVEL: u32 = 5;
/// Default hysteresis divisor.
pub const DEFAULT_CFACTOR: f64 = 4.0;

/// Per-cell level bound.
pub type LevelFn<T> = Arc<dyn Fn(&T, CellId) -> u32 + Send + Sync>;

/// Scoring policy of a criterion.
pub trait CostModel<T: ?Sized>: Send {
    /// Short kind name used in logs.
    fn name(&self) -> &str;

    /// Recompute any per-call state (field extrema, derived fields) before
    /// costs are queried on `tree`.
    fn prepare(&mut self, _tree: &T) -> Result<(), MeshAmrError> {
        Ok(())
    }

    /// Cost of `cell`. Larger means more in need of refinement.
    fn cost(&self, tree: &T, cell: CellId) -> f64;

    /// Hysteresis divisor used when the criterion does not set one.
    fn default_cfactor(&self) -> f64 {
        DEFAULT_CFACTOR
    }
}

fn constant_level<T: 'static>(level: u32) -> LevelFn<T> {
    Arc::new(move |_: &T, _| level)
}

/// One scoring policy plus its thresholds.
pub struct Criterion<T> {
    name: String,
    model: Option<Box<dyn CostModel<T>>>,
    min_level: LevelFn<T>,
    max_level: LevelFn<T>,
    weight: f64,
    cmax: f64,
    cfactor: Option<f64>,
    mincells: usize,
    maxcells: Option<usize>,
    active: bool,
    cost_export: Option<String>,
    schedule: Option<EventSchedule>,
}

impl<T> fmt::Debug for Criterion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criterion")
            .field("name", &self.name)
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("weight", &self.weight)
            .field("cmax", &self.cmax)
            .field("cfactor", &self.cfactor())
            .field("mincells", &self.mincells)
            .field("maxcells", &self.maxcells)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Criterion<T> {
    /// A criterion without a cost model: zero cost everywhere, levels
    /// `0..=DEFAULT_MAX_LEVEL`, no cell budget.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            min_level: constant_level(0),
            max_level: constant_level(DEFAULT_MAX_LEVEL),
            weight: 1.0,
            cmax: 0.0,
            cfactor: None,
            mincells: 0,
            maxcells: None,
            active: true,
            cost_export: None,
            schedule: None,
        }
    }

    pub fn with_model(mut self, model: impl CostModel<T> + 'static) -> Self {
        self.model = Some(Box::new(model));
        self
    }

    pub fn with_boxed_model(mut self, model: Box<dyn CostModel<T>>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_min_level(mut self, level: u32) -> Self {
        self.min_level = constant_level(level);
        self
    }

    pub fn with_max_level(mut self, level: u32) -> Self {
        self.max_level = constant_level(level);
        self
    }

    pub fn with_min_level_fn(mut self, f: impl Fn(&T, CellId) -> u32 + Send + Sync + 'static) -> Self {
        self.min_level = Arc::new(f);
        self
    }

    pub fn with_max_level_fn(mut self, f: impl Fn(&T, CellId) -> u32 + Send + Sync + 'static) -> Self {
        self.max_level = Arc::new(f);
        self
    }
}

impl<T> Criterion<T> {
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_cmax(mut self, cmax: f64) -> Self {
        self.cmax = cmax;
        self
    }

    pub fn with_cfactor(mut self, cfactor: f64) -> Self {
        self.cfactor = Some(cfactor);
        self
    }

    pub fn with_mincells(mut self, mincells: usize) -> Self {
        self.mincells = mincells;
        self
    }

    pub fn with_maxcells(mut self, maxcells: usize) -> Self {
        self.maxcells = Some(maxcells);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Store the combined cost of every cell in variable `name` after
    /// aggregation.
    pub fn with_cost_export(mut self, name: impl Into<String>) -> Self {
        self.cost_export = Some(name.into());
        self
    }

    pub fn with_schedule(mut self, schedule: EventSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn cmax(&self) -> f64 {
        self.cmax
    }

    /// Explicit hysteresis divisor, else the model's default.
    pub fn cfactor(&self) -> f64 {
        self.cfactor
            .or_else(|| self.model.as_ref().map(|m| m.default_cfactor()))
            .unwrap_or(DEFAULT_CFACTOR)
    }

    pub fn mincells(&self) -> usize {
        self.mincells
    }

    pub fn maxcells(&self) -> Option<usize> {
        self.maxcells
    }

    pub fn cost_export(&self) -> Option<&str> {
        self.cost_export.as_deref()
    }

    pub fn schedule_mut(&mut self) -> Option<&mut EventSchedule> {
        self.schedule.as_mut()
    }

    /// Own (unweighted) cost of `cell`; zero without a model.
    pub fn cost(&self, tree: &T, cell: CellId) -> f64 {
        self.model.as_ref().map_or(0.0, |m| m.cost(tree, cell))
    }

    pub fn min_level_at(&self, tree: &T, cell: CellId) -> u32 {
        (self.min_level)(tree, cell)
    }

    pub fn max_level_at(&self, tree: &T, cell: CellId) -> u32 {
        (self.max_level)(tree, cell)
    }

    pub fn prepare(&mut self, tree: &T) -> Result<(), MeshAmrError> {
        match self.model.as_mut() {
            Some(model) => model.prepare(tree),
            None => Ok(()),
        }
    }

    /// Check thresholds for consistency.
    pub fn validate(&self) -> Result<(), MeshAmrError> {
        let invalid = |field, reason: String| MeshAmrError::InvalidCriterion {
            criterion: self.name.clone(),
            field,
            reason,
        };
        if !self.weight.is_finite() {
            return Err(invalid("weight", format!("{} is not finite", self.weight)));
        }
        if !self.cmax.is_finite() {
            return Err(invalid("cmax", format!("{} is not finite", self.cmax)));
        }
        let cfactor = self.cfactor();
        if !(cfactor > 1.0) {
            return Err(invalid("cfactor", format!("{cfactor} must be greater than 1")));
        }
        Ok(())
    }
}

/// Cell budget and cost threshold combined over the active criteria.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Budget {
    pub mincells: usize,
    /// `None` means unbounded.
    pub maxcells: Option<usize>,
    pub cmax: f64,
}

impl Budget {
    pub fn is_bounded(&self) -> bool {
        self.maxcells.is_some()
    }
}

/// The active criteria of one adaptation call.
pub struct ActiveCriteria<'a, T> {
    criteria: Vec<&'a Criterion<T>>,
}

impl<'a, T> ActiveCriteria<'a, T> {
    pub fn gather(all: &'a [Criterion<T>]) -> Self {
        Self {
            criteria: all.iter().filter(|c| c.is_active()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Criterion<T>> + '_ {
        self.criteria.iter().copied()
    }

    /// Weighted sum of the criteria costs.
    pub fn combined_cost(&self, tree: &T, cell: CellId) -> f64 {
        self.criteria
            .iter()
            .map(|c| c.weight * c.cost(tree, cell))
            .sum()
    }

    /// Tightest lower level bound (0 when no criterion is active).
    pub fn combined_min_level(&self, tree: &T, cell: CellId) -> u32 {
        self.criteria
            .iter()
            .map(|c| c.min_level_at(tree, cell))
            .max()
            .unwrap_or(0)
    }

    /// Tightest upper level bound (`u32::MAX` when no criterion is active).
    pub fn combined_max_level(&self, tree: &T, cell: CellId) -> u32 {
        self.criteria
            .iter()
            .map(|c| c.max_level_at(tree, cell))
            .min()
            .unwrap_or(u32::MAX)
    }

    pub fn budget(&self) -> Budget {
        Budget {
            mincells: self.criteria.iter().map(|c| c.mincells).max().unwrap_or(0),
            maxcells: self.criteria.iter().filter_map(|c| c.maxcells).min(),
            cmax: self.criteria.iter().map(|c| c.cmax).sum(),
        }
    }

    /// Export variable of the last active criterion that names one.
    pub fn cost_export(&self) -> Option<&'a str> {
        self.criteria.iter().rev().find_map(|c| c.cost_export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f64);
    impl CostModel<()> for Constant {
        fn name(&self) -> &str {
            "constant"
        }
        fn cost(&self, _tree: &(), _cell: CellId) -> f64 {
            self.0
        }
    }

    const CELL: CellId = CellId::new(0, 0);

    #[test]
    fn combination_takes_tightest_bounds() {
        let criteria = vec![
            Criterion::new("a")
                .with_model(Constant(2.0))
                .with_weight(0.5)
                .with_cmax(1.0)
                .with_min_level(1)
                .with_max_level(6)
                .with_mincells(10)
                .with_maxcells(500),
            Criterion::new("b")
                .with_model(Constant(3.0))
                .with_cmax(0.25)
                .with_min_level(2)
                .with_max_level(4)
                .with_mincells(20)
                .with_cost_export("cost"),
            Criterion::new("off")
                .with_model(Constant(100.0))
                .with_maxcells(1)
                .with_active(false),
        ];
        let active = ActiveCriteria::gather(&criteria);
        assert_eq!(active.len(), 2);
        assert_eq!(active.combined_cost(&(), CELL), 4.0);
        assert_eq!(active.combined_min_level(&(), CELL), 2);
        assert_eq!(active.combined_max_level(&(), CELL), 4);
        assert_eq!(
            active.budget(),
            Budget {
                mincells: 20,
                maxcells: Some(500),
                cmax: 1.25
            }
        );
        assert_eq!(active.cost_export(), Some("cost"));
    }

    #[test]
    fn missing_model_costs_nothing() {
        let criteria = vec![Criterion::<()>::new("empty").with_weight(3.0)];
        let active = ActiveCriteria::gather(&criteria);
        assert_eq!(active.combined_cost(&(), CELL), 0.0);
        assert!(!active.budget().is_bounded());
    }

    #[test]
    fn empty_set_has_neutral_bounds() {
        let criteria: Vec<Criterion<()>> = Vec::new();
        let active = ActiveCriteria::gather(&criteria);
        assert!(active.is_empty());
        assert_eq!(active.combined_min_level(&(), CELL), 0);
        assert_eq!(active.combined_max_level(&(), CELL), u32::MAX);
    }

    #[test]
    fn validation_rejects_bad_cfactor() {
        let c = Criterion::<()>::new("bad").with_cfactor(1.0);
        assert!(matches!(
            c.validate(),
            Err(MeshAmrError::InvalidCriterion { field: "cfactor", .. })
        ));
        assert!(Criterion::<()>::new("ok").validate().is_ok());
        assert!(Criterion::<()>::new("nan").with_cmax(f64::NAN).validate().is_err());
    }
}
