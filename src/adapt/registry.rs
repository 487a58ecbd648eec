//! Building criteria from parsed configuration.
//!
//! A [`CriterionRegistry`] maps a kind name to a factory producing the cost
//! model of that kind. It is built once (usually through
//! [`CriterionRegistry::with_builtin`]) and passed by reference to whatever
//! turns configuration into [`Criterion`]s. Applications add their own kinds
//! with [`CriterionRegistry::register`].

use crate::adapt::criterion::{CostModel, Criterion, DEFAULT_MAX_LEVEL};
use crate::adapt::estimators::{
    CurvatureCost, ErrorCost, FunctionCost, GradientCost, VorticityCost,
};
use crate::adapt::schedule::EventSchedule;
use crate::forest::Forest;
use crate::mesh_error::MeshAmrError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters of one criterion, as read from a configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CriterionConfig {
    /// Registry key of the cost model.
    pub kind: String,
    /// Name used in logs and errors; defaults to `kind`.
    pub name: Option<String>,
    pub minlevel: u32,
    pub maxlevel: u32,
    pub mincells: usize,
    pub maxcells: Option<usize>,
    pub cmax: f64,
    pub weight: f64,
    /// Defaults to the cost model's own divisor.
    pub cfactor: Option<f64>,
    pub active: bool,
    pub cost_export: Option<String>,
    /// Field the scalar models look at.
    pub variable: Option<String>,
    /// Velocity components for the flow models, one per axis.
    pub velocity: Vec<String>,
    pub lambda: Option<Vec<f64>>,
    pub dimension: Option<f64>,
    pub schedule: Option<EventSchedule>,
}

impl Default for CriterionConfig {
    fn default() -> Self {
        Self {
            kind: "function".to_string(),
            name: None,
            minlevel: 0,
            maxlevel: DEFAULT_MAX_LEVEL,
            mincells: 0,
            maxcells: None,
            cmax: 0.0,
            weight: 1.0,
            cfactor: None,
            active: true,
            cost_export: None,
            variable: None,
            velocity: Vec::new(),
            lambda: None,
            dimension: None,
            schedule: None,
        }
    }
}

impl CriterionConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> MeshAmrError {
        MeshAmrError::InvalidCriterion {
            criterion: self.display_name().to_string(),
            field,
            reason: reason.into(),
        }
    }

    fn require_variable(&self) -> Result<&str, MeshAmrError> {
        self.variable
            .as_deref()
            .ok_or_else(|| self.invalid("variable", "a variable is required"))
    }

    fn lambda_array<const D: usize>(&self) -> Result<[f64; D], MeshAmrError> {
        match &self.lambda {
            None => Ok([1.0; D]),
            Some(l) => <[f64; D]>::try_from(l.as_slice()).map_err(|_| {
                self.invalid("lambda", format!("expected {D} values, got {}", l.len()))
            }),
        }
    }

    fn gradient<const D: usize>(&self) -> Result<GradientCost<D>, MeshAmrError> {
        Ok(GradientCost::variable(self.require_variable()?)
            .with_lambda(self.lambda_array::<D>()?)
            .with_dimension(self.dimension.unwrap_or(1.0)))
    }
}

/// Builds the cost model of one kind.
pub type CriterionFactory<T> =
    Box<dyn Fn(&CriterionConfig) -> Result<Box<dyn CostModel<T>>, MeshAmrError> + Send + Sync>;

pub struct CriterionRegistry<T> {
    factories: HashMap<String, CriterionFactory<T>>,
}

impl<T> Default for CriterionRegistry<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T: 'static> CriterionRegistry<T> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory of `kind`.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&CriterionConfig) -> Result<Box<dyn CostModel<T>>, MeshAmrError>
        + Send
        + Sync
        + 'static,
    ) {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a validated criterion from `config`.
    pub fn build(&self, config: &CriterionConfig) -> Result<Criterion<T>, MeshAmrError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| MeshAmrError::UnknownCriterionKind(config.kind.clone()))?;
        if config.minlevel > config.maxlevel {
            return Err(config.invalid(
                "minlevel",
                format!("{} exceeds maxlevel {}", config.minlevel, config.maxlevel),
            ));
        }
        let mut criterion = Criterion::new(config.display_name())
            .with_boxed_model(factory(config)?)
            .with_min_level(config.minlevel)
            .with_max_level(config.maxlevel)
            .with_weight(config.weight)
            .with_cmax(config.cmax)
            .with_mincells(config.mincells)
            .with_active(config.active);
        if let Some(cfactor) = config.cfactor {
            criterion = criterion.with_cfactor(cfactor);
        }
        if let Some(maxcells) = config.maxcells {
            criterion = criterion.with_maxcells(maxcells);
        }
        if let Some(name) = &config.cost_export {
            criterion = criterion.with_cost_export(name.clone());
        }
        if let Some(schedule) = &config.schedule {
            criterion = criterion.with_schedule(schedule.clone());
        }
        criterion.validate()?;
        Ok(criterion)
    }
}

impl<const D: usize> CriterionRegistry<Forest<D>> {
    /// Registry holding the built-in kinds: `function`, `gradient`, `error`,
    /// `vorticity` and `curvature`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("function", |c| {
            Ok(Box::new(FunctionCost::<D>::variable(c.require_variable()?)))
        });
        registry.register("gradient", |c| Ok(Box::new(c.gradient::<D>()?)));
        registry.register("error", |c| Ok(Box::new(ErrorCost::new(c.gradient::<D>()?))));
        registry.register("vorticity", |c| {
            Ok(Box::new(VorticityCost::<D>::new(c.velocity.clone())?))
        });
        registry.register("curvature", |c| {
            Ok(Box::new(CurvatureCost::<D>::new(c.velocity.clone())?))
        });
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::QuadForest;
    use crate::topology::cell::CellId;

    #[test]
    fn builtin_kinds_are_registered() {
        let registry = CriterionRegistry::<QuadForest>::with_builtin();
        assert_eq!(
            registry.kinds(),
            vec!["curvature", "error", "function", "gradient", "vorticity"]
        );
    }

    #[test]
    fn error_kind_defaults_to_cfactor_two() {
        let registry = CriterionRegistry::<QuadForest>::with_builtin();
        let config = CriterionConfig {
            kind: "error".into(),
            variable: Some("T".into()),
            cmax: 1e-2,
            ..CriterionConfig::default()
        };
        let criterion = registry.build(&config).unwrap();
        assert_eq!(criterion.cfactor(), 2.0);
        assert_eq!(criterion.name(), "error");
    }

    #[test]
    fn configuration_errors_are_reported() {
        let registry = CriterionRegistry::<QuadForest>::with_builtin();
        let unknown = CriterionConfig {
            kind: "magic".into(),
            ..CriterionConfig::default()
        };
        assert_eq!(
            registry.build(&unknown).unwrap_err(),
            MeshAmrError::UnknownCriterionKind("magic".into())
        );
        let missing = CriterionConfig::default();
        assert!(matches!(
            registry.build(&missing),
            Err(MeshAmrError::InvalidCriterion { field: "variable", .. })
        ));
        let lambda = CriterionConfig {
            kind: "gradient".into(),
            variable: Some("T".into()),
            lambda: Some(vec![1.0]),
            ..CriterionConfig::default()
        };
        assert!(matches!(
            registry.build(&lambda),
            Err(MeshAmrError::InvalidCriterion { field: "lambda", .. })
        ));
    }

    #[test]
    fn user_kinds_can_be_registered() {
        struct Half;
        impl CostModel<QuadForest> for Half {
            fn name(&self) -> &str {
                "half"
            }
            fn cost(&self, _tree: &QuadForest, _cell: CellId) -> f64 {
                0.5
            }
        }
        let mut registry = CriterionRegistry::<QuadForest>::new();
        registry.register("half", |_| Ok(Box::new(Half)));
        let config = CriterionConfig {
            kind: "half".into(),
            name: Some("mine".into()),
            ..CriterionConfig::default()
        };
        let criterion = registry.build(&config).unwrap();
        assert_eq!(criterion.name(), "mine");
        assert!(criterion.has_model());
    }
}
