//! Built-in cost models for [`Forest`] meshes.
//!
//! All derivative-based models work with undivided differences: a centred
//! difference across a cell of size `h` approximates `h * df/dx`, so the
//! resulting costs are already scaled by the local resolution.

use crate::adapt::criterion::CostModel;
use crate::forest::Forest;
use crate::mesh_error::MeshAmrError;
use crate::topology::cell::CellId;
use crate::topology::tree::AdaptiveTree;
use std::sync::Arc;

/// Per-cell scalar function.
pub type CellFn<const D: usize> = Arc<dyn Fn(&Forest<D>, CellId) -> f64 + Send + Sync>;

/// Where a scalar field comes from.
#[derive(Clone)]
pub enum FieldSource<const D: usize> {
    /// A registered variable of the forest.
    Variable(String),
    /// A function sampled on the leaves.
    Function(CellFn<D>),
}

impl<const D: usize> std::fmt::Debug for FieldSource<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSource::Variable(name) => f.debug_tuple("Variable").field(name).finish(),
            FieldSource::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Field values for every live cell: leaves from the source, parents as the
/// mean of their children.
#[derive(Clone, Debug, Default)]
struct SampledField {
    values: Vec<f64>,
}

impl SampledField {
    fn sample<const D: usize>(
        forest: &Forest<D>,
        source: &FieldSource<D>,
    ) -> Result<Self, MeshAmrError> {
        let mut values = vec![0.0; forest.slot_capacity()];
        let cells = forest.cells();
        // reverse pre-order visits children before their parent
        for &cell in cells.iter().rev() {
            values[cell.slot()] = if forest.is_leaf(cell) {
                match source {
                    FieldSource::Variable(name) => forest.value(name, cell)?,
                    FieldSource::Function(f) => f(forest, cell),
                }
            } else {
                let children = forest.children(cell);
                children.iter().map(|c| values[c.slot()]).sum::<f64>() / children.len() as f64
            };
        }
        Ok(Self { values })
    }

    fn at(&self, cell: CellId) -> f64 {
        self.values.get(cell.slot()).copied().unwrap_or(0.0)
    }

    /// Undivided centred difference along `axis`. Falls back to one-sided
    /// differences on domain edges and to the (halved) parent gradient next
    /// to coarser cells.
    fn gradient<const D: usize>(&self, forest: &Forest<D>, cell: CellId, axis: usize) -> f64 {
        let level = forest.level(cell);
        let up = forest.neighbor(cell, 2 * axis);
        let down = forest.neighbor(cell, 2 * axis + 1);
        let coarser = |n: Option<CellId>| n.is_some_and(|n| forest.level(n) < level);
        if coarser(up) || coarser(down) {
            return forest
                .parent(cell)
                .map_or(0.0, |p| self.gradient(forest, p, axis) / 2.0);
        }
        match (up, down) {
            (Some(u), Some(d)) => (self.at(u) - self.at(d)) / 2.0,
            (Some(u), None) => self.at(u) - self.at(cell),
            (None, Some(d)) => self.at(cell) - self.at(d),
            (None, None) => 0.0,
        }
    }

    /// Undivided second difference along `axis`, zero unless both
    /// neighbors exist.
    fn second_derivative<const D: usize>(&self, forest: &Forest<D>, cell: CellId, axis: usize) -> f64 {
        let (Some(up), Some(down)) = (
            forest.neighbor(cell, 2 * axis),
            forest.neighbor(cell, 2 * axis + 1),
        ) else {
            return 0.0;
        };
        let level = forest.level(cell);
        if forest.level(up) < level || forest.level(down) < level {
            return forest
                .parent(cell)
                .map_or(0.0, |p| self.second_derivative(forest, p, axis) / 4.0);
        }
        self.at(up) - 2.0 * self.at(cell) + self.at(down)
    }
}

// -----------------------------------------------------------------------------
// Function
// -----------------------------------------------------------------------------

/// Cost given directly by a function or by the value of a variable.
#[derive(Clone, Debug)]
pub struct FunctionCost<const D: usize> {
    source: FieldSource<D>,
}

impl<const D: usize> FunctionCost<D> {
    pub fn new(f: impl Fn(&Forest<D>, CellId) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            source: FieldSource::Function(Arc::new(f)),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            source: FieldSource::Variable(name.into()),
        }
    }
}

impl<const D: usize> CostModel<Forest<D>> for FunctionCost<D> {
    fn name(&self) -> &str {
        "function"
    }

    fn prepare(&mut self, tree: &Forest<D>) -> Result<(), MeshAmrError> {
        if let FieldSource::Variable(name) = &self.source {
            if !tree.fields().contains(name) {
                return Err(MeshAmrError::UnknownVariable(name.clone()));
            }
        }
        Ok(())
    }

    fn cost(&self, tree: &Forest<D>, cell: CellId) -> f64 {
        match &self.source {
            FieldSource::Variable(name) => tree.value(name, cell).unwrap_or(0.0),
            FieldSource::Function(f) => f(tree, cell),
        }
    }
}

// -----------------------------------------------------------------------------
// Gradient
// -----------------------------------------------------------------------------

/// Norm of the gradient of a field, scaled per axis by `lambda` and globally
/// by `dimension`.
#[derive(Clone, Debug)]
pub struct GradientCost<const D: usize> {
    source: FieldSource<D>,
    lambda: [f64; D],
    dimension: f64,
    field: SampledField,
}

impl<const D: usize> GradientCost<D> {
    pub fn new(source: FieldSource<D>) -> Self {
        Self {
            source,
            lambda: [1.0; D],
            dimension: 1.0,
            field: SampledField::default(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(FieldSource::Variable(name.into()))
    }

    /// Per-axis metric stretching.
    pub fn with_lambda(mut self, lambda: [f64; D]) -> Self {
        self.lambda = lambda;
        self
    }

    /// Overall scale (the field's physical unit).
    pub fn with_dimension(mut self, dimension: f64) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn dimension(&self) -> f64 {
        self.dimension
    }

    fn sample(&mut self, tree: &Forest<D>) -> Result<(), MeshAmrError> {
        self.field = SampledField::sample(tree, &self.source)?;
        Ok(())
    }
}

impl<const D: usize> CostModel<Forest<D>> for GradientCost<D> {
    fn name(&self) -> &str {
        "gradient"
    }

    fn prepare(&mut self, tree: &Forest<D>) -> Result<(), MeshAmrError> {
        self.sample(tree)
    }

    fn cost(&self, tree: &Forest<D>, cell: CellId) -> f64 {
        let sum2: f64 = (0..D)
            .map(|axis| {
                let g = self.lambda[axis] * self.field.gradient(tree, cell, axis);
                g * g
            })
            .sum();
        sum2.sqrt() * self.dimension
    }
}

// -----------------------------------------------------------------------------
// Error estimate
// -----------------------------------------------------------------------------

/// Interpolation-error estimate from the Frobenius norm of the undivided
/// Hessian of a field.
#[derive(Clone, Debug)]
pub struct ErrorCost<const D: usize> {
    gradient: GradientCost<D>,
    hessian_norm: Vec<f64>,
}

impl<const D: usize> ErrorCost<D> {
    pub fn new(gradient: GradientCost<D>) -> Self {
        Self {
            gradient,
            hessian_norm: Vec::new(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(GradientCost::variable(name))
    }
}

impl<const D: usize> CostModel<Forest<D>> for ErrorCost<D> {
    fn name(&self) -> &str {
        "error"
    }

    fn prepare(&mut self, tree: &Forest<D>) -> Result<(), MeshAmrError> {
        self.gradient.sample(tree)?;
        let field = &self.gradient.field;
        let cells = tree.cells();
        let mut norm = vec![0.0; tree.slot_capacity()];
        let mut dv = SampledField {
            values: vec![0.0; tree.slot_capacity()],
        };
        for axis in 0..D {
            for &cell in &cells {
                dv.values[cell.slot()] = field.gradient(tree, cell, axis);
            }
            for &cell in &cells {
                let mut sum = 0.0;
                for other in (0..D).filter(|j| *j != axis) {
                    let g = dv.gradient(tree, cell, other);
                    sum += g * g;
                }
                let g = field.second_derivative(tree, cell, axis);
                norm[cell.slot()] += sum + g * g;
            }
        }
        self.hessian_norm = norm;
        Ok(())
    }

    fn cost(&self, _tree: &Forest<D>, cell: CellId) -> f64 {
        let norm = self.hessian_norm.get(cell.slot()).copied().unwrap_or(0.0);
        norm.sqrt() / 8.0 * self.gradient.dimension
    }

    fn default_cfactor(&self) -> f64 {
        2.0
    }
}

// -----------------------------------------------------------------------------
// Velocity-based models
// -----------------------------------------------------------------------------

fn velocity_fields<const D: usize>(
    tree: &Forest<D>,
    names: &[String],
) -> Result<Vec<SampledField>, MeshAmrError> {
    names
        .iter()
        .map(|n| SampledField::sample(tree, &FieldSource::Variable(n.clone())))
        .collect()
}

fn check_components<const D: usize>(kind: &str, names: &[String]) -> Result<(), MeshAmrError> {
    if names.len() != D {
        return Err(MeshAmrError::InvalidCriterion {
            criterion: kind.to_string(),
            field: "velocity",
            reason: format!("expected {D} components, got {}", names.len()),
        });
    }
    Ok(())
}

/// Undivided vorticity magnitude relative to the largest velocity norm.
#[derive(Clone, Debug)]
pub struct VorticityCost<const D: usize> {
    velocity: Vec<String>,
    fields: Vec<SampledField>,
    max_speed: f64,
}

impl<const D: usize> VorticityCost<D> {
    /// `velocity` names one variable per axis.
    pub fn new(velocity: Vec<String>) -> Result<Self, MeshAmrError> {
        check_components::<D>("vorticity", &velocity)?;
        Ok(Self {
            velocity,
            fields: Vec::new(),
            max_speed: 0.0,
        })
    }
}

impl<const D: usize> CostModel<Forest<D>> for VorticityCost<D> {
    fn name(&self) -> &str {
        "vorticity"
    }

    fn prepare(&mut self, tree: &Forest<D>) -> Result<(), MeshAmrError> {
        self.fields = velocity_fields(tree, &self.velocity)?;
        self.max_speed = tree
            .leaves()
            .into_iter()
            .map(|c| self.fields.iter().map(|f| f.at(c).powi(2)).sum::<f64>().sqrt())
            .fold(0.0, f64::max);
        Ok(())
    }

    fn cost(&self, tree: &Forest<D>, cell: CellId) -> f64 {
        if self.max_speed <= 0.0 || self.fields.len() != D {
            return 0.0;
        }
        let mut sum2 = 0.0;
        for i in 0..D {
            for j in i + 1..D {
                let w = self.fields[j].gradient(tree, cell, i) - self.fields[i].gradient(tree, cell, j);
                sum2 += w * w;
            }
        }
        sum2.sqrt() / self.max_speed
    }
}

/// Undivided streamline curvature estimate `|(u.grad)u| / |u|^2`.
#[derive(Clone, Debug)]
pub struct CurvatureCost<const D: usize> {
    velocity: Vec<String>,
    fields: Vec<SampledField>,
}

impl<const D: usize> CurvatureCost<D> {
    pub fn new(velocity: Vec<String>) -> Result<Self, MeshAmrError> {
        check_components::<D>("curvature", &velocity)?;
        Ok(Self {
            velocity,
            fields: Vec::new(),
        })
    }
}

impl<const D: usize> CostModel<Forest<D>> for CurvatureCost<D> {
    fn name(&self) -> &str {
        "curvature"
    }

    fn prepare(&mut self, tree: &Forest<D>) -> Result<(), MeshAmrError> {
        self.fields = velocity_fields(tree, &self.velocity)?;
        Ok(())
    }

    fn cost(&self, tree: &Forest<D>, cell: CellId) -> f64 {
        if self.fields.len() != D {
            return 0.0;
        }
        let u: Vec<f64> = self.fields.iter().map(|f| f.at(cell)).collect();
        let u2: f64 = u.iter().map(|x| x * x).sum();
        if u2 == 0.0 {
            return 0.0;
        }
        let mut ugu = 0.0;
        for i in 0..D {
            let ugui: f64 = (0..D)
                .map(|j| u[j] * self.fields[i].gradient(tree, cell, j))
                .sum();
            ugu += ugui * ugui;
        }
        ugu.sqrt() / u2
    }
}
