//! Boundary-condition refresh applied to each variable after a topology change.

use crate::forest::Forest;
use crate::mesh_error::MeshAmrError;
use crate::topology::tree::AdaptiveTree;

/// Re-establishes the boundary values of one variable.
pub trait BoundaryConditions<T: ?Sized> {
    fn apply(&mut self, tree: &mut T, variable: &str) -> Result<(), MeshAmrError>;
}

/// Leaves boundary values untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBoundaryConditions;

impl<T: ?Sized> BoundaryConditions<T> for NoBoundaryConditions {
    fn apply(&mut self, _tree: &mut T, _variable: &str) -> Result<(), MeshAmrError> {
        Ok(())
    }
}

/// Homogeneous Neumann condition: every boundary leaf takes the mean of its
/// interior face neighbors.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroGradient;

impl<const D: usize> BoundaryConditions<Forest<D>> for ZeroGradient {
    fn apply(&mut self, tree: &mut Forest<D>, variable: &str) -> Result<(), MeshAmrError> {
        let mut updates = Vec::new();
        for leaf in tree.leaves().into_iter().filter(|c| tree.is_boundary(*c)) {
            let mut sum = 0.0;
            let mut n = 0usize;
            for dir in 0..Forest::<D>::FACES {
                if let Some(nb) = tree.neighbor(leaf, dir).filter(|nb| !tree.is_boundary(*nb)) {
                    sum += tree.value(variable, nb)?;
                    n += 1;
                }
            }
            if n > 0 {
                updates.push((leaf, sum / n as f64));
            }
        }
        for (leaf, value) in updates {
            tree.set_value(variable, leaf, value).map_err(|e| {
                MeshAmrError::BoundaryCondition {
                    variable: variable.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }
}
