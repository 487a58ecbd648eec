use crate::forest::{Forest, neighbor_offsets};
use crate::mesh_error::MeshAmrError;
use crate::topology::tree::AdaptiveTree;

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), MeshAmrError>;
}

/// Helper macro to run a fallible check and panic on error when invariant
/// checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

impl<const D: usize> Forest<D> {
    /// Check that every pair of leaves sharing a face or a corner differs by
    /// at most one level.
    pub fn validate_grading(&self) -> Result<(), MeshAmrError> {
        let offsets = neighbor_offsets::<D>();
        for leaf in self.leaves() {
            let level = self.level(leaf);
            let coords = self.lattice_coords(leaf);
            for offset in &offsets {
                let mut target = coords;
                for axis in 0..D {
                    target[axis] += offset[axis];
                }
                if let Some(other) = self.locate(level, target) {
                    let other_level = self.level(other);
                    if other_level + 1 < level {
                        return Err(MeshAmrError::GradingViolation {
                            a: leaf,
                            level_a: level,
                            b: other,
                            level_b: other_level,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl<const D: usize> DebugInvariants for Forest<D> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "forest");
    }

    fn validate_invariants(&self) -> Result<(), MeshAmrError> {
        let cells = self.cells();
        let mut leaves = 0usize;
        for &cell in &cells {
            let level = self.level(cell);
            let children = self.children(cell);
            match children.len() {
                0 => leaves += 1,
                n if n == Self::CHILDREN => {}
                n => {
                    return Err(MeshAmrError::CorruptTree(format!(
                        "cell {cell} has {n} children"
                    )));
                }
            }
            for &child in children {
                if self.parent(child) != Some(cell) || self.level(child) != level + 1 {
                    return Err(MeshAmrError::CorruptTree(format!(
                        "child {child} is not linked back to {cell}"
                    )));
                }
            }
            if self.cell_at(level, self.lattice_coords(cell)) != Some(cell) {
                return Err(MeshAmrError::CorruptTree(format!(
                    "cell {cell} is missing from the spatial index"
                )));
            }
        }
        if leaves != self.leaf_count() {
            return Err(MeshAmrError::CorruptTree(format!(
                "leaf count {} does not match {} leaves",
                self.leaf_count(),
                leaves
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{ForestLayout, QuadForest};

    #[test]
    fn uniform_forest_is_valid_and_graded() {
        let forest = QuadForest::uniform(ForestLayout::with_boxes([2, 2]), 2).unwrap();
        forest.validate_invariants().unwrap();
        forest.validate_grading().unwrap();
        forest.debug_assert_invariants();
    }

    #[test]
    fn ungraded_refinement_is_reported() {
        let mut forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
        let a = forest.cell_at(1, [0, 0]).unwrap();
        forest.refine_single(a);
        let b = forest.cell_at(2, [1, 1]).unwrap();
        forest.refine_single(b);
        forest.validate_invariants().unwrap();
        assert!(matches!(
            forest.validate_grading(),
            Err(MeshAmrError::GradingViolation { .. })
        ));
    }
}
