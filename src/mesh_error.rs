//! MeshAmrError: Unified error type for mesh-amr public APIs
//!
//! Every fallible operation of the adaptation pipeline (criterion
//! construction, field access, reshaping collaborators, collective reduction)
//! reports through this enum. Programmer errors such as stale cell handles
//! panic instead.

use crate::topology::cell::CellId;
use thiserror::Error;

/// Unified error type for mesh-amr operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshAmrError {
    /// A criterion parameter is out of range or inconsistent.
    #[error("Criterion error: invalid `{field}` for `{criterion}`: {reason}")]
    InvalidCriterion {
        criterion: String,
        field: &'static str,
        reason: String,
    },
    /// No factory is registered under the requested criterion kind.
    #[error("Criterion error: unknown criterion kind `{0}`")]
    UnknownCriterionKind(String),
    /// A field variable name collides with a reserved keyword.
    #[error("Field error: `{0}` is a reserved keyword")]
    ReservedVariableName(String),
    /// A field variable with this name already exists.
    #[error("Field error: variable `{0}` already exists")]
    DuplicateVariable(String),
    /// No field variable with this name exists.
    #[error("Field error: unknown variable `{0}`")]
    UnknownVariable(String),
    /// The cell handle does not refer to a live cell of this tree.
    #[error("Topology error: cell {0} is not part of the tree")]
    UnknownCell(CellId),
    /// The forest layout cannot describe a valid root lattice.
    #[error("Topology error: invalid forest layout: {0}")]
    InvalidLayout(String),
    /// The 2:1 grading invariant is violated between two leaves.
    #[error("Topology error: grading violated between {a} (level {level_a}) and {b} (level {level_b})")]
    GradingViolation {
        a: CellId,
        level_a: u32,
        b: CellId,
        level_b: u32,
    },
    /// Internal tree bookkeeping is inconsistent.
    #[error("Topology error: {0}")]
    CorruptTree(String),
    /// Boundary/partition matching failed after a topology change.
    #[error("Boundary matching error: {0}")]
    BoundaryMatch(String),
    /// Reapplying boundary conditions to a variable failed.
    #[error("Boundary condition error on `{variable}`: {reason}")]
    BoundaryCondition { variable: String, reason: String },
    /// Cut-cell bookkeeping failed.
    #[error("Cut-cell error: {0}")]
    CutCell(String),
    /// The collective reduction across partitions failed.
    #[error("Collective error: {0}")]
    Collective(String),
}
