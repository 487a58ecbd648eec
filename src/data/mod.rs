//! Data module: field variables, per-call scratch and boundary conditions
#![warn(missing_docs)]

pub mod bc;
pub mod field;
pub mod scratch;

pub use bc::{BoundaryConditions, NoBoundaryConditions, ZeroGradient};
pub use field::{CoarseFine, FieldSet, FineCoarse, RESERVED_NAMES};
pub use scratch::ScratchSlots;
