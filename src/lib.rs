#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-amr
//!
//! mesh-amr decides, every time step of a PDE solver, which cells of a
//! quadtree/octree mesh are split and which are merged. Refinement criteria
//! score cells; the scores are aggregated bottom-up and handed either to a
//! budgeted dual-queue balancer (when a cell cap is set) or to a single-pass
//! mark/commit balancer. After a collective change reduction across
//! partitions the mesh is reshaped back to 2:1 grading and its boundary,
//! cut-cell and field state is refreshed.
//!
//! ## Features
//! - Generic [`AdaptiveTree`](topology::tree::AdaptiveTree) seam plus a ready
//!   quad/oct-tree [`Forest`](forest::Forest) with periodic axes and field
//!   variables
//! - Built-in gradient, Hessian error, vorticity and curvature criteria, and a
//!   registry building criteria from serde-parsed configuration
//! - Pluggable collectives (serial, threads, MPI) for partitioned meshes
//! - Running adaptation statistics
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-amr = "0.3"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! ```ignore
//! use mesh_amr::prelude::*;
//!
//! let mut forest = QuadForest::uniform(ForestLayout::default(), 3)?;
//! forest.add_variable("T", "temperature")?;
//! let mut adaptor = MeshAdaptor::new();
//! adaptor.add_criterion(
//!     Criterion::new("T gradient")
//!         .with_model(GradientCost::variable("T"))
//!         .with_cmax(1e-2)
//!         .with_max_level(6),
//! )?;
//! adaptor.advance(t, i);
//! adaptor.adapt(&mut forest, &NoComm)?;
//! ```
//!
//! ## Determinism
//!
//! Queue ties are broken by insertion order, so a run is reproducible for a
//! given tree and criteria. Correctness does not depend on the tie order.

pub mod adapt;
pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod forest;
pub mod mesh_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapt::criterion::{ActiveCriteria, Budget, CostModel, Criterion};
    pub use crate::adapt::estimators::{
        CurvatureCost, ErrorCost, FieldSource, FunctionCost, GradientCost, VorticityCost,
    };
    pub use crate::adapt::registry::{CriterionConfig, CriterionRegistry};
    pub use crate::adapt::reshape::{
        BoundaryMatcher, CutCellHook, GhostMatcher, Reshaper, SolidCells,
    };
    pub use crate::adapt::schedule::EventSchedule;
    pub use crate::adapt::stats::{AdaptStats, Range};
    pub use crate::adapt::{AdaptOutcome, MeshAdaptor, adapt_mesh};
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::data::bc::{BoundaryConditions, ZeroGradient};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::forest::{Forest, ForestLayout, OctForest, QuadForest};
    pub use crate::mesh_error::MeshAmrError;
    pub use crate::topology::cell::CellId;
    pub use crate::topology::tree::{AdaptiveTree, CoarsenVisitor};
}
