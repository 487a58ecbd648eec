//! Top-level module for tree topology abstractions.
//!
//! This module provides the handle type and the trait the adaptation
//! algorithms are written against:
//! - [`CellId`], a generational cell handle
//! - [`AdaptiveTree`], the hierarchical mesh seam, and [`CoarsenVisitor`],
//!   the predicate/cleanup pair driving coarsening
//!
//! The concrete quadtree/octree lives in [`crate::forest`].

pub mod cell;
pub mod tree;

pub use cell::CellId;
pub use tree::{AdaptiveTree, CoarsenVisitor};
