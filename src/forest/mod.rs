//! Quad/oct-tree AMR forest.
//!
//! A forest is a lattice of root boxes (`ForestLayout::boxes` per axis), each
//! the root of a tree whose cells split into `2^D` children. Cells are stored
//! in a slot arena addressed by generational [`CellId`] handles; a spatial
//! index keyed by `(level, lattice coordinates)` answers same-level and
//! coarser neighbor queries for faces and corners, across periodic seams when
//! an axis is periodic.
//!
//! Lattice coordinates of a level-`l` cell range over
//! `0..boxes[axis] * 2^l` on each axis.

mod grading;

pub use grading::neighbor_offsets;

use crate::data::field::{CoarseFine, FieldSet, FineCoarse};
use crate::mesh_error::MeshAmrError;
use crate::topology::cell::CellId;
use crate::topology::tree::{AdaptiveTree, CoarsenVisitor};
use std::collections::HashMap;

/// Placement of the root boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct ForestLayout<const D: usize> {
    /// Number of root boxes along each axis.
    pub boxes: [u32; D],
    /// Whether each axis wraps around.
    pub periodic: [bool; D],
    /// Physical edge length of a root box.
    pub box_size: f64,
    /// Physical position of the lower corner of the lattice.
    pub origin: [f64; D],
}

impl<const D: usize> Default for ForestLayout<D> {
    fn default() -> Self {
        Self {
            boxes: [1; D],
            periodic: [false; D],
            box_size: 1.0,
            origin: [0.0; D],
        }
    }
}

impl<const D: usize> ForestLayout<D> {
    /// Layout with `boxes` root boxes and default geometry.
    pub fn with_boxes(boxes: [u32; D]) -> Self {
        Self {
            boxes,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MeshAmrError> {
        if D == 0 || D > 3 {
            return Err(MeshAmrError::InvalidLayout(format!(
                "dimension must be 1, 2 or 3, got {D}"
            )));
        }
        if let Some(axis) = self.boxes.iter().position(|&b| b == 0) {
            return Err(MeshAmrError::InvalidLayout(format!(
                "axis {axis} has no root boxes"
            )));
        }
        if !(self.box_size.is_finite() && self.box_size > 0.0) {
            return Err(MeshAmrError::InvalidLayout(format!(
                "box size must be positive, got {}",
                self.box_size
            )));
        }
        Ok(())
    }

    fn root_count(&self) -> usize {
        self.boxes.iter().map(|&b| b as usize).product()
    }
}

#[derive(Clone, Debug)]
struct Node<const D: usize> {
    generation: u32,
    alive: bool,
    level: u32,
    coords: [i64; D],
    parent: Option<CellId>,
    children: Vec<CellId>,
    boundary: bool,
    permanent: bool,
}

/// Forest representation for quadtrees (`D = 2`) or octrees (`D = 3`).
#[derive(Clone, Debug)]
pub struct Forest<const D: usize> {
    layout: ForestLayout<D>,
    nodes: Vec<Node<D>>,
    free: Vec<u32>,
    index: HashMap<(u32, [i64; D]), CellId>,
    roots: Vec<CellId>,
    leaf_count: usize,
    fields: FieldSet,
}

/// A quadtree forest (`D = 2`).
pub type QuadForest = Forest<2>;
/// An octree forest (`D = 3`).
pub type OctForest = Forest<3>;

impl<const D: usize> Forest<D> {
    /// Create a forest with one leaf per root box.
    pub fn new(layout: ForestLayout<D>) -> Result<Self, MeshAmrError> {
        layout.validate()?;
        let mut forest = Self {
            nodes: Vec::with_capacity(layout.root_count()),
            free: Vec::new(),
            index: HashMap::new(),
            roots: Vec::with_capacity(layout.root_count()),
            leaf_count: 0,
            fields: FieldSet::with_slots(0),
            layout,
        };
        for linear in 0..forest.layout.root_count() {
            let mut coords = [0i64; D];
            let mut rest = linear;
            for (axis, coord) in coords.iter_mut().enumerate() {
                let n = forest.layout.boxes[axis] as usize;
                *coord = (rest % n) as i64;
                rest /= n;
            }
            let root = forest.alloc(0, coords, None, false);
            forest.roots.push(root);
            forest.leaf_count += 1;
        }
        Ok(forest)
    }

    /// Create a forest uniformly refined to `level`.
    pub fn uniform(layout: ForestLayout<D>, level: u32) -> Result<Self, MeshAmrError> {
        let mut forest = Self::new(layout)?;
        for _ in 0..level {
            for leaf in forest.leaves() {
                forest.refine_single(leaf);
            }
        }
        Ok(forest)
    }

    pub fn layout(&self) -> &ForestLayout<D> {
        &self.layout
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.fields
    }

    /// Register a solution variable (copied on split, averaged on collapse).
    pub fn add_variable(&mut self, name: &str, description: &str) -> Result<(), MeshAmrError> {
        self.fields
            .add(name, description, CoarseFine::Copy, FineCoarse::Average)
    }

    pub fn value(&self, name: &str, cell: CellId) -> Result<f64, MeshAmrError> {
        self.check(cell)?;
        self.fields.value(name, cell.slot())
    }

    /// Lattice coordinates of `cell` at its own level.
    pub fn lattice_coords(&self, cell: CellId) -> [i64; D] {
        self.node(cell).coords
    }

    /// Physical edge length of `cell`.
    pub fn cell_size(&self, cell: CellId) -> f64 {
        self.layout.box_size / f64::powi(2.0, self.node(cell).level as i32)
    }

    /// Physical lower and upper corners of `cell`.
    pub fn bounds(&self, cell: CellId) -> ([f64; D], [f64; D]) {
        let node = self.node(cell);
        let h = self.cell_size(cell);
        let mut lo = [0.0; D];
        let mut hi = [0.0; D];
        for axis in 0..D {
            lo[axis] = self.layout.origin[axis] + node.coords[axis] as f64 * h;
            hi[axis] = lo[axis] + h;
        }
        (lo, hi)
    }

    /// Physical center of `cell`.
    pub fn center(&self, cell: CellId) -> [f64; D] {
        let (lo, hi) = self.bounds(cell);
        let mut c = [0.0; D];
        for axis in 0..D {
            c[axis] = 0.5 * (lo[axis] + hi[axis]);
        }
        c
    }

    /// Flag `cell` as a boundary (ghost/seam) cell. Children created later
    /// inherit the flag.
    pub fn set_boundary(&mut self, cell: CellId, boundary: bool) {
        self.node_mut(cell).boundary = boundary;
    }

    /// Re-initialise the variables of a parent from its children, following
    /// each variable's fine→coarse rule.
    pub fn coarse_init(&mut self, cell: CellId) {
        let children: Vec<usize> = self.node(cell).children.iter().map(|c| c.slot()).collect();
        self.fields.fine_to_coarse(cell.slot(), &children);
    }

    /// The same-level cell at `coords`, if it exists.
    pub fn cell_at(&self, level: u32, coords: [i64; D]) -> Option<CellId> {
        let coords = self.wrap(level, coords)?;
        self.index.get(&(level, coords)).copied()
    }

    /// The finest existing cell covering lattice position `coords` of `level`:
    /// the same-level cell if present, otherwise the coarser leaf.
    pub fn locate(&self, level: u32, coords: [i64; D]) -> Option<CellId> {
        let coords = self.wrap(level, coords)?;
        for l in (0..=level).rev() {
            let shift = level - l;
            let mut key = coords;
            for c in &mut key {
                *c >>= shift;
            }
            if let Some(&id) = self.index.get(&(l, key)) {
                return Some(id);
            }
        }
        None
    }

    fn wrap(&self, level: u32, mut coords: [i64; D]) -> Option<[i64; D]> {
        for axis in 0..D {
            let extent = (self.layout.boxes[axis] as i64) << level;
            if self.layout.periodic[axis] {
                coords[axis] = coords[axis].rem_euclid(extent);
            } else if coords[axis] < 0 || coords[axis] >= extent {
                return None;
            }
        }
        Some(coords)
    }

    fn check(&self, cell: CellId) -> Result<(), MeshAmrError> {
        if self.contains(cell) {
            Ok(())
        } else {
            Err(MeshAmrError::UnknownCell(cell))
        }
    }

    fn node(&self, cell: CellId) -> &Node<D> {
        match self.nodes.get(cell.slot()) {
            Some(node) if node.alive && node.generation == cell.generation() => node,
            _ => panic!("stale or foreign cell handle {cell}"),
        }
    }

    fn node_mut(&mut self, cell: CellId) -> &mut Node<D> {
        match self.nodes.get_mut(cell.slot()) {
            Some(node) if node.alive && node.generation == cell.generation() => node,
            _ => panic!("stale or foreign cell handle {cell}"),
        }
    }

    fn alloc(
        &mut self,
        level: u32,
        coords: [i64; D],
        parent: Option<CellId>,
        boundary: bool,
    ) -> CellId {
        let id = match self.free.pop() {
            Some(slot) => {
                let node = &mut self.nodes[slot as usize];
                node.alive = true;
                node.level = level;
                node.coords = coords;
                node.parent = parent;
                node.children.clear();
                node.boundary = boundary;
                node.permanent = false;
                CellId::new(slot, node.generation)
            }
            None => {
                let slot = u32::try_from(self.nodes.len()).expect("cell arena exhausted");
                self.nodes.push(Node {
                    generation: 0,
                    alive: true,
                    level,
                    coords,
                    parent,
                    children: Vec::new(),
                    boundary,
                    permanent: false,
                });
                CellId::new(slot, 0)
            }
        };
        self.fields.ensure_slots(self.nodes.len());
        self.index.insert((level, coords), id);
        id
    }

    fn release(&mut self, cell: CellId) {
        let node = self.node_mut(cell);
        let key = (node.level, node.coords);
        node.alive = false;
        node.generation = node.generation.wrapping_add(1);
        node.children.clear();
        node.parent = None;
        self.index.remove(&key);
        self.free.push(cell.slot() as u32);
    }

    /// Destroy the (leaf) children of `cell`, which becomes a leaf.
    fn collapse(&mut self, cell: CellId) {
        let children = std::mem::take(&mut self.node_mut(cell).children);
        debug_assert!(children.iter().all(|c| self.is_leaf(*c)));
        let slots: Vec<usize> = children.iter().map(|c| c.slot()).collect();
        self.fields.fine_to_coarse(cell.slot(), &slots);
        for child in children {
            self.release(child);
        }
        self.leaf_count -= Self::CHILDREN - 1;
    }
}

impl<const D: usize> AdaptiveTree for Forest<D> {
    const CHILDREN: usize = 1 << D;
    const FACES: usize = 2 * D;

    fn contains(&self, cell: CellId) -> bool {
        self.nodes
            .get(cell.slot())
            .is_some_and(|n| n.alive && n.generation == cell.generation())
    }

    fn is_leaf(&self, cell: CellId) -> bool {
        self.node(cell).children.is_empty()
    }

    fn level(&self, cell: CellId) -> u32 {
        self.node(cell).level
    }

    fn depth_below(&self, cell: CellId) -> u32 {
        let node = self.node(cell);
        node.children
            .iter()
            .map(|c| self.depth_below(*c))
            .max()
            .unwrap_or(node.level)
    }

    fn parent(&self, cell: CellId) -> Option<CellId> {
        self.node(cell).parent
    }

    fn children(&self, cell: CellId) -> &[CellId] {
        &self.node(cell).children
    }

    fn neighbor(&self, cell: CellId, direction: usize) -> Option<CellId> {
        assert!(direction < Self::FACES, "direction {direction} out of range");
        let node = self.node(cell);
        let mut coords = node.coords;
        coords[direction / 2] += if direction % 2 == 0 { 1 } else { -1 };
        self.locate(node.level, coords).filter(|n| *n != cell)
    }

    fn is_boundary(&self, cell: CellId) -> bool {
        self.node(cell).boundary
    }

    fn is_permanent(&self, cell: CellId) -> bool {
        self.node(cell).permanent
    }

    fn set_permanent(&mut self, cell: CellId, permanent: bool) {
        self.node_mut(cell).permanent = permanent;
    }

    fn roots(&self) -> Vec<CellId> {
        self.roots.clone()
    }

    fn cells(&self) -> Vec<CellId> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut stack: Vec<CellId> = self.roots.iter().rev().copied().collect();
        while let Some(cell) = stack.pop() {
            out.push(cell);
            stack.extend(self.node(cell).children.iter().rev().copied());
        }
        out
    }

    fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    fn depth(&self) -> u32 {
        self.roots
            .iter()
            .map(|r| self.depth_below(*r))
            .max()
            .unwrap_or(0)
    }

    fn slot_capacity(&self) -> usize {
        self.nodes.len()
    }

    fn refine_single(&mut self, cell: CellId) {
        let (level, coords, boundary) = {
            let node = self.node(cell);
            assert!(node.children.is_empty(), "cannot split non-leaf cell {cell}");
            (node.level, node.coords, node.boundary)
        };
        let mut children = Vec::with_capacity(Self::CHILDREN);
        for idx in 0..Self::CHILDREN {
            let mut child = [0i64; D];
            for axis in 0..D {
                child[axis] = coords[axis] * 2 + ((idx >> axis) & 1) as i64;
            }
            children.push(self.alloc(level + 1, child, Some(cell), boundary));
        }
        let slots: Vec<usize> = children.iter().map(|c| c.slot()).collect();
        self.fields.coarse_to_fine(cell.slot(), &slots);
        self.node_mut(cell).children = children;
        self.leaf_count += Self::CHILDREN - 1;
    }

    fn refine_with_corner_grading(&mut self, cell: CellId) -> Vec<CellId> {
        let mut split = Vec::new();
        self.refine_graded(cell, &mut split);
        split
    }

    fn refine_growth(&self, cell: CellId) -> usize {
        self.graded_split_count(cell) * (Self::CHILDREN - 1)
    }

    fn needs_corner_refinement(&self, cell: CellId) -> bool {
        self.is_leaf(cell) && self.adjacent_to_split_children(cell)
    }

    fn coarsen(&mut self, root: CellId, visitor: &mut dyn CoarsenVisitor<Self>) -> bool {
        self.coarsen_recursive(root, visitor)
    }

    fn variable_names(&self) -> Vec<String> {
        self.fields.names()
    }

    fn ensure_export_variable(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<(), MeshAmrError> {
        self.fields
            .get_or_add(name, description, CoarseFine::None, FineCoarse::None)
    }

    fn set_value(&mut self, name: &str, cell: CellId, value: f64) -> Result<(), MeshAmrError> {
        self.check(cell)?;
        self.fields.set(name, cell.slot(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_forest_has_one_leaf_per_box() {
        let forest = QuadForest::new(ForestLayout::with_boxes([3, 2])).unwrap();
        assert_eq!(forest.leaf_count(), 6);
        assert_eq!(forest.roots().len(), 6);
        assert_eq!(forest.depth(), 0);
        let coords: Vec<_> = forest
            .roots()
            .iter()
            .map(|r| forest.lattice_coords(*r))
            .collect();
        assert!(coords.contains(&[2, 1]));
    }

    #[test]
    fn invalid_layout_is_rejected() {
        let layout = ForestLayout::<2> {
            boxes: [0, 1],
            ..ForestLayout::default()
        };
        assert!(matches!(
            QuadForest::new(layout),
            Err(MeshAmrError::InvalidLayout(_))
        ));
    }

    #[test]
    fn uniform_refinement_counts() {
        let forest = QuadForest::uniform(ForestLayout::default(), 3).unwrap();
        assert_eq!(forest.leaf_count(), 64);
        assert_eq!(forest.leaves().len(), 64);
        assert_eq!(forest.depth(), 3);
        assert_eq!(forest.cells_at_level(2).len(), 16);

        let oct = OctForest::uniform(ForestLayout::default(), 2).unwrap();
        assert_eq!(oct.leaf_count(), 64);
    }

    #[test]
    fn neighbors_return_same_level_or_coarser() {
        let mut forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
        let root = forest.roots()[0];
        let first = forest.children(root)[0];
        forest.refine_single(first);
        let fine = forest.children(first)[1]; // coords [1, 0] at level 2
        assert_eq!(forest.lattice_coords(fine), [1, 0]);

        let right = forest.neighbor(fine, 0).unwrap();
        assert_eq!(forest.level(right), 1);
        assert_eq!(forest.lattice_coords(right), [1, 0]);

        let left = forest.neighbor(fine, 1).unwrap();
        assert_eq!(forest.level(left), 2);
        assert_eq!(forest.neighbor(fine, 3), None);
    }

    #[test]
    fn periodic_axes_wrap() {
        let layout = ForestLayout::<2> {
            boxes: [2, 1],
            periodic: [true, false],
            ..ForestLayout::default()
        };
        let forest = QuadForest::uniform(layout, 1).unwrap();
        let west = forest.cell_at(1, [0, 0]).unwrap();
        let east = forest.cell_at(1, [3, 0]).unwrap();
        assert_eq!(forest.neighbor(west, 1), Some(east));
        assert_eq!(forest.neighbor(east, 0), Some(west));
        assert_eq!(forest.neighbor(west, 3), None);
    }

    #[test]
    fn collapsed_slots_are_reused_with_new_generation() {
        let mut forest = QuadForest::new(ForestLayout::default()).unwrap();
        let root = forest.roots()[0];
        forest.refine_single(root);
        let old = forest.children(root)[0];
        forest.collapse(root);
        assert!(!forest.contains(old));
        assert_eq!(forest.leaf_count(), 1);

        forest.refine_single(root);
        let reused = forest
            .children(root)
            .iter()
            .copied()
            .find(|c| c.slot() == old.slot())
            .unwrap();
        assert_ne!(reused, old);
        assert!(forest.contains(reused));
    }

    #[test]
    fn fields_follow_split_and_collapse() {
        let mut forest = QuadForest::new(ForestLayout::default()).unwrap();
        forest.add_variable("p", "pressure").unwrap();
        let root = forest.roots()[0];
        forest.set_value("p", root, 2.0).unwrap();
        forest.refine_single(root);
        let kids = forest.children(root).to_vec();
        assert!(kids.iter().all(|k| forest.value("p", *k).unwrap() == 2.0));
        for (i, k) in kids.iter().enumerate() {
            forest.set_value("p", *k, i as f64).unwrap();
        }
        forest.coarse_init(root);
        assert_eq!(forest.value("p", root).unwrap(), 1.5);
        forest.collapse(root);
        assert_eq!(forest.value("p", root).unwrap(), 1.5);
        assert_eq!(
            forest.value("p", kids[0]),
            Err(MeshAmrError::UnknownCell(kids[0]))
        );
    }

    #[test]
    fn geometry_of_cells() {
        let layout = ForestLayout::<2> {
            box_size: 2.0,
            origin: [-1.0, -1.0],
            ..ForestLayout::default()
        };
        let forest = QuadForest::uniform(layout, 1).unwrap();
        let cell = forest.cell_at(1, [1, 0]).unwrap();
        assert_eq!(forest.cell_size(cell), 1.0);
        assert_eq!(forest.bounds(cell), ([0.0, -1.0], [1.0, 0.0]));
        assert_eq!(forest.center(cell), [0.5, -0.5]);
    }

    #[test]
    #[should_panic(expected = "stale or foreign cell handle")]
    fn stale_handles_panic() {
        let mut forest = QuadForest::new(ForestLayout::default()).unwrap();
        let root = forest.roots()[0];
        forest.refine_single(root);
        let child = forest.children(root)[0];
        forest.collapse(root);
        forest.level(child);
    }
}
