//! Named per-cell scalar variables with inter-level transfer rules.
//!
//! A [`FieldSet`] stores one `f64` per cell slot for every registered
//! variable. The owning tree calls [`FieldSet::coarse_to_fine`] after a split
//! and [`FieldSet::fine_to_coarse`] before a collapse, so field data follows
//! topology changes without the adaptation algorithms having to know about
//! individual variables.

use crate::mesh_error::MeshAmrError;

/// Names that cannot be used for field variables (they denote coordinates
/// and time in user expressions).
pub const RESERVED_NAMES: [&str; 5] = ["x", "y", "z", "t", "dt"];

/// How a parent value becomes child values when a cell is split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CoarseFine {
    /// Children inherit the parent value.
    #[default]
    Copy,
    /// Children keep whatever their slots held (zero for fresh slots).
    None,
}

/// How child values become the parent value when children are destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FineCoarse {
    /// The parent takes the arithmetic mean of its children.
    #[default]
    Average,
    /// The parent value is left untouched.
    None,
}

/// One named scalar variable.
#[derive(Clone, Debug)]
pub struct Variable {
    name: String,
    description: String,
    coarse_fine: CoarseFine,
    fine_coarse: FineCoarse,
    values: Vec<f64>,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn coarse_fine(&self) -> CoarseFine {
        self.coarse_fine
    }

    pub fn fine_coarse(&self) -> FineCoarse {
        self.fine_coarse
    }
}

/// Collection of variables indexed by cell slot.
#[derive(Clone, Debug, Default)]
pub struct FieldSet {
    variables: Vec<Variable>,
    slots: usize,
}

impl FieldSet {
    /// Create an empty set sized for `slots` cells.
    pub fn with_slots(slots: usize) -> Self {
        Self {
            variables: Vec::new(),
            slots,
        }
    }

    /// Register a new variable with explicit transfer rules.
    pub fn add(
        &mut self,
        name: &str,
        description: &str,
        coarse_fine: CoarseFine,
        fine_coarse: FineCoarse,
    ) -> Result<(), MeshAmrError> {
        if RESERVED_NAMES.contains(&name) {
            return Err(MeshAmrError::ReservedVariableName(name.to_string()));
        }
        if self.position(name).is_some() {
            return Err(MeshAmrError::DuplicateVariable(name.to_string()));
        }
        self.variables.push(Variable {
            name: name.to_string(),
            description: description.to_string(),
            coarse_fine,
            fine_coarse,
            values: vec![0.0; self.slots],
        });
        Ok(())
    }

    /// Register `name` unless it already exists. An existing variable keeps
    /// its transfer rules.
    pub fn get_or_add(
        &mut self,
        name: &str,
        description: &str,
        coarse_fine: CoarseFine,
        fine_coarse: FineCoarse,
    ) -> Result<(), MeshAmrError> {
        if self.position(name).is_some() {
            return Ok(());
        }
        self.add(name, description, coarse_fine, fine_coarse)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Value of `name` at `slot`.
    pub fn value(&self, name: &str, slot: usize) -> Result<f64, MeshAmrError> {
        let var = self.lookup(name)?;
        Ok(var.values.get(slot).copied().unwrap_or(0.0))
    }

    /// Set the value of `name` at `slot`.
    pub fn set(&mut self, name: &str, slot: usize, value: f64) -> Result<(), MeshAmrError> {
        let idx = self
            .position(name)
            .ok_or_else(|| MeshAmrError::UnknownVariable(name.to_string()))?;
        let values = &mut self.variables[idx].values;
        if slot >= values.len() {
            values.resize(slot + 1, 0.0);
        }
        values[slot] = value;
        Ok(())
    }

    /// Grow every variable so that `slots` cells fit.
    pub fn ensure_slots(&mut self, slots: usize) {
        if slots <= self.slots {
            return;
        }
        self.slots = slots;
        for var in &mut self.variables {
            var.values.resize(slots, 0.0);
        }
    }

    /// Apply the coarse→fine rule of every variable from `parent` to `children`.
    pub fn coarse_to_fine(&mut self, parent: usize, children: &[usize]) {
        for var in &mut self.variables {
            match var.coarse_fine {
                CoarseFine::Copy => {
                    let value = var.values[parent];
                    for &child in children {
                        var.values[child] = value;
                    }
                }
                CoarseFine::None => {
                    for &child in children {
                        var.values[child] = 0.0;
                    }
                }
            }
        }
    }

    /// Apply the fine→coarse rule of every variable from `children` to `parent`.
    pub fn fine_to_coarse(&mut self, parent: usize, children: &[usize]) {
        if children.is_empty() {
            return;
        }
        for var in &mut self.variables {
            if var.fine_coarse == FineCoarse::Average {
                let sum: f64 = children.iter().map(|&c| var.values[c]).sum();
                var.values[parent] = sum / children.len() as f64;
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    fn lookup(&self, name: &str) -> Result<&Variable, MeshAmrError> {
        self.variable(name)
            .ok_or_else(|| MeshAmrError::UnknownVariable(name.to_string()))
    }
}
