//! The model-building context shared by all blocks.
//!
//! A [`Model`] owns the variable arena, the named constraint families and the
//! named cost expressions. Blocks receive it by `&mut` and only ever append;
//! nothing is removed or rewritten once added, except that variable bounds may
//! be tightened by the block that created the variable.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use esm_core::{Diagnostics, NodeIndex};

use crate::config::ModelConfig;
use crate::expr::{LinearConstraint, LinearExpr, VarId};
use crate::flows::FlowKey;
use crate::time::TimeIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
}

/// Declared decision variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub kind: VarKind,
}

impl VarDef {
    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }
}

/// Index tuple a constraint is registered under within its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKey {
    Node(NodeIndex),
    NodeTime(NodeIndex, usize),
    Flow(FlowKey),
    FlowTime(FlowKey, usize),
}

/// Constraints of one kind (e.g. `bus.balance`), in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintFamily {
    entries: Vec<(ConstraintKey, LinearConstraint)>,
    index: HashMap<ConstraintKey, usize>,
}

impl ConstraintFamily {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ConstraintKey) -> Option<&LinearConstraint> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConstraintKey, &LinearConstraint)> {
        self.entries.iter().map(|(k, c)| (k, c))
    }

    fn insert(&mut self, key: ConstraintKey, constraint: LinearConstraint) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = constraint,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((key, constraint));
            }
        }
    }
}

/// Size summary of a built model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelStats {
    pub variables: usize,
    pub binaries: usize,
    pub constraints: BTreeMap<&'static str, usize>,
}

impl ModelStats {
    pub fn total_constraints(&self) -> usize {
        self.constraints.values().sum()
    }
}

impl fmt::Display for ModelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} variables ({} binary), {} constraints in {} families",
            self.variables,
            self.binaries,
            self.total_constraints(),
            self.constraints.len()
        )
    }
}

/// A time-indexed optimisation model under construction.
#[derive(Debug, Clone)]
pub struct Model {
    time: TimeIndex,
    config: ModelConfig,
    vars: Vec<VarDef>,
    families: BTreeMap<&'static str, ConstraintFamily>,
    costs: BTreeMap<&'static str, LinearExpr>,
    diagnostics: Diagnostics,

    pub(crate) flow: HashMap<FlowKey, Vec<VarId>>,
    pub(crate) storage_capacity: HashMap<NodeIndex, Vec<VarId>>,
    pub(crate) invest_flow: HashMap<FlowKey, VarId>,
    pub(crate) invest_storage: HashMap<NodeIndex, VarId>,
    pub(crate) status: HashMap<FlowKey, Vec<VarId>>,
    pub(crate) voltage_angle: HashMap<NodeIndex, Vec<VarId>>,
    pub(crate) positive_gradient: HashMap<FlowKey, Vec<VarId>>,
    pub(crate) negative_gradient: HashMap<FlowKey, Vec<VarId>>,
    pub(crate) slack_buses: Vec<NodeIndex>,
}

impl Model {
    /// Empty model over `time`. Flow variables are added by
    /// [`register_flows`](crate::flows::register_flows).
    pub fn new(time: TimeIndex, config: ModelConfig) -> Self {
        Self {
            time,
            config,
            vars: Vec::new(),
            families: BTreeMap::new(),
            costs: BTreeMap::new(),
            diagnostics: Diagnostics::new(),
            flow: HashMap::new(),
            storage_capacity: HashMap::new(),
            invest_flow: HashMap::new(),
            invest_storage: HashMap::new(),
            status: HashMap::new(),
            voltage_angle: HashMap::new(),
            positive_gradient: HashMap::new(),
            negative_gradient: HashMap::new(),
            slack_buses: Vec::new(),
        }
    }

    pub fn time(&self) -> &TimeIndex {
        &self.time
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.push_var(VarDef {
            name: name.into(),
            lower,
            upper,
            kind: VarKind::Continuous,
        })
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.push_var(VarDef {
            name: name.into(),
            lower: 0.0,
            upper: 1.0,
            kind: VarKind::Binary,
        })
    }

    fn push_var(&mut self, def: VarDef) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(def);
        id
    }

    /// Pin a variable to `value`.
    pub fn fix(&mut self, var: VarId, value: f64) {
        if let Some(def) = self.vars.get_mut(var.0) {
            def.lower = value;
            def.upper = value;
        }
    }

    pub fn var(&self, var: VarId) -> Option<&VarDef> {
        self.vars.get(var.0)
    }

    pub fn variables(&self) -> &[VarDef] {
        &self.vars
    }

    pub fn num_variables(&self) -> usize {
        self.vars.len()
    }

    // ------------------------------------------------------------------
    // Constraints and costs
    // ------------------------------------------------------------------

    /// Register `constraint` under `key` in `family`. A second constraint with
    /// the same key replaces the first.
    pub fn add_constraint(
        &mut self,
        family: &'static str,
        key: ConstraintKey,
        constraint: LinearConstraint,
    ) {
        self.families
            .entry(family)
            .or_default()
            .insert(key, constraint);
    }

    pub fn family(&self, name: &str) -> Option<&ConstraintFamily> {
        self.families.get(name)
    }

    pub fn constraint(&self, family: &str, key: ConstraintKey) -> Option<&LinearConstraint> {
        self.families.get(family).and_then(|f| f.get(&key))
    }

    pub fn families(&self) -> impl Iterator<Item = (&'static str, &ConstraintFamily)> {
        self.families.iter().map(|(name, f)| (*name, f))
    }

    /// Add `expr` to the named cost expression; contributions accumulate.
    pub fn add_cost(&mut self, name: &'static str, expr: LinearExpr) {
        *self.costs.entry(name).or_default() += expr;
    }

    pub fn cost(&self, name: &str) -> Option<&LinearExpr> {
        self.costs.get(name)
    }

    pub fn costs(&self) -> impl Iterator<Item = (&'static str, &LinearExpr)> {
        self.costs.iter().map(|(name, e)| (*name, e))
    }

    /// Sum of all named cost expressions.
    pub fn objective(&self) -> LinearExpr {
        let mut objective = LinearExpr::new();
        for expr in self.costs.values() {
            objective.add_scaled(expr, 1.0);
        }
        objective.normalized()
    }

    // ------------------------------------------------------------------
    // Variable lookup
    // ------------------------------------------------------------------

    pub fn flow_var(&self, key: FlowKey, t: usize) -> Option<VarId> {
        self.flow.get(&key).and_then(|v| v.get(t).copied())
    }

    pub fn storage_capacity_var(&self, node: NodeIndex, t: usize) -> Option<VarId> {
        self.storage_capacity
            .get(&node)
            .and_then(|v| v.get(t).copied())
    }

    pub fn invest_flow_var(&self, key: FlowKey) -> Option<VarId> {
        self.invest_flow.get(&key).copied()
    }

    pub fn invest_storage_var(&self, node: NodeIndex) -> Option<VarId> {
        self.invest_storage.get(&node).copied()
    }

    pub fn status_var(&self, key: FlowKey, t: usize) -> Option<VarId> {
        self.status.get(&key).and_then(|v| v.get(t).copied())
    }

    pub fn voltage_angle_var(&self, bus: NodeIndex, t: usize) -> Option<VarId> {
        self.voltage_angle.get(&bus).and_then(|v| v.get(t).copied())
    }

    pub fn positive_gradient_var(&self, key: FlowKey, t: usize) -> Option<VarId> {
        self.positive_gradient
            .get(&key)
            .and_then(|v| v.get(t).copied())
    }

    pub fn negative_gradient_var(&self, key: FlowKey, t: usize) -> Option<VarId> {
        self.negative_gradient
            .get(&key)
            .and_then(|v| v.get(t).copied())
    }

    /// Slack bus of every electrical island, in island order.
    pub fn slack_buses(&self) -> &[NodeIndex] {
        &self.slack_buses
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            variables: self.vars.len(),
            binaries: self
                .vars
                .iter()
                .filter(|v| v.kind == VarKind::Binary)
                .count(),
            constraints: self
                .families
                .iter()
                .map(|(name, f)| (*name, f.len()))
                .collect(),
        }
    }

    /// Constraints and bounds violated by `values` beyond `tol`, as
    /// `(family, key, residual)`; bound violations use family `"bounds"` and
    /// have no key.
    pub fn violations(
        &self,
        values: &[f64],
        tol: f64,
    ) -> Vec<(&'static str, Option<ConstraintKey>, f64)> {
        let mut out = Vec::new();
        for (i, def) in self.vars.iter().enumerate() {
            let v = values.get(i).copied().unwrap_or(f64::NAN);
            if v.is_nan() || v < def.lower - tol || v > def.upper + tol {
                out.push(("bounds", None, v));
            }
        }
        for (name, family) in &self.families {
            for (key, c) in family.iter() {
                if !c.is_satisfied(values, tol) {
                    out.push((*name, Some(*key), c.residual(values)));
                }
            }
        }
        out
    }
}
