//! # esm-core: Energy System Topology
//!
//! Data structures describing an energy system as a directed graph, consumed
//! by the model builder in `esm-model`.
//!
//! ## Design Philosophy
//!
//! An energy system is a **directed graph** where:
//! - **Nodes**: buses, sources, sinks, transformers, storages, electrical buses
//!   and electrical lines
//! - **Edges**: [`Flow`]s, each carrying its own attribute bundle
//!
//! An edge is identified by its ordered `(source, target)` pair, so at most one
//! flow may exist between two nodes in a given direction. Attributes that may
//! vary over time are [`Sequence`]s.
//!
//! Construction-time checks live in [`EnergySystem::add_node`] and
//! [`EnergySystem::connect`]: anything that is wrong regardless of the time
//! horizon (duplicate labels, a second input on an electrical line, a flow that
//! is both sized by investment and given a nominal value) is rejected there.
//!
//! ## Quick Start
//!
//! ```rust
//! use esm_core::*;
//!
//! let mut es = EnergySystem::new();
//! let bus = es.add_node(Bus::new("b_el")).unwrap();
//! let pp = es.add_node(Source::new("pp_gas")).unwrap();
//! let demand = es.add_node(Sink::new("demand")).unwrap();
//!
//! es.connect(pp, bus, Flow::new().with_nominal_value(10.0).with_variable_costs(50.0))
//!     .unwrap();
//! es.connect(bus, demand, Flow::new().with_nominal_value(8.0).fixed_to(vec![0.5, 1.0]))
//!     .unwrap();
//!
//! assert_eq!(es.inputs(bus), vec![pp]);
//! assert_eq!(es.stats().flows, 2);
//! ```
//!
//! ## Modules
//!
//! - [`flow`] - Flow attribute bundles, investment and discrete specs
//! - [`sequence`] - Scalar-or-series attribute values
//! - [`diagnostics`] - Non-fatal issues recorded during a model build
//! - [`graph_utils`] - Electrical island analysis

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use petgraph::prelude::*;
use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;
pub mod flow;
pub mod graph_utils;
pub mod sequence;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{EsmError, EsmResult};
pub use flow::{Discrete, Flow, Gradient, Investment};
pub use graph_utils::electrical_islands;
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use sequence::Sequence;

/// Balance node: inflow equals outflow at every timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub label: String,
}

impl Bus {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Node with outputs only; its output flows carry the supply limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub label: String,
}

impl Source {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Node with inputs only; typically a demand with a fixed profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sink {
    pub label: String,
}

impl Sink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Linear converter with a single input and any number of outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    pub label: String,
    /// Output efficiency per output node label
    pub conversion_factors: BTreeMap<String, Sequence>,
}

impl Transformer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            conversion_factors: BTreeMap::new(),
        }
    }

    /// Set the conversion factor towards the output node labelled `output`.
    pub fn with_conversion_factor(
        mut self,
        output: impl Into<String>,
        factor: impl Into<Sequence>,
    ) -> Self {
        self.conversion_factors.insert(output.into(), factor.into());
        self
    }

    /// Conversion factor towards `output`; outputs without a declared factor use 1.
    pub fn conversion_factor(&self, output: &str) -> Sequence {
        self.conversion_factors
            .get(output)
            .cloned()
            .unwrap_or(Sequence::Scalar(1.0))
    }
}

/// Storage with one input and one output flow.
///
/// Capacity fractions, losses and efficiencies are per timestep. The storage is
/// either sized by `nominal_capacity` or by an [`Investment`], never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub label: String,
    pub nominal_capacity: Option<f64>,
    /// Lower state-of-charge bound as fraction of capacity
    pub capacity_min: Sequence,
    /// Upper state-of-charge bound as fraction of capacity
    pub capacity_max: Sequence,
    /// Fraction of stored energy lost per timestep
    pub capacity_loss: Sequence,
    /// Charging efficiency
    pub inflow_conversion_factor: Sequence,
    /// Discharging efficiency
    pub outflow_conversion_factor: Sequence,
    /// State of charge at the end of the horizon, as fraction of capacity
    pub initial_capacity: Option<f64>,
    /// Invested input capacity per unit of invested storage capacity
    pub nominal_input_capacity_ratio: f64,
    /// Invested output capacity per unit of invested storage capacity
    pub nominal_output_capacity_ratio: f64,
    pub fixed_costs: Option<f64>,
    pub investment: Option<Investment>,
}

impl Storage {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nominal_capacity: None,
            capacity_min: Sequence::Scalar(0.0),
            capacity_max: Sequence::Scalar(1.0),
            capacity_loss: Sequence::Scalar(0.0),
            inflow_conversion_factor: Sequence::Scalar(1.0),
            outflow_conversion_factor: Sequence::Scalar(1.0),
            initial_capacity: None,
            nominal_input_capacity_ratio: 0.2,
            nominal_output_capacity_ratio: 0.2,
            fixed_costs: None,
            investment: None,
        }
    }

    pub fn with_nominal_capacity(mut self, capacity: f64) -> Self {
        self.nominal_capacity = Some(capacity);
        self
    }

    pub fn with_capacity_limits(
        mut self,
        min: impl Into<Sequence>,
        max: impl Into<Sequence>,
    ) -> Self {
        self.capacity_min = min.into();
        self.capacity_max = max.into();
        self
    }

    pub fn with_capacity_loss(mut self, loss: impl Into<Sequence>) -> Self {
        self.capacity_loss = loss.into();
        self
    }

    pub fn with_efficiencies(
        mut self,
        inflow: impl Into<Sequence>,
        outflow: impl Into<Sequence>,
    ) -> Self {
        self.inflow_conversion_factor = inflow.into();
        self.outflow_conversion_factor = outflow.into();
        self
    }

    pub fn with_initial_capacity(mut self, fraction: f64) -> Self {
        self.initial_capacity = Some(fraction);
        self
    }

    pub fn with_capacity_ratios(mut self, input: f64, output: f64) -> Self {
        self.nominal_input_capacity_ratio = input;
        self.nominal_output_capacity_ratio = output;
        self
    }

    pub fn with_fixed_costs(mut self, fixed_costs: f64) -> Self {
        self.fixed_costs = Some(fixed_costs);
        self
    }

    pub fn with_investment(mut self, investment: Investment) -> Self {
        self.investment = Some(investment);
        self
    }

    pub fn is_invested(&self) -> bool {
        self.investment.is_some()
    }

    /// Per-timestep attributes with their names, for horizon checks.
    pub fn sequences(&self) -> [(&'static str, &Sequence); 5] {
        [
            ("capacity_min", &self.capacity_min),
            ("capacity_max", &self.capacity_max),
            ("capacity_loss", &self.capacity_loss),
            ("inflow_conversion_factor", &self.inflow_conversion_factor),
            ("outflow_conversion_factor", &self.outflow_conversion_factor),
        ]
    }
}

/// Bus taking part in the linear power flow; carries a voltage angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricalBus {
    pub label: String,
    /// Reference bus of its electrical island
    pub slack: bool,
    pub v_min: f64,
    pub v_max: f64,
}

impl ElectricalBus {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slack: false,
            v_min: -1000.0,
            v_max: 1000.0,
        }
    }

    pub fn slack(mut self) -> Self {
        self.slack = true;
        self
    }

    pub fn with_angle_limits(mut self, v_min: f64, v_max: f64) -> Self {
        self.v_min = v_min;
        self.v_max = v_max;
        self
    }
}

/// Line between two electrical buses; flow follows the angle difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricalLine {
    pub label: String,
    pub reactance: Sequence,
}

impl ElectricalLine {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reactance: Sequence::Scalar(0.00001),
        }
    }

    pub fn with_reactance(mut self, reactance: impl Into<Sequence>) -> Self {
        self.reactance = reactance.into();
        self
    }
}

/// Node in an energy system graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Bus(Bus),
    Source(Source),
    Sink(Sink),
    Transformer(Transformer),
    Storage(Storage),
    ElectricalBus(ElectricalBus),
    ElectricalLine(ElectricalLine),
}

impl Node {
    pub fn label(&self) -> &str {
        match self {
            Node::Bus(n) => &n.label,
            Node::Source(n) => &n.label,
            Node::Sink(n) => &n.label,
            Node::Transformer(n) => &n.label,
            Node::Storage(n) => &n.label,
            Node::ElectricalBus(n) => &n.label,
            Node::ElectricalLine(n) => &n.label,
        }
    }

    /// Short kind name used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Bus(_) => "bus",
            Node::Source(_) => "source",
            Node::Sink(_) => "sink",
            Node::Transformer(_) => "transformer",
            Node::Storage(_) => "storage",
            Node::ElectricalBus(_) => "electrical bus",
            Node::ElectricalLine(_) => "electrical line",
        }
    }
}

macro_rules! impl_from_node {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Node {
                fn from(node: $variant) -> Self {
                    Node::$variant(node)
                }
            }
        )*
    };
}

impl_from_node!(
    Bus,
    Source,
    Sink,
    Transformer,
    Storage,
    ElectricalBus,
    ElectricalLine
);

/// Node and flow counts of an [`EnergySystem`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemStats {
    pub buses: usize,
    pub sources: usize,
    pub sinks: usize,
    pub transformers: usize,
    pub storages: usize,
    pub electrical_buses: usize,
    pub electrical_lines: usize,
    pub flows: usize,
    pub invested_flows: usize,
    pub discrete_flows: usize,
}

impl fmt::Display for SystemStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buses, {} sources, {} sinks, {} transformers, {} storages, \
             {} electrical buses, {} lines, {} flows ({} invested, {} discrete)",
            self.buses,
            self.sources,
            self.sinks,
            self.transformers,
            self.storages,
            self.electrical_buses,
            self.electrical_lines,
            self.flows,
            self.invested_flows,
            self.discrete_flows
        )
    }
}

/// An energy system: labelled nodes connected by directed flows.
#[derive(Debug, Clone, Default)]
pub struct EnergySystem {
    graph: DiGraph<Node, Flow>,
    labels: HashMap<String, NodeIndex>,
}

impl EnergySystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Labels must be unique within the system.
    pub fn add_node(&mut self, node: impl Into<Node>) -> EsmResult<NodeIndex> {
        let node = node.into();
        if self.labels.contains_key(node.label()) {
            return Err(EsmError::config(format!(
                "duplicate node label '{}'",
                node.label()
            )));
        }
        if let Node::Storage(storage) = &node {
            if storage.investment.is_some() && storage.nominal_capacity.is_some() {
                return Err(EsmError::config(format!(
                    "storage '{}' has both nominal_capacity and investment",
                    storage.label
                )));
            }
        }
        let label = node.label().to_string();
        let idx = self.graph.add_node(node);
        self.labels.insert(label, idx);
        Ok(idx)
    }

    /// Connect `source -> target` with the given flow attributes.
    pub fn connect(
        &mut self,
        source: NodeIndex,
        target: NodeIndex,
        flow: Flow,
    ) -> EsmResult<EdgeIndex> {
        let (Some(src), Some(dst)) = (self.graph.node_weight(source), self.graph.node_weight(target))
        else {
            return Err(EsmError::Topology(format!(
                "cannot connect unknown node(s) {:?} -> {:?}",
                source, target
            )));
        };
        let name = format!("{} -> {}", src.label(), dst.label());

        if source == target {
            return Err(EsmError::config(format!("self-loop flow {}", name)));
        }
        if self.graph.find_edge(source, target).is_some() {
            return Err(EsmError::config(format!("duplicate flow {}", name)));
        }
        if matches!(src, Node::Sink(_)) {
            return Err(EsmError::config(format!(
                "sink '{}' cannot have outputs",
                src.label()
            )));
        }
        if matches!(dst, Node::Source(_)) {
            return Err(EsmError::config(format!(
                "source '{}' cannot have inputs",
                dst.label()
            )));
        }
        if let Node::ElectricalLine(line) = src {
            if self.graph.edges_directed(source, Outgoing).next().is_some() {
                return Err(EsmError::config(format!(
                    "electrical line '{}' must have exactly one output",
                    line.label
                )));
            }
        }
        if let Node::ElectricalLine(line) = dst {
            if self.graph.edges_directed(target, Incoming).next().is_some() {
                return Err(EsmError::config(format!(
                    "electrical line '{}' must have exactly one input",
                    line.label
                )));
            }
        }
        if flow.investment.is_some() && flow.nominal_value.is_some() {
            return Err(EsmError::config(format!(
                "flow {} has both nominal_value and investment",
                name
            )));
        }
        if flow.investment.is_some() && flow.discrete.is_some() {
            return Err(EsmError::config(format!(
                "flow {} cannot be both invested and discrete",
                name
            )));
        }

        Ok(self.graph.add_edge(source, target, flow))
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(idx)
    }

    pub fn index_of(&self, label: &str) -> Option<NodeIndex> {
        self.labels.get(label).copied()
    }

    /// Label of `idx`, or `"?"` for an index outside this system.
    pub fn label(&self, idx: NodeIndex) -> &str {
        self.graph.node_weight(idx).map_or("?", Node::label)
    }

    pub fn flow(&self, source: NodeIndex, target: NodeIndex) -> Option<&Flow> {
        self.graph
            .find_edge(source, target)
            .and_then(|e| self.graph.edge_weight(e))
    }

    /// Source nodes of the flows entering `node`, in declaration order.
    pub fn inputs(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.neighbours(node, Incoming)
    }

    /// Target nodes of the flows leaving `node`, in declaration order.
    pub fn outputs(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.neighbours(node, Outgoing)
    }

    fn neighbours(&self, node: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, direction)
            .map(|e| {
                let other = match direction {
                    Outgoing => e.target(),
                    Incoming => e.source(),
                };
                (e.id(), other)
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, other)| other).collect()
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx).map(|n| (idx, n)))
    }

    /// All flows in declaration order as `(source, target, flow)`.
    pub fn flows(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &Flow)> {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    pub fn graph(&self) -> &DiGraph<Node, Flow> {
        &self.graph
    }

    pub fn stats(&self) -> SystemStats {
        let mut stats = SystemStats::default();
        for node in self.graph.raw_nodes().iter().map(|n| &n.weight) {
            match node {
                Node::Bus(_) => stats.buses += 1,
                Node::Source(_) => stats.sources += 1,
                Node::Sink(_) => stats.sinks += 1,
                Node::Transformer(_) => stats.transformers += 1,
                Node::Storage(_) => stats.storages += 1,
                Node::ElectricalBus(_) => stats.electrical_buses += 1,
                Node::ElectricalLine(_) => stats.electrical_lines += 1,
            }
        }
        for flow in self.graph.raw_edges().iter().map(|e| &e.weight) {
            stats.flows += 1;
            if flow.is_invested() {
                stats.invested_flows += 1;
            }
            if flow.is_discrete() {
                stats.discrete_flows += 1;
            }
        }
        stats
    }
}
