//! Classification of topology elements into block groups.
//!
//! One pass over the energy system decides which block handles which node or
//! flow, and checks the structural preconditions every block relies on (port
//! counts, sequence lengths, sizing). Blocks then receive plain lists and never
//! inspect node types themselves.

use std::fmt;

use esm_core::{EnergySystem, Node, NodeIndex, Sequence};

use crate::error::{ModelError, ModelResult};
use crate::flows::FlowKey;
use crate::time::TimeIndex;

/// Closed set of formulation blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Bus,
    Transformer,
    Flow,
    InvestmentFlow,
    Storage,
    InvestmentStorage,
    Discrete,
    ElectricalLine,
}

impl ComponentKind {
    /// Order in which blocks are built. Investment flows precede investment
    /// storages, whose coupling constraints use the flows' sizing variables.
    pub const BUILD_ORDER: [ComponentKind; 8] = [
        ComponentKind::Bus,
        ComponentKind::Transformer,
        ComponentKind::Flow,
        ComponentKind::InvestmentFlow,
        ComponentKind::Storage,
        ComponentKind::InvestmentStorage,
        ComponentKind::Discrete,
        ComponentKind::ElectricalLine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Bus => "bus",
            ComponentKind::Transformer => "transformer",
            ComponentKind::Flow => "flow",
            ComponentKind::InvestmentFlow => "investment_flow",
            ComponentKind::Storage => "storage",
            ComponentKind::InvestmentStorage => "investment_storage",
            ComponentKind::Discrete => "discrete",
            ComponentKind::ElectricalLine => "electrical_line",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A storage and its single input and output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEntry {
    pub node: NodeIndex,
    pub input: NodeIndex,
    pub output: NodeIndex,
}

impl StorageEntry {
    pub fn inflow(&self) -> FlowKey {
        FlowKey::new(self.input, self.node)
    }

    pub fn outflow(&self) -> FlowKey {
        FlowKey::new(self.node, self.output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerEntry {
    pub node: NodeIndex,
    pub input: NodeIndex,
    pub outputs: Vec<NodeIndex>,
}

/// An electrical line between its input and output bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub node: NodeIndex,
    pub input: NodeIndex,
    pub output: NodeIndex,
}

/// Per-kind element lists, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Groups {
    pub buses: Vec<NodeIndex>,
    pub transformers: Vec<TransformerEntry>,
    /// Every flow; the flow block decides per attribute what applies
    pub flows: Vec<FlowKey>,
    pub investment_flows: Vec<FlowKey>,
    pub storages: Vec<StorageEntry>,
    pub investment_storages: Vec<StorageEntry>,
    pub discrete: Vec<FlowKey>,
    pub lines: Vec<LineEntry>,
}

impl Groups {
    pub fn len(&self, kind: ComponentKind) -> usize {
        match kind {
            ComponentKind::Bus => self.buses.len(),
            ComponentKind::Transformer => self.transformers.len(),
            ComponentKind::Flow => self.flows.len(),
            ComponentKind::InvestmentFlow => self.investment_flows.len(),
            ComponentKind::Storage => self.storages.len(),
            ComponentKind::InvestmentStorage => self.investment_storages.len(),
            ComponentKind::Discrete => self.discrete.len(),
            ComponentKind::ElectricalLine => self.lines.len(),
        }
    }
}

fn check_covers(seq: &Sequence, horizon: usize, owner: &str, attribute: &str) -> ModelResult<()> {
    if seq.covers(horizon) {
        Ok(())
    } else {
        Err(ModelError::config(format!(
            "{}: {} has fewer values than the {} timesteps",
            owner, attribute, horizon
        )))
    }
}

fn single_port(
    system: &EnergySystem,
    node: NodeIndex,
    ports: Vec<NodeIndex>,
    what: &str,
) -> ModelResult<NodeIndex> {
    match ports.as_slice() {
        [single] => Ok(*single),
        _ => Err(ModelError::config(format!(
            "{} '{}' needs exactly one {}, found {}",
            system.node(node).map_or("node", Node::kind),
            system.label(node),
            what,
            ports.len()
        ))),
    }
}

/// Sort every node and flow of `system` into its block group.
pub fn classify(system: &EnergySystem, time: &TimeIndex) -> ModelResult<Groups> {
    let horizon = time.len();
    let mut groups = Groups::default();

    for (idx, node) in system.nodes() {
        match node {
            Node::Bus(_) | Node::ElectricalBus(_) => groups.buses.push(idx),
            Node::Source(_) | Node::Sink(_) => {}
            Node::Transformer(tr) => {
                let input = single_port(system, idx, system.inputs(idx), "input")?;
                let outputs = system.outputs(idx);
                for (output, factor) in &tr.conversion_factors {
                    let known = outputs.iter().any(|&o| system.label(o) == output);
                    if !known {
                        return Err(ModelError::config(format!(
                            "transformer '{}' has a conversion factor for '{}', which is not one of its outputs",
                            tr.label, output
                        )));
                    }
                    check_covers(factor, horizon, &tr.label, "conversion_factor")?;
                }
                groups.transformers.push(TransformerEntry {
                    node: idx,
                    input,
                    outputs,
                });
            }
            Node::Storage(storage) => {
                let entry = StorageEntry {
                    node: idx,
                    input: single_port(system, idx, system.inputs(idx), "input")?,
                    output: single_port(system, idx, system.outputs(idx), "output")?,
                };
                for (attribute, seq) in storage.sequences() {
                    check_covers(seq, horizon, &storage.label, attribute)?;
                }
                if !storage.outflow_conversion_factor.all(horizon, |v| v != 0.0) {
                    return Err(ModelError::config(format!(
                        "storage '{}' has a zero outflow_conversion_factor",
                        storage.label
                    )));
                }
                if storage.is_invested() {
                    groups.investment_storages.push(entry);
                } else if storage.nominal_capacity.is_some() {
                    groups.storages.push(entry);
                } else {
                    return Err(ModelError::config(format!(
                        "storage '{}' needs a nominal_capacity or an investment",
                        storage.label
                    )));
                }
            }
            Node::ElectricalLine(line) => {
                let entry = LineEntry {
                    node: idx,
                    input: single_port(system, idx, system.inputs(idx), "input")?,
                    output: single_port(system, idx, system.outputs(idx), "output")?,
                };
                for bus in [entry.input, entry.output] {
                    if !matches!(system.node(bus), Some(Node::ElectricalBus(_))) {
                        return Err(ModelError::config(format!(
                            "electrical line '{}' is connected to '{}', which is not an electrical bus",
                            line.label,
                            system.label(bus)
                        )));
                    }
                }
                check_covers(&line.reactance, horizon, &line.label, "reactance")?;
                if !line.reactance.all(horizon, |x| x != 0.0) {
                    return Err(ModelError::config(format!(
                        "electrical line '{}' has zero reactance",
                        line.label
                    )));
                }
                groups.lines.push(entry);
            }
        }
    }

    for (source, target, flow) in system.flows() {
        let key = FlowKey::new(source, target);
        let owner = format!("flow {}", key.describe(system));
        for (attribute, seq) in flow.sequences() {
            check_covers(seq, horizon, &owner, attribute)?;
        }
        if flow.fixed && flow.actual_value.is_none() {
            return Err(ModelError::config(format!(
                "{} is fixed but has no actual_value",
                owner
            )));
        }

        groups.flows.push(key);
        if flow.is_invested() {
            groups.investment_flows.push(key);
        }
        if flow.is_discrete() {
            groups.discrete.push(key);
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use esm_core::{Bus, Flow, Investment, Sink, Source, Storage, Transformer};

    fn time(n: usize) -> TimeIndex {
        TimeIndex::uniform(n, 1.0).unwrap()
    }

    #[test]
    fn test_groups_by_kind() {
        let mut es = EnergySystem::new();
        let gas = es.add_node(Bus::new("gas")).unwrap();
        let el = es.add_node(Bus::new("el")).unwrap();
        let src = es.add_node(Source::new("gas_src")).unwrap();
        let pp = es
            .add_node(Transformer::new("pp").with_conversion_factor("el", 0.5))
            .unwrap();
        let battery = es
            .add_node(Storage::new("battery").with_investment(Investment::new(10.0)))
            .unwrap();
        let demand = es.add_node(Sink::new("demand")).unwrap();
        es.connect(src, gas, Flow::new()).unwrap();
        es.connect(gas, pp, Flow::new()).unwrap();
        es.connect(pp, el, Flow::new()).unwrap();
        es.connect(el, battery, Flow::new().with_investment(Investment::new(0.0)))
            .unwrap();
        es.connect(battery, el, Flow::new().with_investment(Investment::new(0.0)))
            .unwrap();
        es.connect(el, demand, Flow::new()).unwrap();

        let groups = classify(&es, &time(3)).unwrap();
        assert_eq!(groups.buses, vec![gas, el]);
        assert_eq!(
            groups.transformers,
            vec![TransformerEntry {
                node: pp,
                input: gas,
                outputs: vec![el]
            }]
        );
        assert_eq!(groups.flows.len(), 6);
        assert_eq!(groups.investment_flows.len(), 2);
        assert!(groups.storages.is_empty());
        assert_eq!(groups.investment_storages[0].inflow(), FlowKey::new(el, battery));
        assert_eq!(groups.len(ComponentKind::InvestmentStorage), 1);
    }

    #[test]
    fn test_transformer_with_two_inputs_is_rejected() {
        let mut es = EnergySystem::new();
        let a = es.add_node(Bus::new("a")).unwrap();
        let b = es.add_node(Bus::new("b")).unwrap();
        let tr = es.add_node(Transformer::new("tr")).unwrap();
        es.connect(a, tr, Flow::new()).unwrap();
        es.connect(b, tr, Flow::new()).unwrap();
        es.connect(tr, a, Flow::new()).unwrap();

        let err = classify(&es, &time(1)).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("exactly one input, found 2"));
    }

    #[test]
    fn test_short_series_is_rejected() {
        let mut es = EnergySystem::new();
        let bus = es.add_node(Bus::new("b")).unwrap();
        let src = es.add_node(Source::new("src")).unwrap();
        es.connect(
            src,
            bus,
            Flow::new().with_nominal_value(1.0).with_max(vec![1.0, 1.0]),
        )
        .unwrap();

        assert!(classify(&es, &time(2)).is_ok());
        let err = classify(&es, &time(3)).unwrap_err();
        assert!(err.to_string().contains("max"));
    }

    #[test]
    fn test_storage_needs_a_size() {
        let mut es = EnergySystem::new();
        let bus = es.add_node(Bus::new("b")).unwrap();
        let s = es.add_node(Storage::new("s")).unwrap();
        es.connect(bus, s, Flow::new()).unwrap();
        es.connect(s, bus, Flow::new()).unwrap();
        assert!(classify(&es, &time(1)).unwrap_err().is_configuration());
    }

    #[test]
    fn test_unknown_conversion_target_is_rejected() {
        let mut es = EnergySystem::new();
        let a = es.add_node(Bus::new("a")).unwrap();
        let b = es.add_node(Bus::new("b")).unwrap();
        let tr = es
            .add_node(Transformer::new("tr").with_conversion_factor("c", 0.3))
            .unwrap();
        es.connect(a, tr, Flow::new()).unwrap();
        es.connect(tr, b, Flow::new()).unwrap();
        assert!(classify(&es, &time(1)).is_err());
    }

    #[test]
    fn test_build_order_places_investment_flow_before_storage() {
        let pos = |k| {
            ComponentKind::BUILD_ORDER
                .iter()
                .position(|&x| x == k)
                .unwrap()
        };
        assert!(pos(ComponentKind::InvestmentFlow) < pos(ComponentKind::InvestmentStorage));
        assert!(pos(ComponentKind::Bus) < pos(ComponentKind::ElectricalLine));
    }
}
