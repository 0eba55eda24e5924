//! Linear (DC) power flow over electrical lines.
//!
//! Once the system has a line, every electrical bus gets a voltage angle per
//! timestep, bounded by its `[v_min, v_max]`. For a line `i -> n -> o`:
//!
//! ```text
//! flow[n, o, t] == (angle[i, t] - angle[o, t]) / reactance[t]
//! flow[i, n, t] == flow[n, o, t]
//! ```
//!
//! Each electrical island has exactly one slack bus whose angle is held at
//! zero. A line whose output bus is the slack has its output flow pinned to
//! zero instead of following the angle difference. When no bus of an island
//! is marked slack, the first declared bus of the island takes the role. A bus
//! without lines is an island of its own.

use esm_core::{electrical_islands, ElectricalBus, ElectricalLine, EnergySystem, Node, NodeIndex};
use tracing::{debug, info};

use crate::error::{ModelError, ModelResult};
use crate::expr::{LinearConstraint, LinearExpr, VarId};
use crate::flows::{require_flow, FlowKey};
use crate::grouping::LineEntry;
use crate::model::{ConstraintKey, Model};

pub const FLOW: &str = "electrical.flow";
pub const EQUATE_FLOWS: &str = "electrical.equate_flows";
pub const SLACK_ANGLE: &str = "electrical.slack_angle";

fn bus_of(system: &EnergySystem, idx: NodeIndex) -> ModelResult<&ElectricalBus> {
    match system.node(idx) {
        Some(Node::ElectricalBus(bus)) => Ok(bus),
        _ => Err(ModelError::config(format!(
            "'{}' is not an electrical bus",
            system.label(idx)
        ))),
    }
}

fn line_of(system: &EnergySystem, idx: NodeIndex) -> ModelResult<&ElectricalLine> {
    match system.node(idx) {
        Some(Node::ElectricalLine(line)) => Ok(line),
        _ => Err(ModelError::config(format!(
            "'{}' is not an electrical line",
            system.label(idx)
        ))),
    }
}

/// Slack bus of each island, choosing the first bus where none is marked.
fn select_slacks(
    system: &EnergySystem,
    islands: &[Vec<NodeIndex>],
) -> ModelResult<Vec<(NodeIndex, bool)>> {
    let mut slacks = Vec::with_capacity(islands.len());
    for island in islands {
        let mut marked = Vec::new();
        for &idx in island {
            if bus_of(system, idx)?.slack {
                marked.push(idx);
            }
        }
        match marked.as_slice() {
            [] => {
                let Some(&first) = island.first() else {
                    continue;
                };
                slacks.push((first, true));
            }
            [single] => slacks.push((*single, false)),
            _ => {
                let labels: Vec<&str> = marked.iter().map(|&i| system.label(i)).collect();
                return Err(ModelError::config(format!(
                    "electrical island has more than one slack bus: {}",
                    labels.join(", ")
                )));
            }
        }
    }
    Ok(slacks)
}

pub fn build(model: &mut Model, system: &EnergySystem, group: &[LineEntry]) -> ModelResult<()> {
    if group.is_empty() {
        return Ok(());
    }

    let islands = electrical_islands(system);
    let slacks = select_slacks(system, &islands)?;
    for entry in group {
        line_of(system, entry.node)?;
        bus_of(system, entry.input)?;
        bus_of(system, entry.output)?;
    }

    for &(slack, chosen) in &slacks {
        let label = system.label(slack);
        if chosen {
            info!(bus = label, "no slack bus marked in island, using first bus");
            model.diagnostics_mut().add_info_with_entity(
                "electrical",
                "no slack bus marked in island; first bus used as reference",
                label,
            );
        }
        model.slack_buses.push(slack);
    }

    for island in &islands {
        for &idx in island {
            let bus = bus_of(system, idx)?;
            let mut angles = Vec::with_capacity(model.time().len());
            for t in model.time().positions() {
                angles.push(model.add_variable(
                    format!("voltage_angle[{},{}]", bus.label, t),
                    bus.v_min,
                    bus.v_max,
                ));
            }
            model.voltage_angle.insert(idx, angles);
        }
    }

    for &(slack, _) in &slacks {
        for t in model.time().positions() {
            let angle = angle_of(model, system, slack, t)?;
            model.add_constraint(
                SLACK_ANGLE,
                ConstraintKey::NodeTime(slack, t),
                LinearConstraint::eq(angle, 0.0),
            );
        }
    }

    for entry in group {
        let line = line_of(system, entry.node)?;
        let inflow = FlowKey::new(entry.input, entry.node);
        let outflow = FlowKey::new(entry.node, entry.output);
        let into_slack = slacks.iter().any(|&(s, _)| s == entry.output);

        for t in model.time().positions() {
            let flow_in = require_flow(model, system, inflow, t)?;
            let flow_out = require_flow(model, system, outflow, t)?;

            let rhs = if into_slack {
                LinearExpr::new()
            } else {
                let susceptance = 1.0 / line.reactance.at(t);
                let from = angle_of(model, system, entry.input, t)?;
                let to = angle_of(model, system, entry.output, t)?;
                (from - to) * susceptance
            };
            model.add_constraint(
                FLOW,
                ConstraintKey::NodeTime(entry.node, t),
                LinearConstraint::eq(flow_out, rhs),
            );
            model.add_constraint(
                EQUATE_FLOWS,
                ConstraintKey::NodeTime(entry.node, t),
                LinearConstraint::eq(flow_in, flow_out),
            );
        }
    }

    debug!(
        lines = group.len(),
        islands = islands.len(),
        "electrical line block built"
    );
    Ok(())
}

fn angle_of(model: &Model, system: &EnergySystem, bus: NodeIndex, t: usize) -> ModelResult<VarId> {
    model.voltage_angle_var(bus, t).ok_or_else(|| {
        ModelError::config(format!(
            "electrical bus '{}' has no voltage angle at timestep {}",
            system.label(bus),
            t
        ))
    })
}
