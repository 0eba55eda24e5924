//! Bus balance: `sum(inflow * dt) == sum(outflow * dt)` per bus and timestep.

use esm_core::{EnergySystem, NodeIndex};
use tracing::{debug, warn};

use crate::error::ModelResult;
use crate::expr::{LinearConstraint, LinearExpr};
use crate::flows::{require_flow, FlowKey};
use crate::model::{ConstraintKey, Model};

pub const BALANCE: &str = "bus.balance";

pub fn build(model: &mut Model, system: &EnergySystem, group: &[NodeIndex]) -> ModelResult<()> {
    let mut emitted = 0;

    for &bus in group {
        let inputs = system.inputs(bus);
        let outputs = system.outputs(bus);

        // 0 == 0 carries no coupling
        if inputs.is_empty() && outputs.is_empty() {
            let label = system.label(bus);
            warn!(bus = label, "bus has no flows, balance skipped");
            model.diagnostics_mut().add_warning_with_entity(
                "bus",
                "no connected flows, balance constraint skipped",
                label,
            );
            continue;
        }

        for t in model.time().positions() {
            let dt = model.time().increment(t);
            let mut lhs = LinearExpr::new();
            for &i in &inputs {
                lhs += require_flow(model, system, FlowKey::new(i, bus), t)? * dt;
            }
            let mut rhs = LinearExpr::new();
            for &o in &outputs {
                rhs += require_flow(model, system, FlowKey::new(bus, o), t)? * dt;
            }
            model.add_constraint(
                BALANCE,
                ConstraintKey::NodeTime(bus, t),
                LinearConstraint::eq(lhs, rhs),
            );
            emitted += 1;
        }
    }

    debug!(buses = group.len(), constraints = emitted, "bus block built");
    Ok(())
}
