//! Flow variable registry.
//!
//! One non-negative variable per edge and timestep. Every block that talks
//! about a flow looks it up here by `(source, target, t)`, so a flow shared by
//! a storage and a bus is the same variable in both constraints.

use esm_core::{EnergySystem, NodeIndex};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::expr::VarId;
use crate::model::Model;

/// Identity of a flow: its ordered `(source, target)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub source: NodeIndex,
    pub target: NodeIndex,
}

impl FlowKey {
    pub fn new(source: NodeIndex, target: NodeIndex) -> Self {
        Self { source, target }
    }

    /// `"source -> target"` using the node labels of `system`.
    pub fn describe(&self, system: &EnergySystem) -> String {
        format!(
            "{} -> {}",
            system.label(self.source),
            system.label(self.target)
        )
    }
}

/// Create the flow variables of every edge in `system`.
///
/// Bounds follow the flow's own attributes: with a `nominal_value` the flow is
/// limited to `[min[t], max[t]] * nominal_value` (lower bound left at zero for
/// discrete flows), and a fixed flow is pinned to `actual_value[t] *
/// nominal_value`. Invested flows and flows without nominal value are only
/// non-negative here.
pub fn register_flows(model: &mut Model, system: &EnergySystem) -> ModelResult<()> {
    let horizon = model.time().len();

    for (source, target, flow) in system.flows() {
        let key = FlowKey::new(source, target);
        let name = key.describe(system);
        let mut vars: Vec<VarId> = Vec::with_capacity(horizon);

        for t in 0..horizon {
            let (lower, upper) = match (flow.is_invested(), flow.nominal_value) {
                (false, Some(nominal)) if flow.fixed => {
                    let actual = flow.actual_value.as_ref().ok_or_else(|| {
                        ModelError::config(format!("fixed flow {} has no actual_value", name))
                    })?;
                    let value = actual.at(t) * nominal;
                    (value, value)
                }
                (false, Some(nominal)) => {
                    let lower = if flow.is_discrete() {
                        0.0
                    } else {
                        flow.min_at(t) * nominal
                    };
                    (lower, flow.max_at(t) * nominal)
                }
                (false, None) if flow.fixed => {
                    return Err(ModelError::config(format!(
                        "fixed flow {} needs a nominal_value or an investment",
                        name
                    )));
                }
                _ => (0.0, f64::INFINITY),
            };
            vars.push(model.add_variable(format!("flow[{},{}]", name, t), lower, upper));
        }
        model.flow.insert(key, vars);
    }

    debug!(flows = model.flow.len(), horizon, "registered flow variables");
    Ok(())
}

/// Flow variable of `key` at `t`, or a configuration error naming the flow.
pub(crate) fn require_flow(
    model: &Model,
    system: &EnergySystem,
    key: FlowKey,
    t: usize,
) -> ModelResult<VarId> {
    model.flow_var(key, t).ok_or_else(|| {
        ModelError::config(format!(
            "flow {} has no variable at timestep {}",
            key.describe(system),
            t
        ))
    })
}
