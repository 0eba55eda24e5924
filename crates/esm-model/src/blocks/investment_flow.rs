//! Flows sized by a decision variable.
//!
//! Every flow in the group gets `invest[flow]` in `[0, investment.maximum]`.
//! A fixed flow follows `flow[t] == actual_value[t] * invest`; otherwise
//! `flow[t] <= max[t] * invest` always holds and `flow[t] >= min[t] * invest`
//! holds when a nonzero minimum is declared. Horizon sums are scaled by
//! `invest` as well. Costs: `ep_costs * invest`, plus `fixed_costs * invest`
//! when the investment (or the flow) declares fixed costs.

use esm_core::{EnergySystem, Flow, Investment, Sequence};
use tracing::debug;

use crate::blocks::flow::horizon_sum;
use crate::error::{ModelError, ModelResult};
use crate::expr::{LinearConstraint, LinearExpr};
use crate::flows::{require_flow, FlowKey};
use crate::model::{ConstraintKey, Model};

pub const FIXED: &str = "investment_flow.fixed";
pub const MAX: &str = "investment_flow.max";
pub const MIN: &str = "investment_flow.min";
pub const SUMMED_MAX: &str = "investment_flow.summed_max";
pub const SUMMED_MIN: &str = "investment_flow.summed_min";

pub const INVESTMENT_COSTS: &str = "investment_flow.investment_costs";
pub const FIXED_COSTS: &str = "investment_flow.fixed_costs";

/// The flow, its investment, `ep_costs` and the fixed profile if pinned.
fn invested<'a>(
    system: &'a EnergySystem,
    key: FlowKey,
) -> ModelResult<(&'a Flow, &'a Investment, f64, Option<&'a Sequence>)> {
    let name = key.describe(system);
    let flow = system
        .flow(key.source, key.target)
        .ok_or_else(|| ModelError::config(format!("unknown flow {}", name)))?;
    let investment = flow
        .investment
        .as_ref()
        .ok_or_else(|| ModelError::config(format!("flow {} has no investment", name)))?;
    let ep_costs = investment
        .ep_costs
        .ok_or_else(|| ModelError::config(format!("investment of flow {} has no ep_costs", name)))?;
    let profile = match (flow.fixed, flow.actual_value.as_ref()) {
        (false, _) => None,
        (true, Some(actual)) => Some(actual),
        (true, None) => {
            return Err(ModelError::config(format!(
                "fixed flow {} has no actual_value",
                name
            )))
        }
    };
    Ok((flow, investment, ep_costs, profile))
}

pub fn build(model: &mut Model, system: &EnergySystem, group: &[FlowKey]) -> ModelResult<()> {
    for &key in group {
        invested(system, key)?;
    }

    let horizon = model.time().len();
    for &key in group {
        let (flow, investment, ep_costs, profile) = invested(system, key)?;
        let name = key.describe(system);

        let invest = model.add_variable(format!("invest[{}]", name), 0.0, investment.maximum);
        model.invest_flow.insert(key, invest);

        for t in model.time().positions() {
            let var = require_flow(model, system, key, t)?;
            if let Some(actual) = profile {
                model.add_constraint(
                    FIXED,
                    ConstraintKey::FlowTime(key, t),
                    LinearConstraint::eq(var, invest * actual.at(t)),
                );
                continue;
            }
            model.add_constraint(
                MAX,
                ConstraintKey::FlowTime(key, t),
                LinearConstraint::le(var, invest * flow.max_at(t)),
            );
            if flow.min.as_ref().is_some_and(|m| m.any_nonzero(horizon)) {
                model.add_constraint(
                    MIN,
                    ConstraintKey::FlowTime(key, t),
                    LinearConstraint::ge(var, invest * flow.min_at(t)),
                );
            }
        }

        if flow.summed_max.is_some() || flow.summed_min.is_some() {
            let total = horizon_sum(model, system, key)?;
            if let Some(summed_max) = flow.summed_max {
                model.add_constraint(
                    SUMMED_MAX,
                    ConstraintKey::Flow(key),
                    LinearConstraint::le(total.clone(), invest * summed_max),
                );
            }
            if let Some(summed_min) = flow.summed_min {
                model.add_constraint(
                    SUMMED_MIN,
                    ConstraintKey::Flow(key),
                    LinearConstraint::ge(total, invest * summed_min),
                );
            }
        }

        model.add_cost(INVESTMENT_COSTS, invest * ep_costs);
        if let Some(fixed_costs) = investment.fixed_costs.or(flow.fixed_costs) {
            model.add_cost(FIXED_COSTS, invest * fixed_costs);
        }
    }

    debug!(flows = group.len(), "investment flow block built");
    Ok(())
}
