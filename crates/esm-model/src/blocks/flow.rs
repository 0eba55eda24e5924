//! Per-flow attributes that do not depend on the component a flow belongs to.
//!
//! For flows with a fixed `nominal_value`:
//!
//! - `summed_max`: `sum(flow[t] * dt) <= summed_max * nominal_value`
//! - `summed_min`: `sum(flow[t] * dt) >= summed_min * nominal_value`
//! - positive gradient: `flow[t] - flow[t-1] <= positive_gradient[t]` for `t > 0`,
//!   where `positive_gradient[t]` is bounded by `ub[t] * nominal_value`
//! - negative gradient: `flow[t-1] - flow[t] <= negative_gradient[t]` for `t > 0`
//! - `fixed_costs * nominal_value` in the objective
//!
//! Variable costs `variable_costs[t] * flow[t] * dt` are charged for every
//! flow, invested or not. Horizon sums of invested flows are handled by the
//! investment flow block.

use esm_core::{EnergySystem, Flow, Gradient};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::expr::{LinearConstraint, LinearExpr, VarId};
use crate::flows::{require_flow, FlowKey};
use crate::model::{ConstraintKey, Model};

pub const SUMMED_MAX: &str = "flow.summed_max";
pub const SUMMED_MIN: &str = "flow.summed_min";
pub const POSITIVE_GRADIENT: &str = "flow.positive_gradient";
pub const NEGATIVE_GRADIENT: &str = "flow.negative_gradient";

pub const VARIABLE_COSTS: &str = "flow.variable_costs";
pub const FIXED_COSTS: &str = "flow.fixed_costs";
pub const GRADIENT_COSTS: &str = "flow.gradient_costs";

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

fn validate(system: &EnergySystem, key: FlowKey, flow: &Flow) -> ModelResult<()> {
    if flow.is_invested() {
        if flow.has_gradient() {
            return Err(ModelError::unsupported(format!(
                "gradient limits on invested flow {}",
                key.describe(system)
            )));
        }
        return Ok(());
    }
    let needs_nominal = flow.summed_max.is_some() || flow.summed_min.is_some() || flow.has_gradient();
    if needs_nominal && flow.nominal_value.is_none() {
        return Err(ModelError::config(format!(
            "flow {} declares horizon or gradient limits but has no nominal_value",
            key.describe(system)
        )));
    }
    Ok(())
}

fn flow_of<'a>(system: &'a EnergySystem, key: FlowKey) -> ModelResult<&'a Flow> {
    system.flow(key.source, key.target).ok_or_else(|| {
        ModelError::config(format!("unknown flow {}", key.describe(system)))
    })
}

pub fn build(model: &mut Model, system: &EnergySystem, group: &[FlowKey]) -> ModelResult<()> {
    for &key in group {
        validate(system, key, flow_of(system, key)?)?;
    }

    for &key in group {
        let flow = flow_of(system, key)?;

        if let Some(costs) = &flow.variable_costs {
            let mut expr = LinearExpr::new();
            for t in model.time().positions() {
                let dt = model.time().increment(t);
                expr += require_flow(model, system, key, t)? * (costs.at(t) * dt);
            }
            model.add_cost(VARIABLE_COSTS, expr);
        }

        if flow.is_invested() {
            continue;
        }
        let Some(nominal) = flow.nominal_value else {
            continue;
        };

        if flow.summed_max.is_some() || flow.summed_min.is_some() {
            let total = horizon_sum(model, system, key)?;
            if let Some(summed_max) = flow.summed_max {
                model.add_constraint(
                    SUMMED_MAX,
                    ConstraintKey::Flow(key),
                    LinearConstraint::le(total.clone(), summed_max * nominal),
                );
            }
            if let Some(summed_min) = flow.summed_min {
                model.add_constraint(
                    SUMMED_MIN,
                    ConstraintKey::Flow(key),
                    LinearConstraint::ge(total, summed_min * nominal),
                );
            }
        }

        if let Some(gradient) = &flow.positive_gradient {
            let vars = gradient_constraints(model, system, key, nominal, gradient, Direction::Up)?;
            model.positive_gradient.insert(key, vars);
        }
        if let Some(gradient) = &flow.negative_gradient {
            let vars =
                gradient_constraints(model, system, key, nominal, gradient, Direction::Down)?;
            model.negative_gradient.insert(key, vars);
        }

        if let Some(fixed_costs) = flow.fixed_costs {
            model.add_cost(FIXED_COSTS, LinearExpr::constant(fixed_costs * nominal));
        }
    }

    debug!(flows = group.len(), "flow block built");
    Ok(())
}

/// `sum(flow[t] * dt)` over the horizon.
pub(crate) fn horizon_sum(
    model: &Model,
    system: &EnergySystem,
    key: FlowKey,
) -> ModelResult<LinearExpr> {
    let mut total = LinearExpr::new();
    for t in model.time().positions() {
        total += require_flow(model, system, key, t)? * model.time().increment(t);
    }
    Ok(total)
}

fn gradient_constraints(
    model: &mut Model,
    system: &EnergySystem,
    key: FlowKey,
    nominal: f64,
    gradient: &Gradient,
    direction: Direction,
) -> ModelResult<Vec<VarId>> {
    let (family, prefix) = match direction {
        Direction::Up => (POSITIVE_GRADIENT, "positive_gradient"),
        Direction::Down => (NEGATIVE_GRADIENT, "negative_gradient"),
    };
    let name = key.describe(system);

    let mut vars = Vec::with_capacity(model.time().len());
    for t in model.time().positions() {
        let ub = gradient.ub.at(t) * nominal;
        vars.push(model.add_variable(format!("{}[{},{}]", prefix, name, t), 0.0, ub));
    }

    // the first timestep has no predecessor within the horizon
    for t in model.time().positions().skip(1) {
        let current = require_flow(model, system, key, t)?;
        let previous = require_flow(model, system, key, t - 1)?;
        let change = match direction {
            Direction::Up => current - previous,
            Direction::Down => previous - current,
        };
        model.add_constraint(
            family,
            ConstraintKey::FlowTime(key, t),
            LinearConstraint::le(change, vars[t]),
        );
    }

    if let Some(costs) = gradient.costs {
        if model.config().gradient_costs {
            let expr: LinearExpr = vars.iter().map(|&v| v * costs).sum();
            model.add_cost(GRADIENT_COSTS, expr);
        }
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::flows::register_flows;
    use crate::time::TimeIndex;
    use esm_core::{Bus, Investment, NodeIndex, Source};

    fn single_flow(flow: Flow, horizon: usize, config: ModelConfig) -> (Model, FlowKey, ModelResult<()>) {
        let mut es = EnergySystem::new();
        let bus = es.add_node(Bus::new("b")).unwrap();
        let src = es.add_node(Source::new("src")).unwrap();
        es.connect(src, bus, flow).unwrap();
        let key = FlowKey::new(src, bus);
        let mut model = Model::new(TimeIndex::uniform(horizon, 2.0).unwrap(), config);
        register_flows(&mut model, &es).unwrap();
        let result = build(&mut model, &es, &[key]);
        (model, key, result)
    }

    #[test]
    fn test_summed_limits_scale_with_nominal_value() {
        let flow = Flow::new()
            .with_nominal_value(10.0)
            .with_summed_max(3.0)
            .with_summed_min(1.0);
        let (model, key, result) = single_flow(flow, 2, ModelConfig::default());
        result.unwrap();

        let max = model.constraint(SUMMED_MAX, ConstraintKey::Flow(key)).unwrap();
        assert_eq!(max.coefficient(model.flow_var(key, 0).unwrap()), 2.0);
        assert_eq!(max.expr.constant_term(), -30.0);
        let min = model.constraint(SUMMED_MIN, ConstraintKey::Flow(key)).unwrap();
        assert!(min.is_satisfied(&[2.5, 2.5], 1e-12));
        assert!(!min.is_satisfied(&[2.0, 2.0], 1e-12));
    }

    #[test]
    fn test_gradients_skip_first_timestep() {
        let flow = Flow::new()
            .with_nominal_value(10.0)
            .with_positive_gradient(Gradient::new(0.1).with_costs(4.0))
            .with_negative_gradient(Gradient::new(vec![0.2, 0.2, 0.25]));
        let (model, key, result) = single_flow(flow, 3, ModelConfig::default());
        result.unwrap();

        assert_eq!(model.family(POSITIVE_GRADIENT).map(|f| f.len()), Some(2));
        assert!(model
            .constraint(POSITIVE_GRADIENT, ConstraintKey::FlowTime(key, 0))
            .is_none());

        let neg = model.negative_gradient_var(key, 2).unwrap();
        assert_eq!(model.var(neg).map(|d| d.upper), Some(2.5));

        // flow vars 0..3, positive gradient vars 3..6, negative 6..9
        let down = model
            .constraint(NEGATIVE_GRADIENT, ConstraintKey::FlowTime(key, 2))
            .unwrap();
        let mut values = vec![5.0, 5.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0];
        assert!(down.is_satisfied(&values, 1e-12));
        values[8] = 2.0;
        assert!(!down.is_satisfied(&values, 1e-12));

        let costs = model.cost(GRADIENT_COSTS).unwrap();
        let pos0 = model.positive_gradient_var(key, 1).unwrap();
        assert_eq!(costs.coefficient(pos0), 4.0);
    }

    #[test]
    fn test_gradient_costs_can_be_disabled() {
        let flow = Flow::new()
            .with_nominal_value(10.0)
            .with_positive_gradient(Gradient::new(0.1).with_costs(4.0));
        let config = ModelConfig::default().with_gradient_costs(false);
        let (model, _, result) = single_flow(flow, 2, config);
        result.unwrap();
        assert!(model.cost(GRADIENT_COSTS).is_none());
    }

    #[test]
    fn test_costs() {
        let flow = Flow::new()
            .with_nominal_value(10.0)
            .with_fixed_costs(3.0)
            .with_variable_costs(vec![1.0, 5.0]);
        let (model, key, result) = single_flow(flow, 2, ModelConfig::default());
        result.unwrap();

        let variable = model.cost(VARIABLE_COSTS).unwrap();
        assert_eq!(variable.coefficient(model.flow_var(key, 1).unwrap()), 10.0);
        assert_eq!(model.cost(FIXED_COSTS).map(|e| e.constant_term()), Some(30.0));
        assert_eq!(model.objective().eval(&[1.0, 1.0]), 2.0 + 10.0 + 30.0);
    }

    #[test]
    fn test_invested_flow_only_gets_variable_costs() {
        let flow = Flow::new()
            .with_investment(Investment::new(1.0))
            .with_summed_max(2.0)
            .with_variable_costs(1.0);
        let (model, _, result) = single_flow(flow, 2, ModelConfig::default());
        result.unwrap();
        assert!(model.family(SUMMED_MAX).is_none());
        assert!(model.cost(VARIABLE_COSTS).is_some());
    }

    #[test]
    fn test_gradient_on_invested_flow_is_unsupported() {
        let flow = Flow::new()
            .with_investment(Investment::new(1.0))
            .with_positive_gradient(Gradient::new(0.5));
        let (model, _, result) = single_flow(flow, 2, ModelConfig::default());
        assert!(result.unwrap_err().is_unsupported());
        assert_eq!(model.num_variables(), 2);
    }

    #[test]
    fn test_summed_max_without_nominal_value_is_rejected() {
        let flow = Flow::new().with_summed_max(2.0);
        let (_, _, result) = single_flow(flow, 1, ModelConfig::default());
        assert!(result.unwrap_err().is_configuration());
    }

    #[test]
    fn test_unknown_flow_is_rejected() {
        let es = EnergySystem::new();
        let mut model = Model::new(TimeIndex::uniform(1, 1.0).unwrap(), ModelConfig::default());
        let key = FlowKey::new(NodeIndex::new(0), NodeIndex::new(1));
        assert!(build(&mut model, &es, &[key]).is_err());
    }
}
