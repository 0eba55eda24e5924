//! On/off status for discrete flows.
//!
//! Each flow gets a binary `status[t]`. For flows whose minimum fraction at
//! the first timestep is nonzero:
//!
//! ```text
//! status[t] * min[t] * nominal_value >= flow[t]
//! status[t] * max[t] * nominal_value <= flow[t]
//! ```
//!
//! These are the inequalities as formulated, not the textbook
//! `min * nominal * status <= flow <= max * nominal * status`; with
//! `min < max` and `status = 1` they leave no feasible flow. They are kept
//! as-is and pinned by tests until the intended formulation is settled.
//!
//! Start-up costs and gradients on discrete flows have no formulation and are
//! rejected with [`ModelError::Unsupported`].

use esm_core::{EnergySystem, Flow};
use tracing::{debug, warn};

use crate::error::{ModelError, ModelResult};
use crate::expr::LinearConstraint;
use crate::flows::{require_flow, FlowKey};
use crate::model::{ConstraintKey, Model};

pub const MINIMUM_FLOW: &str = "discrete.minimum_flow";
pub const MAXIMUM_FLOW: &str = "discrete.maximum_flow";

fn validate<'a>(system: &'a EnergySystem, key: FlowKey) -> ModelResult<(&'a Flow, f64)> {
    let name = key.describe(system);
    let flow = system
        .flow(key.source, key.target)
        .ok_or_else(|| ModelError::config(format!("unknown flow {}", name)))?;
    let discrete = flow
        .discrete
        .as_ref()
        .ok_or_else(|| ModelError::config(format!("flow {} is not discrete", name)))?;
    if discrete.start_costs.is_some() {
        return Err(ModelError::unsupported(format!(
            "start_costs on discrete flow {}",
            name
        )));
    }
    if flow.has_gradient() {
        return Err(ModelError::unsupported(format!(
            "gradient limits on discrete flow {}",
            name
        )));
    }
    let nominal = flow.nominal_value.ok_or_else(|| {
        ModelError::config(format!("discrete flow {} needs a nominal_value", name))
    })?;
    Ok((flow, nominal))
}

pub fn build(model: &mut Model, system: &EnergySystem, group: &[FlowKey]) -> ModelResult<()> {
    for &key in group {
        validate(system, key)?;
    }

    if !group.is_empty() && model.config().relax_binaries() {
        warn!(
            flows = group.len(),
            solver = %model.config().solver,
            "status variables will be relaxed to [0, 1]"
        );
        model.diagnostics_mut().add_warning(
            "discrete",
            "binary status variables are relaxed to continuous [0, 1]",
        );
    }

    let horizon = model.time().len();
    for &key in group {
        let (flow, nominal) = validate(system, key)?;
        let name = key.describe(system);

        let mut status = Vec::with_capacity(horizon);
        for t in model.time().positions() {
            status.push(model.add_binary(format!("status[{},{}]", name, t)));
        }

        let with_minimum = flow.min_at(0) != 0.0;
        if with_minimum {
            for t in model.time().positions() {
                let var = require_flow(model, system, key, t)?;
                model.add_constraint(
                    MINIMUM_FLOW,
                    ConstraintKey::FlowTime(key, t),
                    LinearConstraint::ge(status[t] * (flow.min_at(t) * nominal), var),
                );
                model.add_constraint(
                    MAXIMUM_FLOW,
                    ConstraintKey::FlowTime(key, t),
                    LinearConstraint::le(status[t] * (flow.max_at(t) * nominal), var),
                );
            }
        }
        model.status.insert(key, status);
    }

    debug!(flows = group.len(), "discrete block built");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, SolverKind};
    use crate::flows::register_flows;
    use crate::time::TimeIndex;
    use esm_core::{Bus, Discrete, Gradient, Source};

    fn build_single(flow: Flow, config: ModelConfig) -> (Model, FlowKey, ModelResult<()>) {
        let mut es = EnergySystem::new();
        let bus = es.add_node(Bus::new("b")).unwrap();
        let chp = es.add_node(Source::new("chp")).unwrap();
        es.connect(chp, bus, flow).unwrap();
        let key = FlowKey::new(chp, bus);
        let mut model = Model::new(TimeIndex::uniform(2, 1.0).unwrap(), config);
        register_flows(&mut model, &es).unwrap();
        let result = build(&mut model, &es, &[key]);
        (model, key, result)
    }

    fn unit(min: f64) -> Flow {
        Flow::new()
            .with_nominal_value(10.0)
            .with_min(min)
            .with_max(1.0)
            .with_discrete(Discrete::new())
    }

    #[test]
    fn test_status_per_timestep() {
        let (model, key, result) = build_single(unit(0.5), ModelConfig::default());
        result.unwrap();
        assert_eq!(model.stats().binaries, 2);
        assert!(model.status_var(key, 1).is_some());
        assert_eq!(model.family(MINIMUM_FLOW).map(|f| f.len()), Some(2));
        assert_eq!(model.family(MAXIMUM_FLOW).map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_inequality_directions_are_preserved() {
        let (model, key, result) = build_single(unit(0.5), ModelConfig::default());
        result.unwrap();
        let min = model
            .constraint(MINIMUM_FLOW, ConstraintKey::FlowTime(key, 0))
            .unwrap();
        let max = model
            .constraint(MAXIMUM_FLOW, ConstraintKey::FlowTime(key, 0))
            .unwrap();
        // variables: flow[0], flow[1], status[0], status[1]
        let at = |flow: f64, status: f64| vec![flow, 0.0, status, 0.0];

        // status off: flow must not exceed zero
        assert!(min.is_satisfied(&at(0.0, 0.0), 1e-12));
        assert!(!min.is_satisfied(&at(3.0, 0.0), 1e-12));
        // status on: flow <= 5 and flow >= 10
        assert!(min.is_satisfied(&at(5.0, 1.0), 1e-12));
        assert!(!max.is_satisfied(&at(5.0, 1.0), 1e-12));
        assert!(max.is_satisfied(&at(10.0, 1.0), 1e-12));
        assert!(!min.is_satisfied(&at(10.0, 1.0), 1e-12));
    }

    #[test]
    fn test_zero_minimum_creates_status_only() {
        let (model, _, result) = build_single(unit(0.0), ModelConfig::default());
        result.unwrap();
        assert_eq!(model.stats().binaries, 2);
        assert!(model.family(MINIMUM_FLOW).is_none());
        assert!(model.family(MAXIMUM_FLOW).is_none());
    }

    #[test]
    fn test_minimum_is_read_at_first_timestep() {
        let late = Flow::new()
            .with_nominal_value(10.0)
            .with_min(vec![0.0, 0.5])
            .with_discrete(Discrete::new());
        let (model, _, result) = build_single(late, ModelConfig::default());
        result.unwrap();
        assert_eq!(model.stats().binaries, 2);
        assert!(model.family(MINIMUM_FLOW).is_none());
        assert!(model.family(MAXIMUM_FLOW).is_none());

        let early = Flow::new()
            .with_nominal_value(10.0)
            .with_min(vec![0.5, 0.0])
            .with_discrete(Discrete::new());
        let (model, key, result) = build_single(early, ModelConfig::default());
        result.unwrap();
        assert_eq!(model.family(MINIMUM_FLOW).map(|f| f.len()), Some(2));
        let second = model
            .constraint(MINIMUM_FLOW, ConstraintKey::FlowTime(key, 1))
            .unwrap();
        let status = model.status_var(key, 1).unwrap();
        assert_eq!(second.coefficient(status), 0.0);
    }

    #[test]
    fn test_start_costs_unsupported() {
        let flow = Flow::new()
            .with_nominal_value(10.0)
            .with_discrete(Discrete::new().with_start_costs(5.0));
        let (model, _, result) = build_single(flow, ModelConfig::default());
        assert!(result.unwrap_err().is_unsupported());
        assert_eq!(model.stats().binaries, 0);
    }

    #[test]
    fn test_gradient_unsupported() {
        let flow = unit(0.5).with_positive_gradient(Gradient::new(0.1));
        let (_, _, result) = build_single(flow, ModelConfig::default());
        assert!(result.unwrap_err().is_unsupported());
    }

    #[test]
    fn test_relaxation_is_reported() {
        let (model, _, result) = build_single(unit(0.5), ModelConfig::default());
        result.unwrap();
        assert_eq!(model.diagnostics().issues_by_category("discrete").count(), 1);

        let config = ModelConfig::default().with_solver(SolverKind::Highs);
        let (model, _, result) = build_single(unit(0.5), config);
        result.unwrap();
        assert!(!model.diagnostics().has_issues());
    }
}
