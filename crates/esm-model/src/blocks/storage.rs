//! Storages with a fixed `nominal_capacity`.
//!
//! The state of charge `capacity[n, t]` evolves as
//!
//! ```text
//! capacity[t] = capacity[previous(t)] * (1 - capacity_loss[t])
//!             + inflow[t] * inflow_conversion_factor[t] * dt
//!             - outflow[t] / outflow_conversion_factor[t] * dt
//! ```
//!
//! with `previous(first) == last`, so the horizon is treated as one cycle. An
//! `initial_capacity` fixes the state at the last timestep, which is the
//! state the first timestep starts from.

use esm_core::{EnergySystem, Node, Storage};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::expr::{LinearConstraint, LinearExpr, VarId};
use crate::flows::require_flow;
use crate::grouping::StorageEntry;
use crate::model::{ConstraintKey, Model};

pub const BALANCE: &str = "storage.balance";

pub const FIXED_COSTS: &str = "storage.fixed_costs";

pub(crate) fn storage_of<'a>(
    system: &'a EnergySystem,
    entry: &StorageEntry,
) -> ModelResult<&'a Storage> {
    match system.node(entry.node) {
        Some(Node::Storage(storage)) => Ok(storage),
        _ => Err(ModelError::config(format!(
            "'{}' is not a storage",
            system.label(entry.node)
        ))),
    }
}

/// Emit the balance recurrence of `entry` into `family`.
pub(crate) fn balance(
    model: &mut Model,
    system: &EnergySystem,
    entry: &StorageEntry,
    storage: &Storage,
    capacity: &[VarId],
    family: &'static str,
) -> ModelResult<()> {
    for t in model.time().positions() {
        let dt = model.time().increment(t);
        let previous = capacity[model.time().previous(t)];
        let inflow = require_flow(model, system, entry.inflow(), t)?;
        let outflow = require_flow(model, system, entry.outflow(), t)?;

        let mut lhs = LinearExpr::from(capacity[t]);
        lhs -= previous * (1.0 - storage.capacity_loss.at(t));
        lhs -= inflow * (storage.inflow_conversion_factor.at(t) * dt);
        lhs += outflow * (dt / storage.outflow_conversion_factor.at(t));

        model.add_constraint(
            family,
            ConstraintKey::NodeTime(entry.node, t),
            LinearConstraint::eq(lhs, 0.0),
        );
    }
    Ok(())
}

pub fn build(model: &mut Model, system: &EnergySystem, group: &[StorageEntry]) -> ModelResult<()> {
    for entry in group {
        let storage = storage_of(system, entry)?;
        if storage.nominal_capacity.is_none() {
            return Err(ModelError::config(format!(
                "storage '{}' has no nominal_capacity",
                storage.label
            )));
        }
    }

    for entry in group {
        let storage = storage_of(system, entry)?;
        let nominal = storage.nominal_capacity.unwrap_or_default();

        let mut capacity = Vec::with_capacity(model.time().len());
        for t in model.time().positions() {
            capacity.push(model.add_variable(
                format!("capacity[{},{}]", storage.label, t),
                nominal * storage.capacity_min.at(t),
                nominal * storage.capacity_max.at(t),
            ));
        }

        if let Some(initial) = storage.initial_capacity {
            let last = capacity[model.time().last()];
            model.fix(last, initial * nominal);
        }

        balance(model, system, entry, storage, &capacity, BALANCE)?;
        model.storage_capacity.insert(entry.node, capacity);

        if let Some(fixed_costs) = storage.fixed_costs {
            model.add_cost(FIXED_COSTS, LinearExpr::constant(nominal * fixed_costs));
        }
    }

    debug!(storages = group.len(), "storage block built");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::flows::register_flows;
    use crate::grouping::classify;
    use crate::time::TimeIndex;
    use esm_core::{Bus, Flow, NodeIndex};

    fn battery(storage: Storage, horizon: usize) -> (Model, EnergySystem, StorageEntry) {
        let mut es = EnergySystem::new();
        let bus = es.add_node(Bus::new("el")).unwrap();
        let node = es.add_node(storage).unwrap();
        es.connect(bus, node, Flow::new()).unwrap();
        es.connect(node, bus, Flow::new()).unwrap();

        let time = TimeIndex::uniform(horizon, 1.0).unwrap();
        let groups = classify(&es, &time).unwrap();
        let mut model = Model::new(time, ModelConfig::default());
        register_flows(&mut model, &es).unwrap();
        build(&mut model, &es, &groups.storages).unwrap();
        let entry = groups.storages[0];
        (model, es, entry)
    }

    #[test]
    fn test_capacity_bounds_and_anchor() {
        let storage = Storage::new("battery")
            .with_nominal_capacity(100.0)
            .with_capacity_limits(0.1, vec![0.9, 1.0, 1.0])
            .with_initial_capacity(0.5);
        let (model, _, entry) = battery(storage, 3);

        let first = model.storage_capacity_var(entry.node, 0).unwrap();
        let last = model.storage_capacity_var(entry.node, 2).unwrap();
        assert_eq!(model.var(first).map(|d| (d.lower, d.upper)), Some((10.0, 90.0)));
        assert_eq!(model.var(last).map(|d| (d.lower, d.upper)), Some((50.0, 50.0)));
    }

    #[test]
    fn test_balance_wraps_to_last_timestep() {
        let storage = Storage::new("battery")
            .with_nominal_capacity(10.0)
            .with_capacity_loss(0.1)
            .with_efficiencies(0.9, 0.8);
        let (model, _, entry) = battery(storage, 2);

        let c = model
            .constraint(BALANCE, ConstraintKey::NodeTime(entry.node, 0))
            .unwrap();
        let cap0 = model.storage_capacity_var(entry.node, 0).unwrap();
        let cap1 = model.storage_capacity_var(entry.node, 1).unwrap();
        let inflow = model.flow_var(entry.inflow(), 0).unwrap();
        let outflow = model.flow_var(entry.outflow(), 0).unwrap();
        assert_eq!(c.coefficient(cap0), 1.0);
        assert!((c.coefficient(cap1) + 0.9).abs() < 1e-12);
        assert!((c.coefficient(inflow) + 0.9).abs() < 1e-12);
        assert!((c.coefficient(outflow) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_not_a_storage() {
        let es = EnergySystem::new();
        let mut model = Model::new(TimeIndex::uniform(1, 1.0).unwrap(), ModelConfig::default());
        let entry = StorageEntry {
            node: NodeIndex::new(0),
            input: NodeIndex::new(1),
            output: NodeIndex::new(2),
        };
        assert!(build(&mut model, &es, &[entry]).is_err());
    }
}
