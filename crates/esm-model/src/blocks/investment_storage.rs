//! Storages sized by a decision variable.
//!
//! Same balance as the fixed storage, with `invest[n]` in
//! `[0, investment.maximum]` taking the place of the nominal capacity:
//!
//! - `capacity[last] == initial_capacity * invest` when an initial state is set
//! - `capacity[t] <= capacity_max[t] * invest`
//! - `capacity[t] <= capacity_min[t] * invest`, only for storages whose
//!   `capacity_min` sums to a positive value. Both limits are upper bounds.
//! - `invest_flow[input, n] == invest * nominal_input_capacity_ratio`, and the
//!   same for the output flow with `nominal_output_capacity_ratio`
//!
//! Both connected flows must be invested flows; the investment flow block has
//! to be built first.

use esm_core::{EnergySystem, Storage};
use tracing::debug;

use crate::blocks::storage::{balance, storage_of};
use crate::error::{ModelError, ModelResult};
use crate::expr::{LinearConstraint, VarId};
use crate::flows::FlowKey;
use crate::grouping::StorageEntry;
use crate::model::{ConstraintKey, Model};

pub const BALANCE: &str = "investment_storage.balance";
pub const INITIAL_CAPACITY: &str = "investment_storage.initial_capacity";
pub const INPUT_INVEST: &str = "investment_storage.input_invest";
pub const OUTPUT_INVEST: &str = "investment_storage.output_invest";
pub const MAX_CAPACITY: &str = "investment_storage.max_capacity";
pub const MIN_CAPACITY: &str = "investment_storage.min_capacity";

pub const INVESTMENT_COSTS: &str = "investment_storage.investment_costs";
pub const FIXED_COSTS: &str = "investment_storage.fixed_costs";

fn validate(system: &EnergySystem, entry: &StorageEntry) -> ModelResult<f64> {
    let storage = storage_of(system, entry)?;
    let investment = storage.investment.as_ref().ok_or_else(|| {
        ModelError::config(format!("storage '{}' has no investment", storage.label))
    })?;
    let ep_costs = investment.ep_costs.ok_or_else(|| {
        ModelError::config(format!(
            "investment of storage '{}' has no ep_costs",
            storage.label
        ))
    })?;
    for (side, key) in [("input", entry.inflow()), ("output", entry.outflow())] {
        let invested = system
            .flow(key.source, key.target)
            .is_some_and(|f| f.is_invested());
        if !invested {
            return Err(ModelError::config(format!(
                "{} flow {} of invested storage '{}' must be an invested flow",
                side,
                key.describe(system),
                storage.label
            )));
        }
    }
    Ok(ep_costs)
}

fn invest_of(model: &Model, system: &EnergySystem, key: FlowKey) -> ModelResult<VarId> {
    model.invest_flow_var(key).ok_or_else(|| {
        ModelError::config(format!(
            "flow {} has no sizing variable; the investment flow block must run first",
            key.describe(system)
        ))
    })
}

pub fn build(model: &mut Model, system: &EnergySystem, group: &[StorageEntry]) -> ModelResult<()> {
    for entry in group {
        validate(system, entry)?;
        invest_of(model, system, entry.inflow())?;
        invest_of(model, system, entry.outflow())?;
    }

    let horizon = model.time().len();
    for entry in group {
        let ep_costs = validate(system, entry)?;
        let storage: &Storage = storage_of(system, entry)?;
        let maximum = storage
            .investment
            .as_ref()
            .map_or(f64::INFINITY, |i| i.maximum);

        let invest = model.add_variable(format!("invest[{}]", storage.label), 0.0, maximum);
        model.invest_storage.insert(entry.node, invest);

        let mut capacity = Vec::with_capacity(horizon);
        for t in model.time().positions() {
            capacity.push(model.add_variable(
                format!("capacity[{},{}]", storage.label, t),
                0.0,
                f64::INFINITY,
            ));
        }

        if let Some(initial) = storage.initial_capacity {
            let last = capacity[model.time().last()];
            model.add_constraint(
                INITIAL_CAPACITY,
                ConstraintKey::Node(entry.node),
                LinearConstraint::eq(last, invest * initial),
            );
        }

        balance(model, system, entry, storage, &capacity, BALANCE)?;

        let invest_in = invest_of(model, system, entry.inflow())?;
        let invest_out = invest_of(model, system, entry.outflow())?;
        model.add_constraint(
            INPUT_INVEST,
            ConstraintKey::Node(entry.node),
            LinearConstraint::eq(invest_in, invest * storage.nominal_input_capacity_ratio),
        );
        model.add_constraint(
            OUTPUT_INVEST,
            ConstraintKey::Node(entry.node),
            LinearConstraint::eq(invest_out, invest * storage.nominal_output_capacity_ratio),
        );

        let with_minimum = storage.capacity_min.sum(horizon) > 0.0;
        for t in model.time().positions() {
            model.add_constraint(
                MAX_CAPACITY,
                ConstraintKey::NodeTime(entry.node, t),
                LinearConstraint::le(capacity[t], invest * storage.capacity_max.at(t)),
            );
            if with_minimum {
                model.add_constraint(
                    MIN_CAPACITY,
                    ConstraintKey::NodeTime(entry.node, t),
                    LinearConstraint::le(capacity[t], invest * storage.capacity_min.at(t)),
                );
            }
        }
        model.storage_capacity.insert(entry.node, capacity);

        model.add_cost(INVESTMENT_COSTS, invest * ep_costs);
        let fixed_costs = storage
            .investment
            .as_ref()
            .and_then(|i| i.fixed_costs)
            .or(storage.fixed_costs);
        if let Some(fixed_costs) = fixed_costs {
            model.add_cost(FIXED_COSTS, invest * fixed_costs);
        }
    }

    debug!(storages = group.len(), "investment storage block built");
    Ok(())
}
