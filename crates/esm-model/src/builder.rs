//! Model assembly: classification, flow registration, then every block in
//! [`ComponentKind::BUILD_ORDER`].

use esm_core::EnergySystem;
use tracing::{debug, info};

use crate::blocks::{
    bus, discrete, electrical, flow, investment_flow, investment_storage, storage, transformer,
};
use crate::config::ModelConfig;
use crate::error::ModelResult;
use crate::flows::register_flows;
use crate::grouping::{classify, ComponentKind, Groups};
use crate::model::Model;
use crate::time::TimeIndex;

/// Build the complete optimisation model of `system` over `time`.
///
/// The energy system is only read. Building the same system twice yields
/// models with identical variables, constraints and costs.
///
/// # Errors
///
/// Returns the first configuration or unsupported-feature error raised by
/// classification or by a block. No partially built model is returned.
pub fn build_model(
    system: &EnergySystem,
    time: TimeIndex,
    config: ModelConfig,
) -> ModelResult<Model> {
    let groups = classify(system, &time)?;
    info!(
        nodes = system.graph().node_count(),
        flows = system.graph().edge_count(),
        timesteps = time.len(),
        solver = %config.solver,
        "building energy system model"
    );

    let mut model = Model::new(time, config);
    register_flows(&mut model, system)?;

    for kind in ComponentKind::BUILD_ORDER {
        let size = groups.len(kind);
        if size == 0 {
            continue;
        }
        debug!(block = %kind, size, "building block");
        build_block(&mut model, system, &groups, kind)?;
    }

    let stats = model.stats();
    info!(
        variables = stats.variables,
        binaries = stats.binaries,
        constraints = stats.total_constraints(),
        "model built"
    );
    if model.diagnostics().has_issues() {
        debug!(summary = %model.diagnostics().summary(), "model diagnostics");
    }
    Ok(model)
}

fn build_block(
    model: &mut Model,
    system: &EnergySystem,
    groups: &Groups,
    kind: ComponentKind,
) -> ModelResult<()> {
    match kind {
        ComponentKind::Bus => bus::build(model, system, &groups.buses),
        ComponentKind::Transformer => transformer::build(model, system, &groups.transformers),
        ComponentKind::Flow => flow::build(model, system, &groups.flows),
        ComponentKind::InvestmentFlow => {
            investment_flow::build(model, system, &groups.investment_flows)
        }
        ComponentKind::Storage => storage::build(model, system, &groups.storages),
        ComponentKind::InvestmentStorage => {
            investment_storage::build(model, system, &groups.investment_storages)
        }
        ComponentKind::Discrete => discrete::build(model, system, &groups.discrete),
        ComponentKind::ElectricalLine => electrical::build(model, system, &groups.lines),
    }
}
