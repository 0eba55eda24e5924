//! Linear conversion: `flow(input, n, t) * conversion_factor[o][t] == flow(n, o, t)`.

use esm_core::{EnergySystem, Node};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::expr::LinearConstraint;
use crate::flows::{require_flow, FlowKey};
use crate::grouping::TransformerEntry;
use crate::model::{ConstraintKey, Model};

pub const RELATION: &str = "transformer.relation";

pub fn build(
    model: &mut Model,
    system: &EnergySystem,
    group: &[TransformerEntry],
) -> ModelResult<()> {
    for entry in group {
        let Some(Node::Transformer(transformer)) = system.node(entry.node) else {
            return Err(ModelError::config(format!(
                "'{}' is not a transformer",
                system.label(entry.node)
            )));
        };
        let inflow = FlowKey::new(entry.input, entry.node);

        for &output in &entry.outputs {
            let factor = transformer.conversion_factor(system.label(output));
            let outflow = FlowKey::new(entry.node, output);
            for t in model.time().positions() {
                let input = require_flow(model, system, inflow, t)?;
                let output = require_flow(model, system, outflow, t)?;
                model.add_constraint(
                    RELATION,
                    ConstraintKey::FlowTime(outflow, t),
                    LinearConstraint::eq(input * factor.at(t), output),
                );
            }
        }
    }

    debug!(transformers = group.len(), "transformer block built");
    Ok(())
}
