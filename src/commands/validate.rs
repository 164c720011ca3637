//! `weaver validate` - check a spec and preview its topology.

use crate::cli::SpecArgs;
use crate::commands::load_spec;
use crate::ui;
use anyhow::Result;
use fabric::{calculate, validate};
use reconcile::EngineError;

pub fn run(args: &SpecArgs) -> Result<u8> {
    let spec = load_spec(&args.spec)?;
    let spec_id = spec.id.clone();

    let validated = match validate(spec) {
        Ok(validated) => validated,
        Err(errors) => {
            ui::error(&format!("spec '{}' failed validation:", spec_id));
            for error in &errors {
                ui::dim(&error.to_string());
            }
            return Err(EngineError::Validation(errors).into());
        }
    };
    ui::success(&format!("spec '{}' is valid", spec_id));

    let topology = calculate(&validated).map_err(EngineError::from)?;
    ui::section("Computed topology");
    ui::kv("servers", &topology.server_total.to_string());
    ui::kv("leaves", &topology.leaf_count.to_string());
    ui::kv("spines", &topology.spine_count.to_string());
    ui::kv("uplinks per leaf", &topology.uplinks_per_leaf.to_string());
    ui::kv("downlink breakout", &topology.downlink_breakout.to_string());
    for warning in &topology.warnings {
        ui::warn(warning);
    }
    Ok(0)
}
