//! `weaver drift` - read-only comparison against the last apply.

use crate::cli::SpecArgs;
use crate::commands::load_spec;
use crate::config::WeaverConfig;
use crate::inventory_file::FileInventory;
use crate::{state, ui};
use anyhow::Result;
use reconcile::{Backend, engine};

pub fn run(config: &WeaverConfig, args: &SpecArgs) -> Result<u8> {
    let spec = load_spec(&args.spec)?;
    let spec_id = spec.id;

    let inventory = FileInventory::open(config.inventory_path())?;
    let backend = Backend::of(&inventory);
    let engine_state = state::load(&config.state_path(), &spec_id)?;

    let report = engine::drift(&backend, &spec_id, &engine_state)?;

    if report.never_applied {
        ui::info(&format!("spec '{}' has never been applied; nothing to compare", spec_id));
        return Ok(0);
    }
    if report.is_clean() {
        ui::success(&format!("spec '{}': no drift", spec_id));
        return Ok(0);
    }

    ui::header(&format!("Drift for '{}'", spec_id));
    for modified in &report.modified {
        ui::plan_line(
            "~",
            &format!(
                "{} {}: field '{}' is {} (applied {})",
                modified.kind, modified.name, modified.field, modified.actual, modified.applied
            ),
        );
    }
    for missing in &report.missing {
        ui::plan_line(
            "-",
            &format!("{} {} is gone from the inventory ({})", missing.kind, missing.name, missing.native_id),
        );
    }
    for orphaned in &report.orphaned {
        ui::plan_line(
            "→",
            &format!(
                "{} {} carries this spec's tag but is not tracked ({})",
                orphaned.kind, orphaned.name, orphaned.native_id
            ),
        );
    }
    println!();
    ui::kv(
        "summary",
        &format!(
            "{} modified field(s), {} missing, {} untracked",
            report.modified.len(),
            report.missing.len(),
            report.orphaned.len()
        ),
    );
    ui::dim("run 'weaver plan' to see how reconciliation would respond");
    Ok(0)
}
