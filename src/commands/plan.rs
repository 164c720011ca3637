//! `weaver plan` - compute and print the reconciliation plan.

use crate::cli::PlanArgs;
use crate::commands::load_spec;
use crate::config::WeaverConfig;
use crate::inventory_file::FileInventory;
use crate::{state, ui};
use anyhow::Result;
use reconcile::{Backend, CancelToken, PlanOutcome, ResolveOptions, engine};

pub fn resolve_options(
    config: &WeaverConfig,
    policy: Option<crate::cli::PolicyArg>,
    force_delete: bool,
) -> ResolveOptions {
    ResolveOptions {
        policy: policy.map(Into::into).unwrap_or(config.conflict_policy),
        force_delete,
        max_deletes: config.max_deletes,
    }
}

pub fn run(config: &WeaverConfig, args: &PlanArgs) -> Result<u8> {
    let spec = load_spec(&args.spec)?;
    let spec_id = spec.id.clone();

    let inventory = FileInventory::open(config.inventory_path())?;
    let backend = Backend::of(&inventory);
    let engine_state = state::load(&config.state_path(), &spec_id)?;
    let options = resolve_options(config, args.policy, args.force_delete);

    let outcome =
        engine::plan(&backend, spec, &engine_state, &options, &CancelToken::new())?;
    print_plan(&spec_id, &outcome);

    Ok(if outcome.requires_approval() { 4 } else { 0 })
}

pub fn print_plan(spec_id: &str, outcome: &PlanOutcome) {
    let plan = &outcome.resolved.plan;

    for warning in &outcome.topology.warnings {
        ui::warn(warning);
    }

    if plan.is_empty() && outcome.resolved.orphans.is_empty() {
        ui::success(&format!("spec '{}' is converged; nothing to do", spec_id));
        return;
    }

    ui::header(&format!("Plan for '{}'", spec_id));
    for adopt in &plan.adoptions {
        ui::plan_line("→", &format!("adopt {} {} ({})", adopt.kind, adopt.name, adopt.native_id));
    }
    for create in &plan.creates {
        ui::plan_line("+", &format!("create {} {}", create.kind, create.name));
    }
    for update in &plan.updates {
        let fields: Vec<&str> = update.patch.keys().map(String::as_str).collect();
        ui::plan_line("~", &format!("update {} {} [{}]", update.kind, update.name, fields.join(", ")));
    }
    for orphan in &outcome.resolved.orphans {
        ui::plan_line("→", &format!("orphan {} {} (externally referenced)", orphan.kind, orphan.name));
    }
    for delete in &plan.deletes {
        ui::plan_line("-", &format!("delete {} {}", delete.kind, delete.name));
    }

    for record in &outcome.resolved.resolutions {
        if record.field != reconcile::diff::DELETION_FIELD {
            let how = record.resolution.map_or("unresolved", |r| r.as_str());
            ui::warn(&format!(
                "conflict on field '{}' of {} resolved as {} (ours: {}, theirs: {})",
                record.field, record.stable_id, how, record.desired, record.actual
            ));
        }
    }

    println!();
    ui::kv(
        "summary",
        &format!(
            "{} to adopt, {} to create, {} to update, {} to orphan, {} to delete, {} unchanged",
            plan.adoptions.len(),
            plan.creates.len(),
            plan.updates.len(),
            outcome.resolved.orphans.len(),
            plan.deletes.len(),
            plan.unchanged_count
        ),
    );

    if let Some(token) = &outcome.resolved.approval_token {
        ui::warn(&format!(
            "plan deletes {} objects; re-run apply with --approve {} (or --yes) to proceed",
            plan.deletes.len(),
            token
        ));
    }
}
