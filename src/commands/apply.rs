//! `weaver apply` - reconcile the inventory onto the spec.

use crate::cli::ApplyArgs;
use crate::commands::load_spec;
use crate::config::WeaverConfig;
use crate::inventory_file::FileInventory;
use crate::{progress, state, ui};
use anyhow::Result;
use dialoguer::Confirm;
use reconcile::{Backend, CancelToken, EngineError, ExecuteOptions, engine};

pub fn run(config: &WeaverConfig, args: &ApplyArgs) -> Result<u8> {
    let spec = load_spec(&args.spec)?;
    let spec_id = spec.id.clone();

    let inventory = FileInventory::open(config.inventory_path())?;
    let backend = Backend::of(&inventory);
    let state_dir = config.state_path();
    let mut engine_state = state::load(&state_dir, &spec_id)?;
    let options = super::plan::resolve_options(config, args.policy, args.force_delete);
    let cancel = CancelToken::new();

    let outcome = engine::plan(&backend, spec, &engine_state, &options, &cancel)?;
    super::plan::print_plan(&spec_id, &outcome);

    let total_changes = outcome.resolved.plan.creates.len()
        + outcome.resolved.plan.updates.len()
        + outcome.resolved.plan.deletes.len()
        + outcome.resolved.plan.adoptions.len()
        + outcome.resolved.orphans.len();
    if total_changes == 0 && outcome.resolved.plan.stale_mappings.is_empty() {
        return Ok(0);
    }

    // Large delete sets need the approval token echoed back; `--yes`
    // or an interactive confirmation supplies it from this very plan.
    let approval = match (&outcome.resolved.approval_token, args.dry_run) {
        (Some(token), false) => {
            let token = token.clone();
            if let Some(given) = &args.approve {
                if *given != token {
                    ui::error("approval token does not match this plan (the plan has changed)");
                    return Err(EngineError::ApprovalRequired.into());
                }
                Some(token)
            } else if args.yes {
                Some(token)
            } else {
                let deletes = outcome.resolved.plan.deletes.len();
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete {} objects?", deletes))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    ui::warn("apply aborted; no changes made");
                    return Ok(4);
                }
                Some(token)
            }
        }
        _ => None,
    };

    let execute_options = ExecuteOptions {
        jobs: args.jobs.unwrap_or(config.jobs),
        dry_run: args.dry_run,
        approval,
    };

    if args.dry_run {
        let (result, _) =
            engine::apply(&backend, outcome, &mut engine_state, &execute_options, &cancel)?;
        ui::info(&format!(
            "dry run: would adopt {}, create {}, update {}, orphan {}, delete {}",
            result.adopted, result.created, result.updated, result.orphaned, result.deleted
        ));
        return Ok(0);
    }

    let pb = progress::spinner(&format!("applying {} change(s) to '{}'", total_changes, spec_id));
    let applied = engine::apply(&backend, outcome, &mut engine_state, &execute_options, &cancel);
    // Ownership may have moved even on a failed run; always persist.
    state::save(&state_dir, &spec_id, &engine_state)?;
    let (result, session) = match applied {
        Ok(ok) => ok,
        Err(error) => {
            progress::finish_error(&pb, "apply failed");
            return Err(error.into());
        }
    };

    if result.is_success() {
        progress::finish_success(
            &pb,
            &format!(
                "applied: {} created, {} updated, {} deleted, {} adopted, {} orphaned",
                result.created, result.updated, result.deleted, result.adopted, result.orphaned
            ),
        );
        Ok(0)
    } else {
        progress::finish_error(
            &pb,
            &format!(
                "apply finished {} with {} error(s), {} skipped",
                session.state().as_str(),
                result.errors.len(),
                result.skipped
            ),
        );
        for failure in &result.errors {
            ui::error(&format!("{} {}: {}", failure.kind, failure.name, failure.message));
        }
        ui::dim("the snapshot was not advanced; re-run apply to retry the failed work");
        Ok(5)
    }
}
