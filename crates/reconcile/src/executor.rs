//! Plan execution
//!
//! Applies a resolved plan against an inventory store in fixed batch
//! order: adoptions, creates (devices, interfaces, cables), updates,
//! orphanings, deletes (cables, interfaces, devices). Each batch fans
//! out on a rayon pool; a batch completes before the next starts, so
//! an interface is never created before its device.
//!
//! Individual operation failures do not abort the run - they are
//! recorded, their dependents skipped, and the rest of the plan
//! proceeds. The last-applied snapshot advances only when every
//! operation succeeded; a partial apply keeps the previous snapshot so
//! the next plan re-issues exactly the failed work.

use crate::conflict::ResolvedPlan;
use crate::error::EngineError;
use crate::inventory::{InventoryError, InventoryStore};
use crate::session::CancelToken;
use crate::state::EngineState;
use fabric::{ObjectKind, StableId, fields};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Executor knobs.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Fan-out width inside one batch.
    pub jobs: usize,
    /// Preview only: count what would happen, touch nothing.
    pub dry_run: bool,
    /// Token echoed back for plans that require approval.
    pub approval: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { jobs: 4, dry_run: false, approval: None }
    }
}

/// One operation that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyFailure {
    pub kind: ObjectKind,
    pub name: String,
    pub message: String,
}

/// Outcome of one apply run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub dry_run: bool,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub adopted: usize,
    pub orphaned: usize,
    /// Operations not attempted: dependency failed, or run cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    pub errors: Vec<ApplyFailure>,
}

impl ReconciliationResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted + self.adopted + self.orphaned
    }
}

/// Retry transient store failures with bounded exponential backoff;
/// permanent failures surface on the first attempt.
fn with_retry<T>(op: impl Fn() -> Result<T, InventoryError>) -> Result<T, InventoryError> {
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < RETRY_ATTEMPTS => {
                log::debug!(
                    "transient inventory error, attempt {}/{}: {}",
                    attempt,
                    RETRY_ATTEMPTS,
                    error
                );
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Stable-id strings of the objects a create depends on.
fn dependencies(op: &crate::diff::CreateOp) -> Vec<&str> {
    let attr = |field: &str| op.attributes.get(field).and_then(serde_json::Value::as_str);
    match op.kind {
        ObjectKind::Device => Vec::new(),
        ObjectKind::Interface => attr(fields::DEVICE).into_iter().collect(),
        ObjectKind::Cable => [fields::ENDPOINT_A, fields::ENDPOINT_B]
            .into_iter()
            .filter_map(attr)
            .collect(),
    }
}

/// Apply the plan. Consumes it: a plan is single-use.
///
/// Returns `Ok` with a (possibly partial) result whenever execution
/// ran; hard errors are reserved for refusing to run at all (missing
/// approval token) or pre-apply infrastructure failure.
pub fn execute(
    resolved: ResolvedPlan,
    store: &dyn InventoryStore,
    state: &mut EngineState,
    options: &ExecuteOptions,
    cancel: &CancelToken,
) -> Result<ReconciliationResult, EngineError> {
    // Previews are always allowed; only a real apply needs the token.
    if !options.dry_run {
        if let Some(required) = &resolved.approval_token {
            if options.approval.as_deref() != Some(required.as_str()) {
                return Err(EngineError::ApprovalRequired);
            }
        }
    }

    let plan = resolved.plan;
    let mut result = ReconciliationResult { dry_run: options.dry_run, ..Default::default() };

    if options.dry_run {
        result.adopted = plan.adoptions.len();
        result.created = plan.creates.len();
        result.updated = plan.updates.len();
        result.orphaned = resolved.orphans.len();
        result.deleted = plan.deletes.len();
        return Ok(result);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .build()
        .map_err(|e| InventoryError::Permanent(format!("worker pool: {}", e)))?;

    // Adoptions first, so adopted objects are updatable in this run.
    for adopt in &plan.adoptions {
        match with_retry(|| {
            store.set_owner(&adopt.native_id, Some(&plan.spec_id), Some(&adopt.stable_id))
        }) {
            Ok(()) => {
                state.ownership.register(adopt.stable_id.clone(), adopt.native_id.clone());
                result.adopted += 1;
                log::info!("adopted {} '{}' as {}", adopt.kind, adopt.name, adopt.stable_id);
            }
            Err(error) => result.errors.push(ApplyFailure {
                kind: adopt.kind,
                name: adopt.name.clone(),
                message: error.to_string(),
            }),
        }
    }

    for stale in &plan.stale_mappings {
        state.ownership.release(stale);
    }

    // Creates, one batch per kind. Failed creates poison their
    // dependents in later batches.
    let mut failed_ids: BTreeSet<String> = BTreeSet::new();
    for kind in ObjectKind::CREATE_ORDER {
        if cancel.is_cancelled() {
            return Ok(finish_cancelled(result, &plan, &resolved.orphans, kind));
        }
        let batch: Vec<_> = plan.creates.iter().filter(|c| c.kind == kind).collect();
        if batch.is_empty() {
            continue;
        }

        let outcomes: Vec<(StableId, &str, Result<Option<String>, InventoryError>)> = pool
            .install(|| {
                batch
                    .par_iter()
                    .map(|op| {
                        if dependencies(op).iter().any(|d| failed_ids.contains(*d)) {
                            return (op.stable_id.clone(), op.name.as_str(), Ok(None));
                        }
                        let outcome = with_retry(|| {
                            store.create(op.kind, &op.attributes, &plan.spec_id, &op.stable_id)
                        });
                        (op.stable_id.clone(), op.name.as_str(), outcome.map(Some))
                    })
                    .collect()
            });

        for (stable_id, name, outcome) in outcomes {
            match outcome {
                Ok(Some(native_id)) => {
                    state.ownership.register(stable_id, native_id);
                    result.created += 1;
                }
                // Dependency failed earlier; never attempted.
                Ok(None) => {
                    log::warn!("skipping {} '{}': dependency failed", kind, name);
                    failed_ids.insert(stable_id.as_str().to_string());
                    result.skipped += 1;
                }
                Err(error) => {
                    log::error!("create {} '{}' failed: {}", kind, name, error);
                    failed_ids.insert(stable_id.as_str().to_string());
                    result.errors.push(ApplyFailure {
                        kind,
                        name: name.to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    // Updates.
    if cancel.is_cancelled() {
        return Ok(finish_cancelled_updates(result, &plan, &resolved.orphans));
    }
    let outcomes: Vec<(usize, Result<(), InventoryError>)> = pool.install(|| {
        plan.updates
            .par_iter()
            .enumerate()
            .map(|(i, op)| (i, with_retry(|| store.update(&op.native_id, &op.patch))))
            .collect()
    });
    for (i, outcome) in outcomes {
        let op = &plan.updates[i];
        match outcome {
            Ok(()) => result.updated += 1,
            Err(error) => {
                log::error!("update {} '{}' failed: {}", op.kind, op.name, error);
                result.errors.push(ApplyFailure {
                    kind: op.kind,
                    name: op.name.clone(),
                    message: error.to_string(),
                });
            }
        }
    }

    // Orphanings: strip ownership, keep the object.
    for orphan in &resolved.orphans {
        match with_retry(|| store.set_owner(&orphan.native_id, None, None)) {
            Ok(()) => {
                state.ownership.release(&orphan.stable_id);
                result.orphaned += 1;
                log::info!("orphaned {} '{}'", orphan.kind, orphan.name);
            }
            Err(error) => result.errors.push(ApplyFailure {
                kind: orphan.kind,
                name: orphan.name.clone(),
                message: error.to_string(),
            }),
        }
    }

    // Deletes, children before parents.
    for kind in ObjectKind::DELETE_ORDER {
        // Delete order runs from highest kind (cables) down, so the
        // remaining work at this point is every delete at or below it.
        if cancel.is_cancelled() {
            result.cancelled = true;
            result.skipped += plan.deletes.iter().filter(|d| d.kind <= kind).count();
            return Ok(result);
        }
        let batch: Vec<_> = plan.deletes.iter().filter(|d| d.kind == kind).collect();
        if batch.is_empty() {
            continue;
        }
        let outcomes: Vec<(usize, Result<(), InventoryError>)> = pool.install(|| {
            batch
                .par_iter()
                .enumerate()
                .map(|(i, op)| (i, with_retry(|| store.delete(&op.native_id))))
                .collect()
        });
        for (i, outcome) in outcomes {
            let op = batch[i];
            match outcome {
                Ok(()) => {
                    state.ownership.release(&op.stable_id);
                    result.deleted += 1;
                }
                Err(error) => {
                    log::error!("delete {} '{}' failed: {}", op.kind, op.name, error);
                    result.errors.push(ApplyFailure {
                        kind: op.kind,
                        name: op.name.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    // The snapshot advances only on a fully clean run.
    if result.is_success() {
        state.last_applied = Some(plan.graph);
        log::info!(
            "apply complete: {} created, {} updated, {} deleted, {} adopted, {} orphaned",
            result.created,
            result.updated,
            result.deleted,
            result.adopted,
            result.orphaned
        );
    } else {
        log::warn!(
            "apply incomplete: {} error(s), {} skipped; snapshot not advanced",
            result.errors.len(),
            result.skipped
        );
    }

    Ok(result)
}

/// Cancellation observed before a create batch: everything from that
/// kind onward counts as skipped.
fn finish_cancelled(
    mut result: ReconciliationResult,
    plan: &crate::diff::ReconciliationPlan,
    orphans: &[crate::conflict::OrphanOp],
    from_kind: ObjectKind,
) -> ReconciliationResult {
    result.cancelled = true;
    result.skipped += plan.creates.iter().filter(|c| c.kind >= from_kind).count();
    result.skipped += plan.updates.len() + orphans.len() + plan.deletes.len();
    result
}

fn finish_cancelled_updates(
    mut result: ReconciliationResult,
    plan: &crate::diff::ReconciliationPlan,
    orphans: &[crate::conflict::OrphanOp],
) -> ReconciliationResult {
    result.cancelled = true;
    result.skipped += plan.updates.len() + orphans.len() + plan.deletes.len();
    result
}
