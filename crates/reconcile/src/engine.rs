//! Reconciliation pipeline
//!
//! The facade callers actually drive: validate, calculate, generate,
//! observe, diff, resolve into a plan; then execute that plan. Each
//! step advances the session state machine, and everything that reads
//! or mutates persisted state for a spec runs under that spec's lock.

use crate::conflict::{ResolveOptions, ResolvedPlan, resolve};
use crate::diff::diff;
use crate::drift::{DriftReport, detect};
use crate::error::EngineError;
use crate::executor::{ExecuteOptions, ReconciliationResult, execute};
use crate::inventory::{ExternalReferenceChecker, InventoryStore, StateObserver};
use crate::session::{CancelToken, Session, SessionState, with_spec_lock};
use crate::state::EngineState;
use fabric::{FabricSpec, TopologyPlan, calculate, generate, validate};

/// The three inventory-side collaborators, usually one object.
pub struct Backend<'a> {
    pub store: &'a dyn InventoryStore,
    pub observer: &'a dyn StateObserver,
    pub refs: &'a dyn ExternalReferenceChecker,
}

impl<'a> Backend<'a> {
    /// Borrow all three roles from a single implementation.
    pub fn of<T>(backend: &'a T) -> Self
    where
        T: InventoryStore + StateObserver + ExternalReferenceChecker,
    {
        Self { store: backend, observer: backend, refs: backend }
    }
}

/// Everything the planning half produced; feed it to [`apply`].
#[derive(Debug)]
pub struct PlanOutcome {
    pub session: Session,
    pub topology: TopologyPlan,
    pub resolved: ResolvedPlan,
}

impl PlanOutcome {
    pub fn requires_approval(&self) -> bool {
        self.resolved.requires_approval()
    }
}

/// Run the planning pipeline for one spec.
///
/// Reads state but never writes it; safe to run concurrently with
/// other specs. Conflict policy `Fail` surfaces as
/// [`EngineError::Blocked`] with the session left in `Failed`.
pub fn plan(
    backend: &Backend<'_>,
    spec: FabricSpec,
    state: &EngineState,
    options: &ResolveOptions,
    cancel: &CancelToken,
) -> Result<PlanOutcome, EngineError> {
    let spec_id = spec.id.clone();
    with_spec_lock(&spec_id, || {
        let mut session = Session::new(&spec_id);

        let validated = validate(spec)?;
        session.advance(SessionState::Validated)?;

        let topology = calculate(&validated)?;
        for warning in &topology.warnings {
            log::warn!("{}: {}", spec_id, warning);
        }
        let desired = generate(&validated, &topology)?;

        let actual = backend.observer.observe(&spec_id)?;
        let raw = diff(desired, &actual, state.last_applied.as_ref(), &state.ownership, cancel)?;
        let resolved = match resolve(raw, backend.refs, options) {
            Ok(resolved) => resolved,
            Err(error) => {
                session.advance(SessionState::Failed)?;
                return Err(error);
            }
        };
        session.advance(SessionState::Planned)?;

        if resolved.requires_approval() {
            session.advance(SessionState::PlanBlocked)?;
        } else {
            session.advance(SessionState::PlanApproved)?;
        }

        Ok(PlanOutcome { session, topology, resolved })
    })
}

/// Execute a planned outcome. Consumes the plan; re-plan to retry.
pub fn apply(
    backend: &Backend<'_>,
    outcome: PlanOutcome,
    state: &mut EngineState,
    options: &ExecuteOptions,
    cancel: &CancelToken,
) -> Result<(ReconciliationResult, Session), EngineError> {
    let PlanOutcome { mut session, resolved, .. } = outcome;
    let spec_id = session.spec_id().to_string();
    with_spec_lock(&spec_id, || {
        if session.state() == SessionState::PlanBlocked {
            if options.approval.is_none() && !options.dry_run {
                return Err(EngineError::ApprovalRequired);
            }
            session.advance(SessionState::PlanApproved)?;
        }
        if options.dry_run {
            // Preview leaves the session where planning put it.
            let result = execute(resolved, backend.store, state, options, cancel)?;
            return Ok((result, session));
        }

        session.advance(SessionState::Applying)?;
        let result = match execute(resolved, backend.store, state, options, cancel) {
            Ok(result) => result,
            Err(error) => {
                session.advance(SessionState::Failed)?;
                return Err(error);
            }
        };
        let terminal = if result.is_success() {
            SessionState::Applied
        } else if result.total_changes() > 0 {
            SessionState::PartiallyApplied
        } else {
            SessionState::Failed
        };
        session.advance(terminal)?;
        Ok((result, session))
    })
}

/// Read-only drift check for one spec.
pub fn drift(
    backend: &Backend<'_>,
    spec_id: &str,
    state: &EngineState,
) -> Result<DriftReport, EngineError> {
    detect(backend.observer, spec_id, state.last_applied.as_ref(), &state.ownership)
}
