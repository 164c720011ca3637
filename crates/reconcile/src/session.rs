//! Reconciliation sessions
//!
//! Per-session state machine, the per-spec single-writer lock, and the
//! cancellation token checked between per-kind batches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

/// Lifecycle of one reconciliation session.
///
/// Terminal states discard the plan; re-entry restarts at `Validated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Draft,
    Validated,
    Planned,
    PlanBlocked,
    PlanApproved,
    Applying,
    Applied,
    PartiallyApplied,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::PartiallyApplied | Self::Failed)
    }

    /// Legal successor states.
    fn successors(self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            Draft => &[Validated, Failed],
            Validated => &[Planned, Failed],
            Planned => &[PlanBlocked, PlanApproved, Failed],
            PlanBlocked => &[PlanApproved, Failed],
            PlanApproved => &[Applying, Failed],
            Applying => &[Applied, PartiallyApplied, Failed],
            // Terminal states only restart from validation.
            Applied | PartiallyApplied | Failed => &[Validated],
        }
    }

    pub fn can_transition(self, next: SessionState) -> bool {
        self.successors().contains(&next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Planned => "planned",
            Self::PlanBlocked => "plan-blocked",
            Self::PlanApproved => "plan-approved",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::PartiallyApplied => "partially-applied",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal session transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

/// One reconciliation session for one spec.
#[derive(Debug)]
pub struct Session {
    spec_id: String,
    state: SessionState,
}

impl Session {
    pub fn new(spec_id: impl Into<String>) -> Self {
        Self { spec_id: spec_id.into(), state: SessionState::Draft }
    }

    pub fn spec_id(&self) -> &str {
        &self.spec_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn advance(&mut self, to: SessionState) -> Result<(), TransitionError> {
        if !self.state.can_transition(to) {
            return Err(TransitionError { from: self.state, to });
        }
        log::debug!("session {}: {} -> {}", self.spec_id, self.state.as_str(), to.as_str());
        self.state = to;
        Ok(())
    }
}

/// Cooperative cancellation, observed between per-kind batches.
///
/// A cancelled plan-building run discards all partial state; a
/// cancelled apply stops before the next batch and reports the
/// remainder as skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Process-wide registry of per-spec locks.
///
/// Sessions for the same spec serialize on one mutex; sessions for
/// different specs never block each other. All mutation of persisted
/// engine state happens while the guard is held.
static SPEC_LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();

/// Fetch (or create) the lock for a spec id.
pub fn spec_lock(spec_id: &str) -> Arc<Mutex<()>> {
    let registry = SPEC_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    map.entry(spec_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}

/// Run `f` while holding the spec's single-writer lock.
pub fn with_spec_lock<T>(spec_id: &str, f: impl FnOnce() -> T) -> T {
    let lock = spec_lock(spec_id);
    let _guard = match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f()
}
