//! Stateful reconciliation engine for fabric topologies.
//!
//! Takes the pure desired-state graphs produced by the `fabric` crate
//! and converges an external inventory onto them: ownership tracking,
//! three-way diffing against the last-applied snapshot, conflict
//! resolution, batched plan execution with retries, and read-only
//! drift detection. The inventory itself stays behind the traits in
//! [`inventory`]; this crate never speaks a wire protocol.

pub mod conflict;
pub mod diff;
pub mod drift;
pub mod engine;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod memory;
pub mod ownership;
pub mod session;
pub mod state;

pub use conflict::{
    ConflictPolicy, OrphanOp, ResolveOptions, ResolvedPlan, approval_token, resolve,
};
pub use diff::{
    AdoptOp, ConflictRecord, ConflictResolution, CreateOp, DeleteOp, ReconciliationPlan,
    UpdateOp, diff,
};
pub use drift::{DriftReport, MissingObject, ModifiedField, OrphanedObject, detect};
pub use engine::{Backend, PlanOutcome, apply, drift, plan};
pub use error::EngineError;
pub use executor::{ApplyFailure, ExecuteOptions, ReconciliationResult, execute};
pub use inventory::{
    ActualObject, ExternalReferenceChecker, InventoryError, InventoryStore, StateObserver,
};
pub use memory::MemoryInventory;
pub use ownership::OwnershipMap;
pub use session::{CancelToken, Session, SessionState, TransitionError, with_spec_lock};
pub use state::EngineState;
