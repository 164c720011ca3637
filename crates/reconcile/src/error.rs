//! Engine error taxonomy
//!
//! Spec-level errors abort before any plan exists; conflict errors
//! demand an explicit decision; infrastructure errors split into
//! transient (retried with bounded backoff) and permanent (surfaced
//! immediately). There is never a partial plan.

use crate::inventory::InventoryError;
use crate::session::TransitionError;
use fabric::{CalculationError, GenerateError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Spec failed validation; all violations listed, never retried.
    #[error("spec validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// Topology infeasible for the given inputs.
    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    /// Conflict resolution refused to produce an executable plan.
    #[error("plan blocked: {}", .reasons.join("; "))]
    Blocked { reasons: Vec<String> },

    /// The plan carries more deletes than the approval threshold and no
    /// matching confirmation token was supplied.
    #[error("plan requires manual approval (token mismatch or missing)")]
    ApprovalRequired,

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Session(#[from] TransitionError),

    /// Cooperative cancellation observed; all partial state discarded.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<Vec<ValidationError>> for EngineError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }
}
