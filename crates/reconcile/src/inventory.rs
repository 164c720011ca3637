//! External inventory interfaces
//!
//! The engine never talks a wire protocol itself; it consumes these
//! traits. Implementations decide transport, timeouts and storage -
//! the engine assumes only CRUD-by-native-id plus list-by-owner-tag
//! semantics.

use fabric::{ObjectKind, StableId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure talking to the inventory.
///
/// Transient failures (timeouts, rate limits) are retried with bounded
/// backoff by the executor; permanent ones (payload rejected, not
/// found) surface immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("transient inventory error: {0}")]
    Transient(String),
    #[error("permanent inventory error: {0}")]
    Permanent(String),
}

impl InventoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The inventory's view of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualObject {
    /// Assigned by the inventory on create; immutable, never reused.
    pub native_id: String,
    pub kind: ObjectKind,
    pub attributes: BTreeMap<String, Value>,
    /// Owner tag: which spec claims this object, if any.
    pub owner_tag: Option<String>,
    /// Stable identity recorded on the object at create/adopt time.
    pub owner_ref: Option<StableId>,
}

impl ActualObject {
    pub fn name(&self) -> &str {
        self.attributes.get("name").and_then(Value::as_str).unwrap_or("")
    }
}

/// CRUD over device/interface/cable-like resources.
pub trait InventoryStore: Send + Sync {
    /// Create an object tagged with the owning spec; returns the
    /// inventory-assigned native id.
    fn create(
        &self,
        kind: ObjectKind,
        attributes: &BTreeMap<String, Value>,
        owner_tag: &str,
        owner_ref: &StableId,
    ) -> Result<String, InventoryError>;

    /// Patch the given fields; attributes outside the patch are left
    /// untouched.
    fn update(
        &self,
        native_id: &str,
        patch: &BTreeMap<String, Value>,
    ) -> Result<(), InventoryError>;

    fn delete(&self, native_id: &str) -> Result<(), InventoryError>;

    /// Set or clear the ownership tag pair on an existing object
    /// (adoption and orphaning).
    fn set_owner(
        &self,
        native_id: &str,
        owner_tag: Option<&str>,
        owner_ref: Option<&StableId>,
    ) -> Result<(), InventoryError>;

    fn get(&self, native_id: &str) -> Result<Option<ActualObject>, InventoryError>;
}

/// Read-only view of current actual state for one spec.
///
/// Returns objects carrying the spec's owner tag plus untagged objects,
/// so the diff can offer adoption of externally-created objects sharing
/// a natural key instead of creating duplicates.
pub trait StateObserver: Send + Sync {
    fn observe(&self, spec_id: &str) -> Result<Vec<ActualObject>, InventoryError>;
}

/// Reports whether resources outside this engine's ownership reference
/// a native id. Consulted before every delete.
pub trait ExternalReferenceChecker: Send + Sync {
    fn is_referenced(&self, native_id: &str) -> Result<bool, InventoryError>;
}
