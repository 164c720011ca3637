//! Drift detection
//!
//! Read-only comparison of the inventory's actual state against the
//! last-applied snapshot. No spec, no desired graph, no writes - drift
//! answers "has the world moved since I last touched it", which is a
//! different question from the diff engine's "what should I change".

use crate::error::EngineError;
use crate::inventory::{ActualObject, StateObserver};
use crate::ownership::OwnershipMap;
use fabric::{DesiredStateGraph, ObjectKind, StableId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One managed field whose actual value moved off the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedField {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    pub name: String,
    pub field: String,
    pub applied: Value,
    pub actual: Value,
}

/// A mapped object the inventory no longer holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingObject {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    pub name: String,
    pub native_id: String,
}

/// An object tagged for this spec that the snapshot does not know -
/// somebody tagged it by hand, or state was lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanedObject {
    pub kind: ObjectKind,
    pub name: String,
    pub native_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// No apply has ever fully succeeded; nothing to compare against.
    pub never_applied: bool,
    pub modified: Vec<ModifiedField>,
    pub missing: Vec<MissingObject>,
    pub orphaned: Vec<OrphanedObject>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty() && self.missing.is_empty() && self.orphaned.is_empty()
    }

    pub fn total(&self) -> usize {
        self.modified.len() + self.missing.len() + self.orphaned.len()
    }
}

/// Compare actual state against the last-applied snapshot.
///
/// Only fields the snapshot manages are compared; a missing actual
/// value compares as JSON null, same as the diff engine.
pub fn detect(
    observer: &dyn StateObserver,
    spec_id: &str,
    last_applied: Option<&DesiredStateGraph>,
    ownership: &OwnershipMap,
) -> Result<DriftReport, EngineError> {
    let Some(snapshot) = last_applied else {
        log::info!("spec {} has never been applied; skipping drift detection", spec_id);
        return Ok(DriftReport { never_applied: true, ..DriftReport::default() });
    };

    let actual = observer.observe(spec_id)?;
    let by_native: std::collections::BTreeMap<&str, &ActualObject> =
        actual.iter().map(|o| (o.native_id.as_str(), o)).collect();

    let mut report = DriftReport::default();

    for object in snapshot.iter() {
        let Some(native_id) = ownership.resolve(&object.stable_id) else {
            continue;
        };
        let Some(found) = by_native.get(native_id) else {
            report.missing.push(MissingObject {
                stable_id: object.stable_id.clone(),
                kind: object.kind,
                name: object.name().to_string(),
                native_id: native_id.to_string(),
            });
            continue;
        };
        for field in &object.managed_fields {
            let applied = object.attributes.get(field).cloned().unwrap_or(Value::Null);
            let current = found.attributes.get(field).cloned().unwrap_or(Value::Null);
            if applied != current {
                report.modified.push(ModifiedField {
                    stable_id: object.stable_id.clone(),
                    kind: object.kind,
                    name: object.name().to_string(),
                    field: field.clone(),
                    applied,
                    actual: current,
                });
            }
        }
    }

    // Objects tagged for this spec without a corresponding mapping.
    for object in &actual {
        if object.owner_tag.as_deref() != Some(spec_id) {
            continue;
        }
        if ownership.resolve_reverse(&object.native_id).is_none() {
            report.orphaned.push(OrphanedObject {
                kind: object.kind,
                name: object.name().to_string(),
                native_id: object.native_id.clone(),
            });
        }
    }

    if report.is_clean() {
        log::info!("spec {}: no drift", spec_id);
    } else {
        log::warn!(
            "spec {}: {} modified field(s), {} missing, {} orphaned",
            spec_id,
            report.modified.len(),
            report.missing.len(),
            report.orphaned.len()
        );
    }
    Ok(report)
}
