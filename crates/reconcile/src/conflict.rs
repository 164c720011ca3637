//! Conflict resolution
//!
//! Turns a raw diff into an executable plan by settling every
//! manual-override conflict under a policy, downgrading externally
//! referenced deletes to orphanings, and gating large delete sets
//! behind an approval token. The resolver never talks to the store's
//! write side; its only I/O is the reference check.

use crate::diff::{
    ConflictRecord, ConflictResolution, DELETION_FIELD, DeleteOp, ReconciliationPlan,
};
use crate::error::EngineError;
use crate::inventory::ExternalReferenceChecker;
use serde::{Deserialize, Serialize};

/// What to do when a managed field was edited externally since the
/// last apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Keep the external value and stop managing the field. The field
    /// leaves `managed_fields` in the snapshot, so later runs ignore it.
    #[default]
    PreserveExternal,
    /// Reassert the desired value over the external edit.
    ForceDesired,
    /// Refuse to produce a plan while any conflict exists.
    Fail,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreserveExternal => "preserve-external",
            Self::ForceDesired => "force-desired",
            Self::Fail => "fail",
        }
    }
}

/// Resolver knobs, sourced from config and CLI flags.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub policy: ConflictPolicy,
    /// Delete even externally referenced objects instead of orphaning.
    pub force_delete: bool,
    /// Plans deleting more than this many objects need approval.
    pub max_deletes: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { policy: ConflictPolicy::default(), force_delete: false, max_deletes: 10 }
    }
}

/// Strip ownership instead of deleting; the object stays in the
/// inventory, untagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanOp {
    pub stable_id: fabric::StableId,
    pub kind: fabric::ObjectKind,
    pub native_id: String,
    pub name: String,
}

/// A diff with every conflict settled, ready for the executor.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    pub plan: ReconciliationPlan,
    pub orphans: Vec<OrphanOp>,
    /// Every conflict the resolver settled, with its resolution filled
    /// in, for preview output and the audit trail.
    pub resolutions: Vec<ConflictRecord>,
    /// Present when the delete set exceeds the threshold; apply
    /// requires the caller to echo this token back.
    pub approval_token: Option<String>,
}

impl ResolvedPlan {
    pub fn requires_approval(&self) -> bool {
        self.approval_token.is_some()
    }
}

/// Deterministic token over the exact delete set. A plan with a
/// different delete list produces a different token, so stale
/// approvals cannot authorize a newer plan.
pub fn approval_token(deletes: &[DeleteOp]) -> String {
    let mut hasher = blake3::Hasher::new();
    for op in deletes {
        hasher.update(op.stable_id.as_str().as_bytes());
        hasher.update(&[0]);
    }
    let hash = hasher.finalize();
    let mut out = String::with_capacity(16);
    for byte in &hash.as_bytes()[..8] {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Settle every conflict and delete candidate in `plan`.
///
/// Fails with [`EngineError::Blocked`] under the `Fail` policy when any
/// field conflict exists; infrastructure errors from the reference
/// checker pass through.
pub fn resolve(
    mut plan: ReconciliationPlan,
    refs: &dyn ExternalReferenceChecker,
    options: &ResolveOptions,
) -> Result<ResolvedPlan, EngineError> {
    let mut resolutions = Vec::new();

    if options.policy == ConflictPolicy::Fail {
        let reasons: Vec<String> = plan
            .updates
            .iter()
            .flat_map(|u| &u.conflicts)
            .map(|c| {
                format!(
                    "{} {}: field '{}' changed externally ({} -> {})",
                    c.kind,
                    conflict_object_name(&plan, c),
                    c.field,
                    c.last_applied,
                    c.actual
                )
            })
            .collect();
        if !reasons.is_empty() {
            return Err(EngineError::Blocked { reasons });
        }
    }

    // Field conflicts. Fail either returned above or has none left to
    // settle, so only the two resolving policies run this loop.
    if options.policy != ConflictPolicy::Fail {
        for update in &mut plan.updates {
            for mut conflict in update.conflicts.drain(..) {
                if options.policy == ConflictPolicy::PreserveExternal {
                    conflict.resolution = Some(ConflictResolution::PreservedExternal);
                    // Stop managing the field from here on. The
                    // attribute value stays for display; only the
                    // managed set shrinks.
                    if let Some(object) = plan.graph.find_mut(&conflict.stable_id) {
                        object.managed_fields.remove(&conflict.field);
                    }
                    log::info!(
                        "preserving external value for {} field '{}'",
                        update.name,
                        conflict.field
                    );
                } else {
                    conflict.resolution = Some(ConflictResolution::ForcedDesired);
                    update.patch.insert(conflict.field.clone(), conflict.desired.clone());
                    log::warn!(
                        "forcing desired value onto {} field '{}' over external edit",
                        update.name,
                        conflict.field
                    );
                }
                resolutions.push(conflict);
            }
        }
    }
    // Preserve-external can leave updates with nothing left to do.
    plan.updates.retain(|u| !u.is_empty());

    // Delete candidates: externally referenced objects are orphaned,
    // not deleted, unless force_delete overrides.
    let mut orphans = Vec::new();
    let mut kept = Vec::with_capacity(plan.deletes.len());
    for op in plan.deletes.drain(..) {
        if refs.is_referenced(&op.native_id)? {
            let mut record = ConflictRecord {
                stable_id: op.stable_id.clone(),
                kind: op.kind,
                field: DELETION_FIELD.to_string(),
                desired: serde_json::Value::Null,
                actual: serde_json::json!(op.name),
                last_applied: serde_json::Value::Null,
                resolution: None,
            };
            if options.force_delete {
                record.resolution = Some(ConflictResolution::ForcedDelete);
                log::warn!("force-deleting externally referenced {} '{}'", op.kind, op.name);
                resolutions.push(record);
                kept.push(op);
            } else {
                record.resolution = Some(ConflictResolution::Orphaned);
                log::info!("orphaning externally referenced {} '{}'", op.kind, op.name);
                resolutions.push(record);
                orphans.push(OrphanOp {
                    stable_id: op.stable_id,
                    kind: op.kind,
                    native_id: op.native_id,
                    name: op.name,
                });
            }
        } else {
            kept.push(op);
        }
    }
    plan.deletes = kept;

    let token = (plan.deletes.len() > options.max_deletes)
        .then(|| approval_token(&plan.deletes));
    if let Some(token) = &token {
        log::warn!(
            "plan deletes {} objects (threshold {}); approval token {}",
            plan.deletes.len(),
            options.max_deletes,
            token
        );
    }

    Ok(ResolvedPlan { plan, orphans, resolutions, approval_token: token })
}

/// Best-effort object name for a blocked-plan reason line.
fn conflict_object_name<'a>(plan: &'a ReconciliationPlan, conflict: &ConflictRecord) -> &'a str {
    plan.updates
        .iter()
        .find(|u| u.stable_id == conflict.stable_id)
        .map(|u| u.name.as_str())
        .unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::UpdateOp;
    use crate::memory::MemoryInventory;
    use fabric::{DesiredObject, DesiredStateGraph, ObjectKind, StableId};
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};

    fn sid(n: u32) -> StableId {
        StableId::from_raw(format!("stable-{:04}", n))
    }

    fn conflicted_plan() -> ReconciliationPlan {
        let mut graph = DesiredStateGraph::new("fab1");
        graph.devices.push(DesiredObject {
            stable_id: sid(1),
            kind: ObjectKind::Device,
            position: "leaf/1".to_string(),
            attributes: BTreeMap::from([("name".to_string(), json!("leaf-01"))]),
            managed_fields: BTreeSet::from(["name".to_string()]),
        });
        ReconciliationPlan {
            spec_id: "fab1".to_string(),
            adoptions: vec![],
            creates: vec![],
            updates: vec![UpdateOp {
                stable_id: sid(1),
                kind: ObjectKind::Device,
                native_id: "inv-000001".to_string(),
                name: "leaf-01".to_string(),
                patch: BTreeMap::new(),
                conflicts: vec![ConflictRecord {
                    stable_id: sid(1),
                    kind: ObjectKind::Device,
                    field: "name".to_string(),
                    desired: json!("leaf-01"),
                    actual: json!("hand-edited"),
                    last_applied: json!("old-name"),
                    resolution: None,
                }],
            }],
            deletes: vec![],
            stale_mappings: vec![],
            unchanged_count: 0,
            graph,
        }
    }

    fn delete_plan(count: u32) -> ReconciliationPlan {
        ReconciliationPlan {
            spec_id: "fab1".to_string(),
            adoptions: vec![],
            creates: vec![],
            updates: vec![],
            deletes: (1..=count)
                .map(|n| DeleteOp {
                    stable_id: sid(n),
                    kind: ObjectKind::Cable,
                    native_id: format!("inv-{:06}", n),
                    name: format!("cable-{}", n),
                })
                .collect(),
            stale_mappings: vec![],
            unchanged_count: 0,
            graph: DesiredStateGraph::new("fab1"),
        }
    }

    #[test]
    fn preserve_external_releases_the_field() {
        let refs = MemoryInventory::new();
        let resolved =
            resolve(conflicted_plan(), &refs, &ResolveOptions::default()).unwrap();

        // No write remains and the field left management.
        assert!(resolved.plan.updates.is_empty());
        let object = resolved.plan.graph.find(&sid(1)).unwrap();
        assert!(!object.managed_fields.contains("name"));
        assert_eq!(
            resolved.resolutions[0].resolution,
            Some(ConflictResolution::PreservedExternal)
        );
    }

    #[test]
    fn force_desired_turns_conflict_into_patch() {
        let refs = MemoryInventory::new();
        let options =
            ResolveOptions { policy: ConflictPolicy::ForceDesired, ..ResolveOptions::default() };
        let resolved = resolve(conflicted_plan(), &refs, &options).unwrap();

        assert_eq!(resolved.plan.updates.len(), 1);
        assert_eq!(resolved.plan.updates[0].patch["name"], json!("leaf-01"));
        // Field stays managed.
        let object = resolved.plan.graph.find(&sid(1)).unwrap();
        assert!(object.managed_fields.contains("name"));
    }

    #[test]
    fn fail_policy_blocks_with_reasons() {
        let refs = MemoryInventory::new();
        let options =
            ResolveOptions { policy: ConflictPolicy::Fail, ..ResolveOptions::default() };
        let err = resolve(conflicted_plan(), &refs, &options).unwrap_err();
        match err {
            EngineError::Blocked { reasons } => {
                assert_eq!(reasons.len(), 1);
                assert!(reasons[0].contains("name"), "{}", reasons[0]);
            }
            other => panic!("expected Blocked, got {:?}", other),
        }
    }

    #[test]
    fn referenced_delete_becomes_orphan() {
        let refs = MemoryInventory::new();
        refs.add_external_ref("inv-000001");
        let resolved = resolve(delete_plan(2), &refs, &ResolveOptions::default()).unwrap();

        assert_eq!(resolved.plan.deletes.len(), 1);
        assert_eq!(resolved.orphans.len(), 1);
        assert_eq!(resolved.orphans[0].native_id, "inv-000001");
        assert_eq!(
            resolved.resolutions[0].resolution,
            Some(ConflictResolution::Orphaned)
        );
    }

    #[test]
    fn force_delete_overrides_external_reference() {
        let refs = MemoryInventory::new();
        refs.add_external_ref("inv-000001");
        let options = ResolveOptions { force_delete: true, ..ResolveOptions::default() };
        let resolved = resolve(delete_plan(2), &refs, &options).unwrap();

        assert_eq!(resolved.plan.deletes.len(), 2);
        assert!(resolved.orphans.is_empty());
        assert_eq!(
            resolved.resolutions[0].resolution,
            Some(ConflictResolution::ForcedDelete)
        );
    }

    #[test]
    fn large_delete_set_requires_approval() {
        let refs = MemoryInventory::new();
        let resolved = resolve(delete_plan(11), &refs, &ResolveOptions::default()).unwrap();
        assert!(resolved.requires_approval());

        // At the threshold: no approval needed.
        let resolved = resolve(delete_plan(10), &refs, &ResolveOptions::default()).unwrap();
        assert!(!resolved.requires_approval());
    }

    #[test]
    fn approval_token_is_tied_to_the_delete_set() {
        let a = approval_token(&delete_plan(11).deletes);
        let b = approval_token(&delete_plan(11).deletes);
        let c = approval_token(&delete_plan(12).deletes);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
