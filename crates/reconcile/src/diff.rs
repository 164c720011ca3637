//! Three-way diff
//!
//! Merges three views of the world into a reconciliation plan: the
//! freshly generated desired graph, the inventory's actual objects,
//! and the last-applied snapshot. The snapshot is what lets the diff
//! tell "a field this engine set and now wants to change" apart from
//! "a field somebody else changed under us" - the latter becomes a
//! conflict, never a silent overwrite.
//!
//! A field-level conflict exists when the actual value differs from
//! the desired value AND from the last-applied value: both sides moved
//! since the snapshot, so there is no safe automatic resolution.
//! Fields outside an object's `managed_fields` are never compared,
//! however much they diverge.

use crate::error::EngineError;
use crate::inventory::ActualObject;
use crate::ownership::OwnershipMap;
use crate::session::CancelToken;
use fabric::{DesiredStateGraph, ObjectKind, StableId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How a detected conflict was settled (filled in by the resolver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// External value kept; the field left this engine's ownership.
    PreservedExternal,
    /// Desired value force-applied over the external edit.
    ForcedDesired,
    /// Deletion downgraded: ownership stripped, object left in place.
    Orphaned,
    /// Force-delete overrode external references.
    ForcedDelete,
}

impl ConflictResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreservedExternal => "preserved-external",
            Self::ForcedDesired => "forced-desired",
            Self::Orphaned => "orphaned",
            Self::ForcedDelete => "forced-delete",
        }
    }
}

/// One field (or deletion) where the engine and an external actor
/// disagree, with the competing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    /// Field name, or `"(deletion)"` for delete conflicts.
    pub field: String,
    pub desired: Value,
    pub actual: Value,
    pub last_applied: Value,
    pub resolution: Option<ConflictResolution>,
}

pub const DELETION_FIELD: &str = "(deletion)";

/// Create a missing object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOp {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    pub name: String,
    pub attributes: BTreeMap<String, Value>,
}

/// Patch managed fields on an existing, mapped object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOp {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    pub native_id: String,
    pub name: String,
    /// Plain field updates: actual still equals last-applied, only the
    /// desired value moved.
    pub patch: BTreeMap<String, Value>,
    /// Manual-override conflicts awaiting a resolution decision.
    pub conflicts: Vec<ConflictRecord>,
}

impl UpdateOp {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty() && self.conflicts.is_empty()
    }
}

/// Remove a mapped object that the new graph no longer wants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOp {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    pub native_id: String,
    pub name: String,
}

/// Take ownership of an unmapped inventory object that matches a
/// desired object by owner-ref or natural key, instead of creating a
/// duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdoptOp {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    pub native_id: String,
    pub name: String,
}

/// The ordered change plan. Single-use: consumed by the executor.
///
/// Ordering is fixed: creates in dependency order (devices,
/// interfaces, cables), then updates, then deletes in reverse
/// dependency order - so referenced objects always exist before their
/// referrers during apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub spec_id: String,
    pub adoptions: Vec<AdoptOp>,
    pub creates: Vec<CreateOp>,
    pub updates: Vec<UpdateOp>,
    pub deletes: Vec<DeleteOp>,
    /// Mappings whose objects vanished from the inventory entirely;
    /// the executor just drops the entries.
    pub stale_mappings: Vec<StableId>,
    pub unchanged_count: usize,
    /// The graph this plan converges to; becomes the snapshot on full
    /// success. The resolver edits `managed_fields` here when a
    /// conflict releases a field.
    pub graph: DesiredStateGraph,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.adoptions.is_empty()
            && self.creates.is_empty()
            && self.updates.is_empty()
            && self.deletes.is_empty()
            && self.stale_mappings.is_empty()
    }

    pub fn conflict_count(&self) -> usize {
        self.updates.iter().map(|u| u.conflicts.len()).sum()
    }
}

/// Compute the reconciliation plan for one spec.
///
/// Pure with respect to its inputs; mutates nothing. The cancel token
/// is checked between per-kind passes - a cancelled run returns
/// [`EngineError::Cancelled`] and no partial plan escapes.
pub fn diff(
    desired: DesiredStateGraph,
    actual: &[ActualObject],
    last_applied: Option<&DesiredStateGraph>,
    ownership: &OwnershipMap,
    cancel: &CancelToken,
) -> Result<ReconciliationPlan, EngineError> {
    let by_native: BTreeMap<&str, &ActualObject> =
        actual.iter().map(|o| (o.native_id.as_str(), o)).collect();

    // Unmapped actuals are adoption candidates, indexed two ways:
    // by the owner-ref they already carry, and by natural key.
    let mut unmapped_by_ref: BTreeMap<&StableId, &ActualObject> = BTreeMap::new();
    let mut unmapped_by_key: BTreeMap<(ObjectKind, &str), &ActualObject> = BTreeMap::new();
    for object in actual {
        if ownership.resolve_reverse(&object.native_id).is_some() {
            continue;
        }
        if let Some(owner_ref) = &object.owner_ref {
            unmapped_by_ref.entry(owner_ref).or_insert(object);
        } else if !object.name().is_empty() {
            unmapped_by_key.entry((object.kind, object.name())).or_insert(object);
        }
    }

    let mut plan = ReconciliationPlan {
        spec_id: desired.spec_id.clone(),
        adoptions: Vec::new(),
        creates: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
        stale_mappings: Vec::new(),
        unchanged_count: 0,
        graph: desired,
    };

    for kind in ObjectKind::CREATE_ORDER {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        for object in plan.graph.objects_of(kind) {
            let mapped = ownership.resolve(&object.stable_id);
            let existing = match mapped {
                Some(native_id) => match by_native.get(native_id) {
                    Some(actual) => Some((native_id.to_string(), *actual, false)),
                    // Mapped but gone from the inventory: recreate.
                    None => None,
                },
                None => {
                    let candidate = unmapped_by_ref
                        .get(&object.stable_id)
                        .copied()
                        .or_else(|| {
                            unmapped_by_key.get(&(object.kind, object.name())).copied()
                        });
                    candidate.map(|actual| (actual.native_id.clone(), actual, true))
                }
            };

            match existing {
                None => {
                    plan.creates.push(CreateOp {
                        stable_id: object.stable_id.clone(),
                        kind: object.kind,
                        name: object.name().to_string(),
                        attributes: object.attributes.clone(),
                    });
                }
                Some((native_id, actual, adopt)) => {
                    if adopt {
                        plan.adoptions.push(AdoptOp {
                            stable_id: object.stable_id.clone(),
                            kind: object.kind,
                            native_id: native_id.clone(),
                            name: object.name().to_string(),
                        });
                    }
                    let update = compare_managed_fields(
                        object,
                        actual,
                        native_id,
                        last_applied.and_then(|g| g.find(&object.stable_id)),
                    );
                    if update.is_empty() {
                        plan.unchanged_count += 1;
                    } else {
                        plan.updates.push(update);
                    }
                }
            }
        }
    }

    // Mapped objects the new graph no longer contains become delete
    // candidates, in reverse dependency order.
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    let mut delete_buckets: BTreeMap<ObjectKind, Vec<DeleteOp>> = BTreeMap::new();
    for (stable_id, native_id) in ownership.iter() {
        if plan.graph.find(stable_id).is_some() {
            continue;
        }
        match by_native.get(native_id) {
            Some(actual) => {
                delete_buckets.entry(actual.kind).or_default().push(DeleteOp {
                    stable_id: stable_id.clone(),
                    kind: actual.kind,
                    native_id: native_id.to_string(),
                    name: actual.name().to_string(),
                });
            }
            // Already gone; just forget the mapping.
            None => plan.stale_mappings.push(stable_id.clone()),
        }
    }
    for kind in ObjectKind::DELETE_ORDER {
        if let Some(mut bucket) = delete_buckets.remove(&kind) {
            bucket.sort_by(|a, b| a.name.cmp(&b.name));
            plan.deletes.extend(bucket);
        }
    }

    Ok(plan)
}

/// Field-by-field comparison over exactly the managed set.
fn compare_managed_fields(
    object: &fabric::DesiredObject,
    actual: &ActualObject,
    native_id: String,
    last: Option<&fabric::DesiredObject>,
) -> UpdateOp {
    let mut update = UpdateOp {
        stable_id: object.stable_id.clone(),
        kind: object.kind,
        native_id,
        name: object.name().to_string(),
        patch: BTreeMap::new(),
        conflicts: Vec::new(),
    };

    for field in &object.managed_fields {
        // A field the snapshot carries a value for but does not manage
        // was released to an external owner by an earlier conflict
        // resolution; the generator recomputes it every run, so the
        // release must be honored here or the next apply would claw the
        // field back.
        if let Some(last) = last {
            if !last.managed_fields.contains(field) && last.attributes.contains_key(field) {
                continue;
            }
        }
        let desired_value = object.attributes.get(field).cloned().unwrap_or(Value::Null);
        let actual_value = actual.attributes.get(field).cloned().unwrap_or(Value::Null);
        if desired_value == actual_value {
            continue;
        }

        let last_value = last
            .filter(|l| l.managed_fields.contains(field))
            .and_then(|l| l.attributes.get(field))
            .cloned();

        match last_value {
            // Both the actual and the desired value moved away from
            // what this engine last set: manual override.
            Some(last_value) if actual_value != last_value => {
                update.conflicts.push(ConflictRecord {
                    stable_id: object.stable_id.clone(),
                    kind: object.kind,
                    field: field.clone(),
                    desired: desired_value,
                    actual: actual_value,
                    last_applied: last_value,
                    resolution: None,
                });
            }
            // Only this engine ever set the field (or there is no
            // snapshot yet, e.g. first run / adoption): plain update.
            _ => {
                update.patch.insert(field.clone(), desired_value);
            }
        }
    }

    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryInventory;
    use fabric::{
        FabricSpec, LeafClassSpec, RedundancyPolicy, ServerClassSpec, SpineClassSpec,
        ValidatedSpec, calculate, generate, validate,
    };
    use serde_json::json;

    fn spec(units: u32) -> ValidatedSpec {
        validate(FabricSpec {
            id: "fab1".to_string(),
            name_template: "{fabric}-{role}-{index}".to_string(),
            index_width: 2,
            redundancy: RedundancyPolicy::SingleHomed,
            server_classes: vec![ServerClassSpec { name: "web".to_string(), count: units }],
            leaf: LeafClassSpec {
                model: "leaf-48".to_string(),
                port_count: 48,
                port_speed_gbps: 100,
                downlink_speed_gbps: 25,
                units_per_leaf: 8,
            },
            spine: SpineClassSpec {
                model: "spine-32".to_string(),
                port_count: 32,
                port_speed_gbps: 100,
            },
            uplinks_per_leaf: None,
            breakout_override: None,
        })
        .unwrap()
    }

    fn graph(units: u32) -> DesiredStateGraph {
        let spec = spec(units);
        generate(&spec, &calculate(&spec).unwrap()).unwrap()
    }

    /// Apply a graph to a fresh inventory, returning the populated
    /// ownership map.
    fn seed_inventory(graph: &DesiredStateGraph, inventory: &MemoryInventory) -> OwnershipMap {
        use crate::inventory::InventoryStore;
        let mut ownership = OwnershipMap::new();
        for object in graph.iter() {
            let native = inventory
                .create(object.kind, &object.attributes, &graph.spec_id, &object.stable_id)
                .unwrap();
            ownership.register(object.stable_id.clone(), native);
        }
        ownership
    }

    #[test]
    fn empty_inventory_yields_all_creates_in_dependency_order() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);
        let total = g.len();
        let plan = diff(
            g,
            &inventory.observe("fab1").unwrap(),
            None,
            &OwnershipMap::new(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(plan.creates.len(), total);
        assert!(plan.updates.is_empty());
        assert!(plan.deletes.is_empty());

        // Devices strictly before interfaces, interfaces before cables.
        let ranks: Vec<u8> = plan
            .creates
            .iter()
            .map(|c| match c.kind {
                ObjectKind::Device => 0,
                ObjectKind::Interface => 1,
                ObjectKind::Cable => 2,
            })
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn converged_inventory_yields_empty_plan() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);
        let ownership = seed_inventory(&g, &inventory);

        let plan = diff(
            g.clone(),
            &inventory.observe("fab1").unwrap(),
            Some(&g),
            &ownership,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(plan.is_empty(), "expected empty plan, got {:?}", plan);
        assert_eq!(plan.unchanged_count, g.len());
    }

    #[test]
    fn engine_owned_change_is_plain_update() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let old = graph(8);
        let ownership = seed_inventory(&old, &inventory);

        // New desired graph with a different template: names move, but
        // the actual still matches the snapshot.
        let mut raw = spec(8).into_inner();
        raw.name_template = "{role}-{index}.{fabric}".to_string();
        let renamed = validate(raw).unwrap();
        let new = generate(&renamed, &calculate(&renamed).unwrap()).unwrap();

        let plan = diff(
            new,
            &inventory.observe("fab1").unwrap(),
            Some(&old),
            &ownership,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(plan.creates.is_empty());
        assert!(plan.deletes.is_empty());
        // Only devices use the template; each update patches name only.
        assert_eq!(plan.updates.len(), old.devices.len());
        for update in &plan.updates {
            assert_eq!(update.kind, ObjectKind::Device);
            assert_eq!(update.patch.keys().collect::<Vec<_>>(), vec!["name"]);
            assert!(update.conflicts.is_empty());
        }
    }

    #[test]
    fn external_edit_to_managed_field_is_conflict_not_update() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);
        let ownership = seed_inventory(&g, &inventory);

        // Someone renames a device by hand.
        let device = &g.devices[0];
        let native = ownership.resolve(&device.stable_id).unwrap().to_string();
        inventory.tamper(&native, "name", json!("hand-edited"));

        let plan = diff(
            g.clone(),
            &inventory.observe("fab1").unwrap(),
            Some(&g),
            &ownership,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(plan.updates.len(), 1);
        let update = &plan.updates[0];
        assert!(update.patch.is_empty());
        assert_eq!(update.conflicts.len(), 1);
        let conflict = &update.conflicts[0];
        assert_eq!(conflict.field, "name");
        assert_eq!(conflict.actual, json!("hand-edited"));
        assert_eq!(conflict.resolution, None);
    }

    #[test]
    fn unmanaged_fields_are_never_compared() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);
        let ownership = seed_inventory(&g, &inventory);

        // A free-text field the generator never computed.
        let native = ownership.resolve(&g.devices[0].stable_id).unwrap().to_string();
        inventory.tamper(&native, "description", json!("rack B3, replaced PSU"));

        let plan = diff(
            g.clone(),
            &inventory.observe("fab1").unwrap(),
            Some(&g),
            &ownership,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(plan.is_empty());
    }

    #[test]
    fn released_field_stays_released_across_runs() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);
        let ownership = seed_inventory(&g, &inventory);

        // Snapshot where an earlier resolution released "name" on one
        // device, and the inventory still holds the external value.
        let device = g.devices[0].clone();
        let mut snapshot = g.clone();
        snapshot.find_mut(&device.stable_id).unwrap().managed_fields.remove("name");
        let native = ownership.resolve(&device.stable_id).unwrap().to_string();
        inventory.tamper(&native, "name", json!("hand-edited"));

        let plan = diff(
            g,
            &inventory.observe("fab1").unwrap(),
            Some(&snapshot),
            &ownership,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(plan.is_empty(), "released field must not be clawed back");
    }

    #[test]
    fn removed_objects_become_deletes_in_reverse_order() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let big = graph(24);
        let ownership = seed_inventory(&big, &inventory);

        let small = graph(16);
        let plan = diff(
            small,
            &inventory.observe("fab1").unwrap(),
            Some(&big),
            &ownership,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(!plan.deletes.is_empty());
        let ranks: Vec<u8> = plan
            .deletes
            .iter()
            .map(|d| match d.kind {
                ObjectKind::Cable => 0,
                ObjectKind::Interface => 1,
                ObjectKind::Device => 2,
            })
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        assert_eq!(ranks, sorted, "deletes must run cables, interfaces, devices");
    }

    #[test]
    fn unmapped_object_with_matching_natural_key_is_adopted() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);

        // Externally-created device with the same name as a desired one.
        let device = &g.devices[0];
        inventory.seed(ActualObject {
            native_id: "ext-42".to_string(),
            kind: ObjectKind::Device,
            attributes: device.attributes.clone(),
            owner_tag: None,
            owner_ref: None,
        });

        let plan = diff(
            g.clone(),
            &inventory.observe("fab1").unwrap(),
            None,
            &OwnershipMap::new(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(plan.adoptions.len(), 1);
        assert_eq!(plan.adoptions[0].native_id, "ext-42");
        // Adopted, so not created again.
        assert_eq!(plan.creates.len(), g.len() - 1);
    }

    #[test]
    fn mapped_but_vanished_object_is_recreated_and_mapping_marked_stale() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);
        let ownership = seed_inventory(&g, &inventory);

        let device = &g.devices[0];
        let native = ownership.resolve(&device.stable_id).unwrap().to_string();
        inventory.remove(&native);

        let plan = diff(
            g.clone(),
            &inventory.observe("fab1").unwrap(),
            Some(&g),
            &ownership,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].stable_id, device.stable_id);
    }

    #[test]
    fn cancellation_discards_the_run() {
        use crate::inventory::StateObserver;
        let inventory = MemoryInventory::new();
        let g = graph(8);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = diff(
            g,
            &inventory.observe("fab1").unwrap(),
            None,
            &OwnershipMap::new(),
            &cancel,
        );
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
