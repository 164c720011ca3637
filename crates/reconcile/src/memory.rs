//! In-memory inventory
//!
//! Reference implementation of the inventory traits. Used throughout
//! the test suite and handy for dry exercising the full pipeline
//! without an external system. Not a production backend.

use crate::inventory::{
    ActualObject, ExternalReferenceChecker, InventoryError, InventoryStore, StateObserver,
};
use fabric::{ObjectKind, StableId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, ActualObject>,
    /// Native ids referenced by objects outside any spec's ownership.
    external_refs: BTreeMap<String, u32>,
}

/// Thread-safe in-memory inventory store.
#[derive(Default)]
pub struct MemoryInventory {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    /// When set, the next N store calls fail transiently (for retry
    /// tests).
    fail_next: AtomicU64,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Make the next `n` store calls fail with a transient error.
    pub fn fail_next_calls(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Register an external (non-engine) reference to a native id.
    pub fn add_external_ref(&self, native_id: &str) {
        *self.lock().external_refs.entry(native_id.to_string()).or_insert(0) += 1;
    }

    /// Insert an object directly, bypassing the engine - simulates an
    /// external actor or pre-existing inventory content.
    pub fn seed(&self, object: ActualObject) {
        self.lock().objects.insert(object.native_id.clone(), object);
    }

    /// Mutate one attribute directly - simulates a manual edit.
    pub fn tamper(&self, native_id: &str, field: &str, value: Value) {
        if let Some(object) = self.lock().objects.get_mut(native_id) {
            object.attributes.insert(field.to_string(), value);
        }
    }

    pub fn remove(&self, native_id: &str) {
        self.lock().objects.remove(native_id);
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn all(&self) -> Vec<ActualObject> {
        self.lock().objects.values().cloned().collect()
    }

    fn allocate_id(&self) -> String {
        format!("inv-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl InventoryStore for MemoryInventory {
    fn create(
        &self,
        kind: ObjectKind,
        attributes: &BTreeMap<String, Value>,
        owner_tag: &str,
        owner_ref: &StableId,
    ) -> Result<String, InventoryError> {
        if self.take_failure() {
            return Err(InventoryError::Transient("injected failure".to_string()));
        }
        let native_id = self.allocate_id();
        self.lock().objects.insert(
            native_id.clone(),
            ActualObject {
                native_id: native_id.clone(),
                kind,
                attributes: attributes.clone(),
                owner_tag: Some(owner_tag.to_string()),
                owner_ref: Some(owner_ref.clone()),
            },
        );
        Ok(native_id)
    }

    fn update(
        &self,
        native_id: &str,
        patch: &BTreeMap<String, Value>,
    ) -> Result<(), InventoryError> {
        if self.take_failure() {
            return Err(InventoryError::Transient("injected failure".to_string()));
        }
        let mut inner = self.lock();
        let object = inner
            .objects
            .get_mut(native_id)
            .ok_or_else(|| InventoryError::Permanent(format!("no object {}", native_id)))?;
        for (field, value) in patch {
            object.attributes.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, native_id: &str) -> Result<(), InventoryError> {
        if self.take_failure() {
            return Err(InventoryError::Transient("injected failure".to_string()));
        }
        self.lock()
            .objects
            .remove(native_id)
            .map(|_| ())
            .ok_or_else(|| InventoryError::Permanent(format!("no object {}", native_id)))
    }

    fn set_owner(
        &self,
        native_id: &str,
        owner_tag: Option<&str>,
        owner_ref: Option<&StableId>,
    ) -> Result<(), InventoryError> {
        let mut inner = self.lock();
        let object = inner
            .objects
            .get_mut(native_id)
            .ok_or_else(|| InventoryError::Permanent(format!("no object {}", native_id)))?;
        object.owner_tag = owner_tag.map(str::to_string);
        object.owner_ref = owner_ref.cloned();
        Ok(())
    }

    fn get(&self, native_id: &str) -> Result<Option<ActualObject>, InventoryError> {
        Ok(self.lock().objects.get(native_id).cloned())
    }
}

impl StateObserver for MemoryInventory {
    fn observe(&self, spec_id: &str) -> Result<Vec<ActualObject>, InventoryError> {
        Ok(self
            .lock()
            .objects
            .values()
            .filter(|o| o.owner_tag.as_deref() == Some(spec_id) || o.owner_tag.is_none())
            .cloned()
            .collect())
    }
}

impl ExternalReferenceChecker for MemoryInventory {
    fn is_referenced(&self, native_id: &str) -> Result<bool, InventoryError> {
        Ok(self.lock().external_refs.get(native_id).is_some_and(|n| *n > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_assigns_monotonic_native_ids() {
        let inv = MemoryInventory::new();
        let id = StableId::from_raw("abc");
        let attrs = BTreeMap::from([("name".to_string(), json!("n1"))]);
        let a = inv.create(ObjectKind::Device, &attrs, "spec", &id).unwrap();
        let b = inv.create(ObjectKind::Device, &attrs, "spec", &id).unwrap();
        assert_ne!(a, b);
        assert_eq!(inv.object_count(), 2);
    }

    #[test]
    fn observe_returns_owned_and_untagged_objects() {
        let inv = MemoryInventory::new();
        let id = StableId::from_raw("abc");
        let attrs = BTreeMap::new();
        inv.create(ObjectKind::Device, &attrs, "mine", &id).unwrap();
        inv.create(ObjectKind::Device, &attrs, "other", &id).unwrap();
        inv.seed(ActualObject {
            native_id: "ext-1".to_string(),
            kind: ObjectKind::Device,
            attributes: BTreeMap::new(),
            owner_tag: None,
            owner_ref: None,
        });

        let seen = inv.observe("mine").unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn injected_failures_are_transient_and_bounded() {
        let inv = MemoryInventory::new();
        inv.fail_next_calls(1);
        let id = StableId::from_raw("abc");
        let attrs = BTreeMap::new();
        let first = inv.create(ObjectKind::Device, &attrs, "spec", &id);
        assert!(matches!(first, Err(InventoryError::Transient(_))));
        assert!(inv.create(ObjectKind::Device, &attrs, "spec", &id).is_ok());
    }

    #[test]
    fn update_patches_only_given_fields() {
        let inv = MemoryInventory::new();
        let id = StableId::from_raw("abc");
        let attrs = BTreeMap::from([
            ("name".to_string(), json!("n1")),
            ("role".to_string(), json!("leaf")),
        ]);
        let native = inv.create(ObjectKind::Device, &attrs, "spec", &id).unwrap();
        inv.update(&native, &BTreeMap::from([("name".to_string(), json!("n2"))])).unwrap();

        let object = inv.get(&native).unwrap().unwrap();
        assert_eq!(object.attributes["name"], json!("n2"));
        assert_eq!(object.attributes["role"], json!("leaf"));
    }
}
