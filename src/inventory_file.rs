//! File-backed inventory
//!
//! JSON-file implementation of the inventory traits - the default
//! backend for demos and the integration tests. Every mutation is
//! written through to disk, so consecutive weaver invocations see each
//! other's work. Not built for concurrent writers across processes.
//!
//! The `external_refs` list is free-form: operators (or tests) add
//! native ids there to mark objects that something outside weaver
//! depends on, which makes the engine orphan rather than delete them.

use anyhow::{Context as AnyhowContext, Result};
use fabric::{ObjectKind, StableId};
use reconcile::{
    ActualObject, ExternalReferenceChecker, InventoryError, InventoryStore, StateObserver,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileData {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    objects: BTreeMap<String, ActualObject>,
    #[serde(default)]
    external_refs: BTreeSet<String>,
}

/// Inventory stored in a single JSON file.
pub struct FileInventory {
    path: PathBuf,
    data: Mutex<FileData>,
}

impl FileInventory {
    /// Open (or initialize) the inventory file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Corrupt inventory file {}", path.display()))?
        } else {
            FileData::default()
        };
        Ok(Self { path, data: Mutex::new(data) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FileData> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// I/O failures count as transient: a retry may hit a recovered
    /// filesystem, and surfacing them as permanent would mask that.
    fn flush(&self, data: &FileData) -> Result<(), InventoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| InventoryError::Transient(format!("create dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| InventoryError::Permanent(format!("serialize inventory: {}", e)))?;
        fs::write(&self.path, content)
            .map_err(|e| InventoryError::Transient(format!("write {}: {}", self.path.display(), e)))
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }
}

impl InventoryStore for FileInventory {
    fn create(
        &self,
        kind: ObjectKind,
        attributes: &BTreeMap<String, Value>,
        owner_tag: &str,
        owner_ref: &StableId,
    ) -> Result<String, InventoryError> {
        let mut data = self.lock();
        data.next_id += 1;
        let native_id = format!("file-{:06}", data.next_id);
        data.objects.insert(
            native_id.clone(),
            ActualObject {
                native_id: native_id.clone(),
                kind,
                attributes: attributes.clone(),
                owner_tag: Some(owner_tag.to_string()),
                owner_ref: Some(owner_ref.clone()),
            },
        );
        self.flush(&data)?;
        Ok(native_id)
    }

    fn update(
        &self,
        native_id: &str,
        patch: &BTreeMap<String, Value>,
    ) -> Result<(), InventoryError> {
        let mut data = self.lock();
        let object = data
            .objects
            .get_mut(native_id)
            .ok_or_else(|| InventoryError::Permanent(format!("no object {}", native_id)))?;
        for (field, value) in patch {
            object.attributes.insert(field.clone(), value.clone());
        }
        self.flush(&data)
    }

    fn delete(&self, native_id: &str) -> Result<(), InventoryError> {
        let mut data = self.lock();
        data.objects
            .remove(native_id)
            .ok_or_else(|| InventoryError::Permanent(format!("no object {}", native_id)))?;
        self.flush(&data)
    }

    fn set_owner(
        &self,
        native_id: &str,
        owner_tag: Option<&str>,
        owner_ref: Option<&StableId>,
    ) -> Result<(), InventoryError> {
        let mut data = self.lock();
        let object = data
            .objects
            .get_mut(native_id)
            .ok_or_else(|| InventoryError::Permanent(format!("no object {}", native_id)))?;
        object.owner_tag = owner_tag.map(str::to_string);
        object.owner_ref = owner_ref.cloned();
        self.flush(&data)
    }

    fn get(&self, native_id: &str) -> Result<Option<ActualObject>, InventoryError> {
        Ok(self.lock().objects.get(native_id).cloned())
    }
}

impl StateObserver for FileInventory {
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

impl ExternalReferenceChecker for FileInventory {
    fn is_referenced(&self, native_id: &str) -> Result<bool, InventoryError> {
        Ok(self.lock().external_refs.contains(native_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(name: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([("name".to_string(), json!(name))])
    }

    #[test]
    fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");

        let native = {
            let inventory = FileInventory::open(&path).unwrap();
            inventory
                .create(ObjectKind::Device, &attrs("leaf-01"), "fab1", &StableId::from_raw("a"))
                .unwrap()
        };

        let reopened = FileInventory::open(&path).unwrap();
        let object = reopened.get(&native).unwrap().unwrap();
        assert_eq!(object.attributes["name"], json!("leaf-01"));
        assert_eq!(object.owner_tag.as_deref(), Some("fab1"));
    }

    #[test]
    fn native_ids_keep_counting_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");

        let first = {
            let inventory = FileInventory::open(&path).unwrap();
            inventory
                .create(ObjectKind::Device, &attrs("a"), "fab1", &StableId::from_raw("a"))
                .unwrap()
        };
        let second = {
            let inventory = FileInventory::open(&path).unwrap();
            inventory
                .create(ObjectKind::Device, &attrs("b"), "fab1", &StableId::from_raw("b"))
                .unwrap()
        };
        assert_ne!(first, second);
    }

    #[test]
    fn delete_removes_and_errors_on_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let inventory = FileInventory::open(dir.path().join("inv.json")).unwrap();
        let native = inventory
            .create(ObjectKind::Cable, &attrs("c"), "fab1", &StableId::from_raw("c"))
            .unwrap();

        inventory.delete(&native).unwrap();
        assert!(matches!(inventory.delete(&native), Err(InventoryError::Permanent(_))));
    }

    #[test]
    fn external_refs_come_from_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inv.json");
        fs::write(
            &path,
            r#"{"next_id": 0, "objects": {}, "external_refs": ["file-000007"]}"#,
        )
        .unwrap();

        let inventory = FileInventory::open(&path).unwrap();
        assert!(inventory.is_referenced("file-000007").unwrap());
        assert!(!inventory.is_referenced("file-000001").unwrap());
    }

    #[test]
    fn observe_filters_other_owners() {
        let dir = tempfile::tempdir().unwrap();
        let inventory = FileInventory::open(dir.path().join("inv.json")).unwrap();
        inventory
            .create(ObjectKind::Device, &attrs("mine"), "fab1", &StableId::from_raw("a"))
            .unwrap();
        inventory
            .create(ObjectKind::Device, &attrs("theirs"), "fab2", &StableId::from_raw("b"))
            .unwrap();

        let seen = inventory.observe("fab1").unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].attributes["name"], json!("mine"));
    }
}
