//! Ownership tracking
//!
//! The persistent mapping between stable identities and the
//! inventory's native ids - the single source of truth for "what does
//! this engine currently manage". One map per spec, persisted by the
//! caller as part of [`crate::state::EngineState`], mutated only while
//! the per-spec lock is held.

use fabric::StableId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `stable_id <-> native_id` table for one spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMap {
    entries: BTreeMap<StableId, String>,
}

impl OwnershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping. Called on first successful create or on
    /// adoption of an externally-created object.
    pub fn register(&mut self, stable_id: StableId, native_id: impl Into<String>) {
        self.entries.insert(stable_id, native_id.into());
    }

    pub fn resolve(&self, stable_id: &StableId) -> Option<&str> {
        self.entries.get(stable_id).map(String::as_str)
    }

    /// Reverse lookup; linear, used only in diagnostics and drift.
    pub fn resolve_reverse(&self, native_id: &str) -> Option<&StableId> {
        self.entries.iter().find(|(_, n)| n.as_str() == native_id).map(|(s, _)| s)
    }

    /// Drop a single mapping (object deleted or orphaned).
    pub fn release(&mut self, stable_id: &StableId) -> Option<String> {
        self.entries.remove(stable_id)
    }

    /// Drop everything - the spec itself was deleted.
    pub fn prune(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, stable_id: &StableId) -> bool {
        self.entries.contains_key(stable_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StableId, &str)> {
        self.entries.iter().map(|(s, n)| (s, n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u32) -> StableId {
        StableId::from_raw(format!("stable-{}", n))
    }

    #[test]
    fn register_and_resolve() {
        let mut map = OwnershipMap::new();
        map.register(sid(1), "inv-1");
        assert_eq!(map.resolve(&sid(1)), Some("inv-1"));
        assert_eq!(map.resolve(&sid(2)), None);
    }

    #[test]
    fn reverse_lookup() {
        let mut map = OwnershipMap::new();
        map.register(sid(1), "inv-1");
        map.register(sid(2), "inv-2");
        assert_eq!(map.resolve_reverse("inv-2"), Some(&sid(2)));
        assert_eq!(map.resolve_reverse("inv-9"), None);
    }

    #[test]
    fn release_drops_single_entry() {
        let mut map = OwnershipMap::new();
        map.register(sid(1), "inv-1");
        map.register(sid(2), "inv-2");
        assert_eq!(map.release(&sid(1)), Some("inv-1".to_string()));
        assert_eq!(map.len(), 1);
        assert!(map.contains(&sid(2)));
    }

    #[test]
    fn prune_clears_everything() {
        let mut map = OwnershipMap::new();
        map.register(sid(1), "inv-1");
        map.register(sid(2), "inv-2");
        map.prune();
        assert!(map.is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let mut map = OwnershipMap::new();
        map.register(sid(1), "inv-1");
        let json = serde_json::to_string(&map).unwrap();
        let back: OwnershipMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }
}
