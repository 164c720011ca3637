//! Persisted engine state
//!
//! Everything the engine remembers between invocations: the ownership
//! mapping and the last successfully applied graph. The engine itself
//! is stateless otherwise. Callers load/save this (one per spec) and
//! hold the per-spec lock across any mutation.

use crate::ownership::OwnershipMap;
use fabric::DesiredStateGraph;
use serde::{Deserialize, Serialize};

/// Per-spec persisted state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub ownership: OwnershipMap,

    /// The graph produced by the most recent fully successful apply.
    /// The "original" side of the three-way merge and the drift
    /// baseline. Absent until the first apply succeeds.
    #[serde(default)]
    pub last_applied: Option<DesiredStateGraph>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a deleted spec: drop all mappings and the snapshot.
    pub fn prune(&mut self) {
        self.ownership.prune();
        self.last_applied = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric::StableId;

    #[test]
    fn default_state_is_empty() {
        let state = EngineState::new();
        assert!(state.ownership.is_empty());
        assert!(state.last_applied.is_none());
    }

    #[test]
    fn roundtrips_through_json() {
        let mut state = EngineState::new();
        state.ownership.register(StableId::from_raw("s1"), "inv-1");
        state.last_applied = Some(DesiredStateGraph::new("fab1"));

        let json = serde_json::to_string(&state).unwrap();
        let back: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn prune_clears_mapping_and_snapshot() {
        let mut state = EngineState::new();
        state.ownership.register(StableId::from_raw("s1"), "inv-1");
        state.last_applied = Some(DesiredStateGraph::new("fab1"));
        state.prune();
        assert!(state.ownership.is_empty());
        assert!(state.last_applied.is_none());
    }
}
