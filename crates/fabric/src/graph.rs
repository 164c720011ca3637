//! Desired-state object graph
//!
//! Flat collections keyed by stable identity. Cables and interfaces
//! reference their devices through stable-id strings in attributes -
//! id-based references, never embedded ownership, so the cyclic
//! device/interface/cable relationships stay cycle-free in memory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Closed set of resource kinds the engine manages.
///
/// Exhaustively matched in the diff engine and executor; there is
/// deliberately no "any resource" escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Device,
    Interface,
    Cable,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Interface => "interface",
            Self::Cable => "cable",
        }
    }

    /// Create order: parents before children.
    pub const CREATE_ORDER: [ObjectKind; 3] = [Self::Device, Self::Interface, Self::Cable];

    /// Delete order: children before parents.
    pub const DELETE_ORDER: [ObjectKind; 3] = [Self::Cable, Self::Interface, Self::Device];
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic identity of a desired object.
///
/// Derived from spec identity, kind and logical position - never from
/// the name, so renames do not change identity. The inventory's own
/// `native_id` is a separate thing entirely.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    pub fn derive(spec_id: &str, kind: ObjectKind, position: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(spec_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(position.as_bytes());
        let hash = hasher.finalize();
        let mut out = String::with_capacity(32);
        for byte in &hash.as_bytes()[..16] {
            out.push_str(&format!("{:02x}", byte));
        }
        Self(out)
    }

    /// Wrap an already-derived id (e.g. read back from the inventory's
    /// owner tag).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute names the generator may compute and therefore own.
pub mod fields {
    pub const NAME: &str = "name";
    pub const ROLE: &str = "role";
    pub const MODEL: &str = "model";
    /// Parent device (stable-id string) on interfaces.
    pub const DEVICE: &str = "device";
    pub const SPEED_GBPS: &str = "speed_gbps";
    pub const BREAKOUT: &str = "breakout";
    /// Cable endpoints (interface stable-id strings).
    pub const ENDPOINT_A: &str = "endpoint_a";
    pub const ENDPOINT_B: &str = "endpoint_b";
}

/// One object the engine wants to exist.
///
/// `managed_fields` is the exact set of attributes the generator
/// computed; nothing outside it is ever compared or written by the
/// reconciler, however much it diverges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredObject {
    pub stable_id: StableId,
    pub kind: ObjectKind,
    /// Logical position, e.g. `leaf/3` or `leaf/3/uplink/2`. Input to
    /// the stable id; invariant across renames.
    pub position: String,
    pub attributes: BTreeMap<String, Value>,
    pub managed_fields: BTreeSet<String>,
}

impl DesiredObject {
    pub fn name(&self) -> &str {
        self.attributes
            .get(fields::NAME)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn attr_str(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }
}

/// The full desired state for one spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredStateGraph {
    pub spec_id: String,
    pub devices: Vec<DesiredObject>,
    pub interfaces: Vec<DesiredObject>,
    pub cables: Vec<DesiredObject>,
}

impl DesiredStateGraph {
    pub fn new(spec_id: impl Into<String>) -> Self {
        Self {
            spec_id: spec_id.into(),
            devices: Vec::new(),
            interfaces: Vec::new(),
            cables: Vec::new(),
        }
    }

    /// All objects in dependency order: devices, interfaces, cables.
    pub fn iter(&self) -> impl Iterator<Item = &DesiredObject> {
        self.devices.iter().chain(&self.interfaces).chain(&self.cables)
    }

    pub fn objects_of(&self, kind: ObjectKind) -> &[DesiredObject] {
        match kind {
            ObjectKind::Device => &self.devices,
            ObjectKind::Interface => &self.interfaces,
            ObjectKind::Cable => &self.cables,
        }
    }

    pub fn objects_of_mut(&mut self, kind: ObjectKind) -> &mut Vec<DesiredObject> {
        match kind {
            ObjectKind::Device => &mut self.devices,
            ObjectKind::Interface => &mut self.interfaces,
            ObjectKind::Cable => &mut self.cables,
        }
    }

    pub fn find(&self, id: &StableId) -> Option<&DesiredObject> {
        self.iter().find(|o| &o.stable_id == id)
    }

    pub fn find_mut(&mut self, id: &StableId) -> Option<&mut DesiredObject> {
        self.devices
            .iter_mut()
            .chain(&mut self.interfaces)
            .chain(&mut self.cables)
            .find(|o| &o.stable_id == id)
    }

    pub fn len(&self) -> usize {
        self.devices.len() + self.interfaces.len() + self.cables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
