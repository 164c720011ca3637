//! Fabric specification - the user-declared input model
//!
//! A [`FabricSpec`] is what an operator writes (typically as TOML):
//! how many servers of each class, which switch models, how redundant
//! the fabric should be. It is immutable once a plan has been built
//! from it; edits produce a new spec that goes through validation
//! again.

use serde::{Deserialize, Serialize};

/// Strategy for multi-homing servers onto leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RedundancyPolicy {
    /// Each server connects to exactly one leaf.
    #[default]
    SingleHomed,
    /// Each server connects to two distinct leaves; uplink and NIC
    /// requirements double.
    DualHomed,
}

impl RedundancyPolicy {
    /// Multiplier applied to per-server NICs and per-leaf uplink/downlink
    /// requirements.
    pub fn multiplier(self) -> u32 {
        match self {
            Self::SingleHomed => 1,
            Self::DualHomed => 2,
        }
    }

    /// Minimum uplinks per leaf this policy accepts.
    pub fn min_uplinks(self) -> u32 {
        match self {
            Self::SingleHomed => 1,
            Self::DualHomed => 2,
        }
    }

    /// Minimum spine count this policy accepts.
    pub fn min_spines(self) -> u32 {
        match self {
            Self::SingleHomed => 1,
            Self::DualHomed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleHomed => "single-homed",
            Self::DualHomed => "dual-homed",
        }
    }
}

/// A class of servers to place on the fabric (e.g., "web", "db").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerClassSpec {
    pub name: String,
    pub count: u32,
}

/// Leaf switch class: the switch model servers attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafClassSpec {
    pub model: String,
    /// Physical port count.
    pub port_count: u32,
    /// Native speed of every physical port, in Gbps.
    pub port_speed_gbps: u32,
    /// Speed each server-facing logical port must provide, in Gbps.
    pub downlink_speed_gbps: u32,
    /// How many server units one leaf serves (rack capacity).
    pub units_per_leaf: u32,
}

/// Spine switch class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineClassSpec {
    pub model: String,
    pub port_count: u32,
    pub port_speed_gbps: u32,
}

/// The user-declared fabric specification.
///
/// `id` doubles as the owner tag in the external inventory; everything
/// this engine creates for the spec is tagged with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricSpec {
    /// Spec identity. Stable identities and inventory ownership hang
    /// off this string; renaming it means a new fabric.
    pub id: String,

    /// Device naming template. Placeholders: `{fabric}`, `{role}`,
    /// `{index}`. The index is 1-based and zero-padded to
    /// `index_width`.
    #[serde(default = "default_name_template")]
    pub name_template: String,

    /// Zero-padding width for `{index}`.
    #[serde(default = "default_index_width")]
    pub index_width: usize,

    #[serde(default)]
    pub redundancy: RedundancyPolicy,

    #[serde(default)]
    pub server_classes: Vec<ServerClassSpec>,

    pub leaf: LeafClassSpec,
    pub spine: SpineClassSpec,

    /// Manual override for uplink ports per leaf. Must be at least the
    /// minimum the redundancy policy requires.
    #[serde(default)]
    pub uplinks_per_leaf: Option<u32>,

    /// Manual override for the leaf downlink breakout mode. Must be a
    /// valid submultiple of the leaf port speed and still meet the
    /// requested downlink speed.
    #[serde(default)]
    pub breakout_override: Option<crate::breakout::BreakoutMode>,
}

fn default_name_template() -> String {
    "{fabric}-{role}-{index}".to_string()
}

fn default_index_width() -> usize {
    2
}

impl FabricSpec {
    /// Total server units across all classes.
    pub fn server_total(&self) -> u32 {
        self.server_classes.iter().map(|c| c.count).sum()
    }

    /// Render a device name from the template.
    pub fn render_name(&self, role: &str, index: u32) -> String {
        self.name_template
            .replace("{fabric}", &self.id)
            .replace("{role}", role)
            .replace("{index}", &format!("{:0width$}", index, width = self.index_width))
    }
}

/// A [`FabricSpec`] that passed every validation rule.
///
/// Carries no new data - only the guarantee. Constructed exclusively by
/// [`crate::validate::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSpec(pub(crate) FabricSpec);

impl ValidatedSpec {
    pub fn spec(&self) -> &FabricSpec {
        &self.0
    }

    pub fn into_inner(self) -> FabricSpec {
        self.0
    }
}

impl std::ops::Deref for ValidatedSpec {
    type Target = FabricSpec;

    fn deref(&self) -> &FabricSpec {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FabricSpec {
        FabricSpec {
            id: "fab1".to_string(),
            name_template: default_name_template(),
            index_width: 2,
            redundancy: RedundancyPolicy::SingleHomed,
            server_classes: vec![
                ServerClassSpec { name: "web".to_string(), count: 5 },
                ServerClassSpec { name: "db".to_string(), count: 3 },
            ],
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
        }
    }

    #[test]
    fn server_total_sums_classes() {
        assert_eq!(spec().server_total(), 8);
    }

    #[test]
    fn render_name_pads_index() {
        let s = spec();
        assert_eq!(s.render_name("leaf", 3), "fab1-leaf-03");
        assert_eq!(s.render_name("spine", 12), "fab1-spine-12");
    }

    #[test]
    fn render_name_respects_width() {
        let mut s = spec();
        s.index_width = 3;
        assert_eq!(s.render_name("leaf", 7), "fab1-leaf-007");
    }

    #[test]
    fn redundancy_multipliers() {
        assert_eq!(RedundancyPolicy::SingleHomed.multiplier(), 1);
        assert_eq!(RedundancyPolicy::DualHomed.multiplier(), 2);
        assert_eq!(RedundancyPolicy::DualHomed.min_spines(), 2);
    }

    #[test]
    fn spec_roundtrips_through_toml_style_serde() {
        let s = spec();
        let json = serde_json::to_string(&s).unwrap();
        let back: FabricSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
