//! Spec validation
//!
//! Collects every violation in one pass - a spec with five problems
//! reports five errors, not one. A [`ValidatedSpec`] can only be
//! obtained here.

use crate::breakout::{self, SUPPORTED_SPEEDS};
use crate::spec::{FabricSpec, ValidatedSpec};
use std::collections::BTreeSet;
use thiserror::Error;

/// Upper bound on servers per class; counts beyond this are a spec
/// mistake, not a fabric.
pub const MAX_SERVERS_PER_CLASS: u32 = 4096;
/// Upper bound on physical ports per switch.
pub const MAX_PORTS: u32 = 256;
/// Bounds on `{index}` zero-padding width.
pub const INDEX_WIDTH_RANGE: std::ops::RangeInclusive<usize> = 1..=6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A numeric value is outside its supported bounds.
    Range,
    /// A value is not a member of its supported set.
    Enum,
    /// Two fields are individually fine but inconsistent together.
    CrossField,
    /// A referenced entity does not exist.
    Reference,
    /// The naming template cannot produce unique names.
    Template,
}

impl ValidationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Enum => "enum",
            Self::CrossField => "cross-field",
            Self::Reference => "reference",
            Self::Template => "template",
        }
    }
}

/// One validation rule violation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, field: &str, message: impl Into<String>) -> Self {
        Self { kind, field: field.to_string(), message: message.into() }
    }
}

/// Validate a raw spec. Never stops at the first violation.
pub fn validate(spec: FabricSpec) -> Result<ValidatedSpec, Vec<ValidationError>> {
    use ValidationErrorKind::*;

    let mut errors = Vec::new();
    let mut err = |kind, field: &str, message: String| {
        errors.push(ValidationError::new(kind, field, message));
    };

    if spec.id.trim().is_empty() {
        err(Range, "id", "spec id must not be empty".to_string());
    }

    if !INDEX_WIDTH_RANGE.contains(&spec.index_width) {
        err(
            Range,
            "index_width",
            format!(
                "index width {} outside supported range {}..={}",
                spec.index_width,
                INDEX_WIDTH_RANGE.start(),
                INDEX_WIDTH_RANGE.end()
            ),
        );
    }

    // Naming template: {index} for in-role uniqueness, {role} for
    // cross-role uniqueness.
    if !spec.name_template.contains("{index}") {
        err(
            Template,
            "name_template",
            "template must contain {index} to keep generated names unique".to_string(),
        );
    }
    if !spec.name_template.contains("{role}") {
        err(
            Template,
            "name_template",
            "template must contain {role} so leaves, spines and servers cannot collide"
                .to_string(),
        );
    }

    // Server classes: present, named, unique, bounded.
    if spec.server_classes.is_empty() {
        err(Range, "server_classes", "at least one server class is required".to_string());
    }
    let mut seen = BTreeSet::new();
    for (i, class) in spec.server_classes.iter().enumerate() {
        let field = format!("server_classes[{}]", i);
        if class.name.trim().is_empty() {
            err(Reference, &field, "server class name must not be empty".to_string());
        } else if !seen.insert(class.name.as_str()) {
            err(Reference, &field, format!("duplicate server class '{}'", class.name));
        }
        if class.count == 0 || class.count > MAX_SERVERS_PER_CLASS {
            err(
                Range,
                &field,
                format!(
                    "count {} outside supported range 1..={}",
                    class.count, MAX_SERVERS_PER_CLASS
                ),
            );
        }
    }

    // Switch classes.
    for (prefix, port_count, port_speed) in [
        ("leaf", spec.leaf.port_count, spec.leaf.port_speed_gbps),
        ("spine", spec.spine.port_count, spec.spine.port_speed_gbps),
    ] {
        if port_count == 0 || port_count > MAX_PORTS {
            err(
                Range,
                &format!("{}.port_count", prefix),
                format!("port count {} outside supported range 1..={}", port_count, MAX_PORTS),
            );
        }
        if !SUPPORTED_SPEEDS.contains(&port_speed) {
            err(
                Enum,
                &format!("{}.port_speed_gbps", prefix),
                format!("unsupported port speed {}G", port_speed),
            );
        }
    }

    if spec.leaf.units_per_leaf == 0 {
        err(Range, "leaf.units_per_leaf", "units per leaf must be at least 1".to_string());
    }

    if !SUPPORTED_SPEEDS.contains(&spec.leaf.downlink_speed_gbps) {
        err(
            Enum,
            "leaf.downlink_speed_gbps",
            format!("unsupported downlink speed {}G", spec.leaf.downlink_speed_gbps),
        );
    } else if spec.leaf.downlink_speed_gbps > spec.leaf.port_speed_gbps {
        err(
            CrossField,
            "leaf.downlink_speed_gbps",
            format!(
                "downlink speed {}G exceeds leaf port speed {}G",
                spec.leaf.downlink_speed_gbps, spec.leaf.port_speed_gbps
            ),
        );
    }

    // Leaf uplinks land on spine ports; speeds must agree.
    if SUPPORTED_SPEEDS.contains(&spec.leaf.port_speed_gbps)
        && SUPPORTED_SPEEDS.contains(&spec.spine.port_speed_gbps)
        && spec.leaf.port_speed_gbps != spec.spine.port_speed_gbps
    {
        err(
            CrossField,
            "spine.port_speed_gbps",
            format!(
                "spine port speed {}G does not match leaf port speed {}G",
                spec.spine.port_speed_gbps, spec.leaf.port_speed_gbps
            ),
        );
    }

    // Manual uplink override must satisfy the redundancy policy and fit
    // on the switch.
    if let Some(uplinks) = spec.uplinks_per_leaf {
        let min = spec.redundancy.min_uplinks();
        if uplinks < min {
            err(
                CrossField,
                "uplinks_per_leaf",
                format!(
                    "{} uplinks is below the minimum {} required by the {} policy",
                    uplinks,
                    min,
                    spec.redundancy.as_str()
                ),
            );
        }
        if uplinks >= spec.leaf.port_count {
            err(
                CrossField,
                "uplinks_per_leaf",
                format!(
                    "{} uplinks leave no downlink ports on a {}-port leaf",
                    uplinks, spec.leaf.port_count
                ),
            );
        }
    }

    // Manual breakout override must be a valid submultiple and still
    // meet the requested downlink speed.
    if let Some(mode) = spec.breakout_override {
        if !breakout::is_valid_mode(spec.leaf.port_speed_gbps, mode) {
            err(
                Enum,
                "breakout_override",
                format!("{} is not a valid breakout of {}G ports", mode, spec.leaf.port_speed_gbps),
            );
        } else if mode.lane_gbps < spec.leaf.downlink_speed_gbps {
            err(
                CrossField,
                "breakout_override",
                format!(
                    "{} lanes cannot serve {}G downlinks",
                    mode, spec.leaf.downlink_speed_gbps
                ),
            );
        }
    }

    if errors.is_empty() { Ok(ValidatedSpec(spec)) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakout::BreakoutMode;
    use crate::spec::{LeafClassSpec, RedundancyPolicy, ServerClassSpec, SpineClassSpec};

    fn good_spec() -> FabricSpec {
        FabricSpec {
            id: "fab1".to_string(),
            name_template: "{fabric}-{role}-{index}".to_string(),
            index_width: 2,
            redundancy: RedundancyPolicy::SingleHomed,
            server_classes: vec![ServerClassSpec { name: "web".to_string(), count: 8 }],
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
    fn valid_spec_passes() {
        assert!(validate(good_spec()).is_ok());
    }

    #[test]
    fn collects_all_violations_not_just_the_first() {
        let mut spec = good_spec();
        spec.id = "".to_string();
        spec.name_template = "plain".to_string();
        spec.leaf.port_speed_gbps = 123;
        spec.server_classes[0].count = 0;

        let errors = validate(spec).unwrap_err();
        assert!(errors.len() >= 5, "expected all violations, got {:?}", errors);
    }

    #[test]
    fn override_below_policy_minimum_is_cross_field() {
        let mut spec = good_spec();
        spec.redundancy = RedundancyPolicy::DualHomed;
        spec.uplinks_per_leaf = Some(1);

        let errors = validate(spec).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.kind == ValidationErrorKind::CrossField
                    && e.field == "uplinks_per_leaf")
        );
    }

    #[test]
    fn duplicate_server_class_is_reference_error() {
        let mut spec = good_spec();
        spec.server_classes.push(ServerClassSpec { name: "web".to_string(), count: 4 });

        let errors = validate(spec).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::Reference));
    }

    #[test]
    fn breakout_override_must_serve_downlink_speed() {
        let mut spec = good_spec();
        spec.leaf.downlink_speed_gbps = 50;
        spec.breakout_override = Some(BreakoutMode::new(4, 25));

        let errors = validate(spec).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "breakout_override"));
    }

    #[test]
    fn mismatched_uplink_speeds_rejected() {
        let mut spec = good_spec();
        spec.spine.port_speed_gbps = 400;

        let errors = validate(spec).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "spine.port_speed_gbps"));
    }

    #[test]
    fn template_without_placeholders_rejected() {
        let mut spec = good_spec();
        spec.name_template = "{fabric}-node".to_string();

        let errors = validate(spec).unwrap_err();
        let template_errors: Vec<_> = errors
            .iter()
            .filter(|e| e.kind == ValidationErrorKind::Template)
            .collect();
        assert_eq!(template_errors.len(), 2);
    }
}
