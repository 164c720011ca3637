//! Topology calculation
//!
//! Turns a validated spec into concrete counts: how many leaves, how
//! many spines, which breakout mode the leaf downlink zone runs.
//! Infeasible topologies are errors here, before any object is ever
//! generated - there is no such thing as a partial plan.

use crate::breakout::{self, BreakoutMode};
use crate::spec::ValidatedSpec;
use thiserror::Error;

/// Default uplink ports per leaf before the redundancy multiplier.
pub const DEFAULT_UPLINKS_PER_LEAF: u32 = 2;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalculationError {
    #[error(
        "computed spine count {computed} is below the minimum {minimum} required by the \
         redundancy policy; add uplinks or servers"
    )]
    SpineBelowPolicyMinimum { computed: u32, minimum: u32 },

    #[error(
        "leaf downlink zone needs {needed} lanes but {port_count}-port leaf provides only \
         {available} at {mode}"
    )]
    InsufficientDownlinks { needed: u32, available: u32, port_count: u32, mode: BreakoutMode },

    #[error("no breakout of {native}G ports can serve {requested}G downlinks")]
    NoUsableBreakout { native: u32, requested: u32 },
}

/// The calculated topology: counts and port-zone assignments, plus
/// non-fatal warnings. Input to the desired-state generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyPlan {
    pub leaf_count: u32,
    pub spine_count: u32,
    /// Uplink ports per leaf, redundancy multiplier applied.
    pub uplinks_per_leaf: u32,
    /// NICs per server (the redundancy way-count).
    pub nics_per_server: u32,
    pub server_total: u32,
    /// Breakout mode for the leaf downlink zone.
    pub downlink_breakout: BreakoutMode,
    /// Physical downlink ports per leaf (ports minus uplinks).
    pub downlink_ports_per_leaf: u32,
    /// Logical downlink lanes per leaf.
    pub downlink_lanes_per_leaf: u32,
    pub warnings: Vec<String>,
}

/// Compute the topology for a validated spec.
///
/// Deterministic: no map iteration, no randomness, no clock. The same
/// spec always computes the same plan.
pub fn calculate(spec: &ValidatedSpec) -> Result<TopologyPlan, CalculationError> {
    let mut warnings = Vec::new();

    let server_total = spec.server_total();
    let units_per_leaf = spec.leaf.units_per_leaf;
    let leaf_count = server_total.div_ceil(units_per_leaf);

    let remainder = server_total % units_per_leaf;
    if remainder != 0 {
        warnings.push(format!(
            "leaf {} under-populated ({}/{})",
            leaf_count, remainder, units_per_leaf
        ));
    }

    // Redundancy doubles (or leaves alone) the uplink requirement and
    // the per-server NIC count. A manual override is taken as the final
    // per-leaf figure; validation already checked it against the policy
    // minimum.
    let multiplier = spec.redundancy.multiplier();
    let uplinks_per_leaf = spec
        .uplinks_per_leaf
        .unwrap_or(DEFAULT_UPLINKS_PER_LEAF * multiplier);
    let nics_per_server = multiplier;

    // Spines: enough ports for every leaf uplink, never silently
    // clamped up to the policy minimum.
    let total_uplinks = leaf_count * uplinks_per_leaf;
    let spine_count = total_uplinks.div_ceil(spec.spine.port_count).max(1);
    let minimum = spec.redundancy.min_spines();
    if spine_count < minimum {
        return Err(CalculationError::SpineBelowPolicyMinimum { computed: spine_count, minimum });
    }

    if uplinks_per_leaf % spine_count != 0 {
        warnings.push(format!(
            "{} uplinks per leaf do not divide evenly across {} spines",
            uplinks_per_leaf, spine_count
        ));
    }

    // Downlink zone: pick the breakout, then check capacity. Dual-homed
    // leaves carry their own units plus their neighbours' second homes.
    let downlink_breakout = match spec.breakout_override {
        Some(mode) => mode,
        None => breakout::select_breakout(spec.leaf.port_speed_gbps, spec.leaf.downlink_speed_gbps)
            .ok_or(CalculationError::NoUsableBreakout {
                native: spec.leaf.port_speed_gbps,
                requested: spec.leaf.downlink_speed_gbps,
            })?,
    };

    // Saturating: a tiny leaf where uplinks eat every port falls through
    // to the InsufficientDownlinks error below instead of underflowing.
    let downlink_ports_per_leaf = spec.leaf.port_count.saturating_sub(uplinks_per_leaf);
    let downlink_lanes_per_leaf = downlink_ports_per_leaf * downlink_breakout.multiplier;
    let needed_lanes = units_per_leaf * multiplier;
    if downlink_lanes_per_leaf < needed_lanes {
        return Err(CalculationError::InsufficientDownlinks {
            needed: needed_lanes,
            available: downlink_lanes_per_leaf,
            port_count: spec.leaf.port_count,
            mode: downlink_breakout,
        });
    }

    Ok(TopologyPlan {
        leaf_count,
        spine_count,
        uplinks_per_leaf,
        nics_per_server,
        server_total,
        downlink_breakout,
        downlink_ports_per_leaf,
        downlink_lanes_per_leaf,
        warnings,
    })
}
