//! Breakout mode tables and deterministic selection
//!
//! A breakout splits one high-speed physical port into several
//! lower-speed logical lanes (e.g. 400G -> 4x100G). The valid splits
//! per native speed are a fixed table; selection over that table is a
//! pure comparator so the same inputs always pick the same mode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One way of splitting a physical port: `multiplier` logical lanes at
/// `lane_gbps` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakoutMode {
    pub multiplier: u32,
    pub lane_gbps: u32,
}

impl BreakoutMode {
    pub const fn new(multiplier: u32, lane_gbps: u32) -> Self {
        Self { multiplier, lane_gbps }
    }
}

impl fmt::Display for BreakoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}G", self.multiplier, self.lane_gbps)
    }
}

/// Port speeds the engine knows breakout tables for.
pub const SUPPORTED_SPEEDS: &[u32] = &[10, 25, 40, 50, 100, 200, 400, 800];

/// Valid breakout modes per native port speed, ordered by multiplier.
///
/// The 1x entry (no breakout) is always present and always valid.
pub fn modes_for(native_gbps: u32) -> &'static [BreakoutMode] {
    match native_gbps {
        800 => const {
            &[
                BreakoutMode::new(1, 800),
                BreakoutMode::new(2, 400),
                BreakoutMode::new(4, 200),
                BreakoutMode::new(8, 100),
            ]
        },
        400 => const {
            &[
                BreakoutMode::new(1, 400),
                BreakoutMode::new(2, 200),
                BreakoutMode::new(4, 100),
                BreakoutMode::new(8, 50),
            ]
        },
        200 => const {
            &[
                BreakoutMode::new(1, 200),
                BreakoutMode::new(2, 100),
                BreakoutMode::new(4, 50),
            ]
        },
        100 => const {
            &[
                BreakoutMode::new(1, 100),
                BreakoutMode::new(2, 50),
                BreakoutMode::new(4, 25),
            ]
        },
        50 => const { &[BreakoutMode::new(1, 50)] },
        40 => const { &[BreakoutMode::new(1, 40), BreakoutMode::new(4, 10)] },
        25 => const { &[BreakoutMode::new(1, 25)] },
        10 => const { &[BreakoutMode::new(1, 10)] },
        _ => &[],
    }
}

/// Check that a mode appears in the table for a native speed.
pub fn is_valid_mode(native_gbps: u32, mode: BreakoutMode) -> bool {
    modes_for(native_gbps).contains(&mode)
}

/// Select the breakout mode for a port group that must provide logical
/// ports of at least `downlink_gbps` from ports of `native_gbps`.
///
/// Picks the lowest lane speed that still meets the request (maximum
/// usable lanes per physical port), breaking ties by the lower
/// multiplier. The comparator depends on nothing but its inputs.
pub fn select_breakout(native_gbps: u32, downlink_gbps: u32) -> Option<BreakoutMode> {
    modes_for(native_gbps)
        .iter()
        .filter(|m| m.lane_gbps >= downlink_gbps)
        .min_by_key(|m| (m.lane_gbps, m.multiplier))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lane_match_wins() {
        assert_eq!(select_breakout(100, 25), Some(BreakoutMode::new(4, 25)));
        assert_eq!(select_breakout(400, 100), Some(BreakoutMode::new(4, 100)));
    }

    #[test]
    fn no_breakout_when_downlink_equals_native() {
        assert_eq!(select_breakout(100, 100), Some(BreakoutMode::new(1, 100)));
    }

    #[test]
    fn picks_smallest_adequate_lane_when_no_exact_match() {
        // 30G has no exact lane; 50G lanes are the smallest that meet it.
        assert_eq!(select_breakout(400, 30), Some(BreakoutMode::new(8, 50)));
        assert_eq!(select_breakout(100, 30), Some(BreakoutMode::new(2, 50)));
    }

    #[test]
    fn unserveable_speed_yields_none() {
        assert_eq!(select_breakout(100, 200), None);
        assert_eq!(select_breakout(7, 1), None);
    }

    #[test]
    fn selection_is_deterministic() {
        for _ in 0..10 {
            assert_eq!(select_breakout(800, 100), Some(BreakoutMode::new(8, 100)));
        }
    }

    #[test]
    fn display_format() {
        assert_eq!(BreakoutMode::new(4, 100).to_string(), "4x100G");
    }

    #[test]
    fn validity_check_uses_table() {
        assert!(is_valid_mode(400, BreakoutMode::new(4, 100)));
        assert!(!is_valid_mode(400, BreakoutMode::new(4, 25)));
        assert!(!is_valid_mode(25, BreakoutMode::new(2, 10)));
    }
}
