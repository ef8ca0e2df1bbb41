//! Safety governor.
//!
//! Hard limits checked once per cycle, before anything is dispatched and
//! also while paused. A trip is final: the session goes to Stopped.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::{FailsafeCorner, SafetyConfig};

/// Why the governor stopped the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    RuntimeLimit,
    /// Pointer parked in the failsafe corner
    Failsafe,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::RuntimeLimit => write!(f, "maximum runtime reached"),
            StopReason::Failsafe => write!(f, "failsafe corner triggered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    Continue,
    HardStop(StopReason),
}

/// Screen-space squares that count as "the corner".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailsafeRegion {
    corners: Vec<(i32, i32)>,
    margin: i32,
}

impl FailsafeRegion {
    pub fn new(corner: FailsafeCorner, margin_px: u32, screen_width: u32, screen_height: u32) -> Self {
        let right = screen_width.saturating_sub(1) as i32;
        let bottom = screen_height.saturating_sub(1) as i32;
        let corners = match corner {
            FailsafeCorner::TopLeft => vec![(0, 0)],
            FailsafeCorner::TopRight => vec![(right, 0)],
            FailsafeCorner::BottomLeft => vec![(0, bottom)],
            FailsafeCorner::BottomRight => vec![(right, bottom)],
            FailsafeCorner::Any => vec![(0, 0), (right, 0), (0, bottom), (right, bottom)],
        };
        Self {
            corners,
            margin: margin_px as i32,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.corners
            .iter()
            .any(|(cx, cy)| (x - cx).abs() <= self.margin && (y - cy).abs() <= self.margin)
    }
}

pub struct SafetyGovernor {
    max_runtime: Option<Duration>,
    failsafe: Option<FailsafeRegion>,
}

impl SafetyGovernor {
    pub fn new(config: &SafetyConfig) -> Self {
        let failsafe = config.enable_failsafe.then(|| {
            FailsafeRegion::new(
                config.failsafe_corner,
                config.failsafe_margin_px,
                config.screen_width,
                config.screen_height,
            )
        });
        Self {
            max_runtime: config.max_runtime(),
            failsafe,
        }
    }

    pub fn failsafe_enabled(&self) -> bool {
        self.failsafe.is_some()
    }

    /// `elapsed` is session wall time (pauses included); `pointer` is the
    /// current pointer position, `None` when it could not be read.
    pub fn evaluate(&self, elapsed: Duration, pointer: Option<(i32, i32)>) -> SafetyVerdict {
        if let Some(limit) = self.max_runtime {
            if elapsed >= limit {
                warn!(elapsed_secs = elapsed.as_secs(), "Maximum runtime reached");
                return SafetyVerdict::HardStop(StopReason::RuntimeLimit);
            }
        }

        if let (Some(region), Some((x, y))) = (&self.failsafe, pointer) {
            if region.contains(x, y) {
                warn!(x, y, "Pointer in failsafe corner");
                return SafetyVerdict::HardStop(StopReason::Failsafe);
            }
        }

        SafetyVerdict::Continue
    }
}
