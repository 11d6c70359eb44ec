// THEORY:
// `MotionDecision` maps where the target is to which way the actuator should
// move. It is a pure function of the tracker's status and the frame center;
// all state (what was sent last, when) lives in the dispatcher.
//
// Rules, evaluated on the offset `(dx, dy)` of the target from the center:
// - inside the deadzone on both axes (`|dx| < R && |dy| < R`): centered
// - otherwise, with the default dominant-axis policy, only the axis with the
//   larger offset moves; on `|dx| == |dy|` tilt wins
// - image y grows downward, so a negative `dy` means the target is above
//   center and the actuator tilts UP
//
// When the target is not visible this cycle the decision is always idle,
// whether it was lost or never seen.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core_modules::frame::PixelPoint;
use crate::core_modules::tracker::TrackStatus;
use crate::protocol::{MotionIntent, PanDir, TiltDir};

/// How offsets on both axes are turned into an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisPolicy {
    /// Move only the axis with the larger offset.
    #[default]
    DominantAxis,
    /// Move every axis whose offset is outside the deadzone.
    Independent,
}

/// The decision for one cycle, including the status line shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guidance {
    NoTarget,
    LastSeen(PixelPoint),
    Centered(PixelPoint),
    Steer {
        target: PixelPoint,
        intent: MotionIntent,
    },
}

impl Guidance {
    pub fn intent(&self) -> MotionIntent {
        match self {
            Self::Steer { intent, .. } => *intent,
            Self::NoTarget | Self::LastSeen(_) | Self::Centered(_) => MotionIntent::IDLE,
        }
    }

    /// True when the target was detected this cycle.
    pub fn target_visible(&self) -> bool {
        matches!(self, Self::Centered(_) | Self::Steer { .. })
    }
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget => f.write_str("No Target"),
            Self::LastSeen(_) => f.write_str("Last seen"),
            Self::Centered(_) => f.write_str("Centered"),
            Self::Steer { intent, .. } => write!(f, "{intent}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionDecision {
    deadzone: i32,
    policy: AxisPolicy,
}

impl MotionDecision {
    pub fn new(deadzone: i32, policy: AxisPolicy) -> Self {
        Self { deadzone, policy }
    }

    pub fn deadzone(&self) -> i32 {
        self.deadzone
    }

    pub fn decide(&self, status: &TrackStatus, center: PixelPoint) -> Guidance {
        match status {
            TrackStatus::NoTarget => Guidance::NoTarget,
            TrackStatus::LastSeen(target) => Guidance::LastSeen(target.position),
            TrackStatus::Tracking(target) => {
                let dx = target.position.x - center.x;
                let dy = target.position.y - center.y;
                match self.decide_offset(dx, dy) {
                    Some(intent) => Guidance::Steer {
                        target: target.position,
                        intent,
                    },
                    None => Guidance::Centered(target.position),
                }
            }
        }
    }

    /// The intent for a target offset from center, or `None` inside the deadzone.
    pub fn decide_offset(&self, dx: i32, dy: i32) -> Option<MotionIntent> {
        let r = self.deadzone;
        if dx.abs() < r && dy.abs() < r {
            return None;
        }
        let pan = if dx < 0 { PanDir::Left } else { PanDir::Right };
        let tilt = if dy < 0 { TiltDir::Up } else { TiltDir::Down };

        let intent = match self.policy {
            AxisPolicy::DominantAxis if dx.abs() > dy.abs() => MotionIntent::pan_only(pan),
            AxisPolicy::DominantAxis => MotionIntent::tilt_only(tilt),
            AxisPolicy::Independent => MotionIntent {
                pan: if dx.abs() >= r { pan } else { PanDir::None },
                tilt: if dy.abs() >= r { tilt } else { TiltDir::None },
            },
        };
        Some(intent)
    }
}

impl Default for MotionDecision {
    fn default() -> Self {
        Self::new(50, AxisPolicy::DominantAxis)
    }
}
