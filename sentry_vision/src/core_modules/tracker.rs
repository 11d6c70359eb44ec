// THEORY:
// The `tracker` module adds memory to the otherwise stateless detection stage.
// It keeps exactly one `TrackedTarget`: the last place the target was seen.
//
// Key principles:
// 1.  **Selection**: each cycle, only candidates strictly larger than the
//     minimum area qualify. The largest qualifying candidate wins; on equal
//     areas the earlier one in extraction order (raster order) is kept, so the
//     choice is deterministic.
// 2.  **Persistence**: when nothing qualifies, the remembered target is kept
//     untouched and the cycle is reported as `LastSeen`. The tracker never
//     forgets on its own; only `reset` clears it.
// 3.  **Centroid**: position is `(m10 / m00, m01 / m00)` truncated to whole
//     pixels. A candidate with `m00 == 0` has no centroid and is skipped.

use std::time::Instant;

use crate::core_modules::candidate::TargetCandidate;
use crate::core_modules::frame::PixelPoint;

/// The single target the tracker remembers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedTarget {
    /// Centroid in pixel coordinates.
    pub position: PixelPoint,
    /// Pixel count of the region it was last seen as.
    pub area: u64,
    /// When the target was last refreshed.
    pub last_seen: Instant,
}

/// Outcome of one tracking cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// A qualifying candidate was found this cycle.
    Tracking(TrackedTarget),
    /// Nothing qualified; the remembered target is reported as-is.
    LastSeen(TrackedTarget),
    /// Nothing qualified and nothing has ever been tracked.
    NoTarget,
}

impl TrackStatus {
    pub fn target(&self) -> Option<&TrackedTarget> {
        match self {
            Self::Tracking(target) | Self::LastSeen(target) => Some(target),
            Self::NoTarget => None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Tracking(_))
    }
}

#[derive(Debug, Clone)]
pub struct TargetTracker {
    min_area: u64,
    target: Option<TrackedTarget>,
}

impl TargetTracker {
    pub fn new(min_area: u64) -> Self {
        Self {
            min_area,
            target: None,
        }
    }

    pub fn min_area(&self) -> u64 {
        self.min_area
    }

    pub fn target(&self) -> Option<&TrackedTarget> {
        self.target.as_ref()
    }

    /// Picks the winning candidate for this cycle, if any.
    pub fn select<'a>(&self, candidates: &'a [TargetCandidate]) -> Option<&'a TargetCandidate> {
        let mut best: Option<&TargetCandidate> = None;
        for candidate in candidates {
            if candidate.area <= self.min_area || candidate.moments.m00 == 0 {
                continue;
            }
            match best {
                Some(current) if candidate.area <= current.area => {}
                _ => best = Some(candidate),
            }
        }
        best
    }

    pub fn update(&mut self, candidates: &[TargetCandidate], now: Instant) -> TrackStatus {
        let winner = self
            .select(candidates)
            .and_then(|candidate| Some((candidate.centroid()?, candidate.area)));

        match (winner, self.target) {
            (Some((position, area)), _) => {
                let target = TrackedTarget {
                    position,
                    area,
                    last_seen: now,
                };
                self.target = Some(target);
                TrackStatus::Tracking(target)
            }
            (None, Some(target)) => TrackStatus::LastSeen(target),
            (None, None) => TrackStatus::NoTarget,
        }
    }

    pub fn reset(&mut self) {
        self.target = None;
    }
}

impl Default for TargetTracker {
    fn default() -> Self {
        Self::new(500)
    }
}
