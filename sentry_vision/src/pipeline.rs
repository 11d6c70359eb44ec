// THEORY:
// The `pipeline` module is the top-level API of the vision crate. It chains the
// per-cycle stages into one call:
//
//     Frame -> FrameProcessor -> TargetTracker -> MotionDecision -> CommandDispatcher
//
// `process_frame` runs synchronously on the capture thread. The only side
// effect that leaves the pipeline is the `CommandSink::submit` call inside the
// dispatcher, which is bounded in time; the capture cadence never waits on
// network I/O.

use std::time::Instant;

use tracing::{debug, trace};

use crate::config::VisionConfig;
use crate::core_modules::decision::MotionDecision;
use crate::core_modules::dispatcher::{CommandDispatcher, CommandSink};
use crate::core_modules::frame::Frame;
use crate::core_modules::frame_processor::FrameProcessor;
use crate::core_modules::mask::BinaryMask;
use crate::core_modules::pixel::ColorThreshold;
use crate::core_modules::tracker::TargetTracker;

// Re-export key data structures for the public API.
pub use crate::core_modules::candidate::TargetCandidate;
pub use crate::core_modules::decision::{AxisPolicy, Guidance};
pub use crate::core_modules::dispatcher::Dispatch;
pub use crate::core_modules::frame::PixelPoint;
pub use crate::core_modules::tracker::{TrackStatus, TrackedTarget};

/// Everything that happened in one capture cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub candidates: Vec<TargetCandidate>,
    pub status: TrackStatus,
    pub guidance: Guidance,
    pub dispatch: Dispatch,
}

/// The main, top-level struct for the tracking engine.
pub struct TrackingPipeline {
    processor: FrameProcessor,
    tracker: TargetTracker,
    decision: MotionDecision,
    dispatcher: CommandDispatcher,
    last_mask: Option<BinaryMask>,
}

impl TrackingPipeline {
    pub fn new(config: &VisionConfig) -> Self {
        let detection = &config.detection;
        Self {
            processor: FrameProcessor::new(
                ColorThreshold::new(detection.ranges.clone()),
                detection.blur_kernel,
                detection.morph_kernel,
            ),
            tracker: TargetTracker::new(config.tracking.min_area),
            decision: MotionDecision::new(config.tracking.deadzone, config.tracking.axis_policy),
            dispatcher: CommandDispatcher::new(
                config.dispatch.resend_interval(),
                config.dispatch.speed,
            ),
            last_mask: None,
        }
    }

    pub fn process_frame<S>(&mut self, frame: &Frame, now: Instant, sink: &S) -> CycleReport
    where
        S: CommandSink + ?Sized,
    {
        let detection = self.processor.process(frame);
        let status = self.tracker.update(&detection.candidates, now);
        let guidance = self.decision.decide(&status, frame.center());
        let dispatch = self.dispatcher.dispatch(&guidance, now, sink);

        trace!(candidates = detection.candidates.len(), %guidance, "cycle complete");
        if let Dispatch::Sent(id) = &dispatch {
            debug!(%id, %guidance, "command queued");
        }

        self.last_mask = Some(detection.mask);
        CycleReport {
            candidates: detection.candidates,
            status,
            guidance,
            dispatch,
        }
    }

    /// The cleaned mask from the most recent cycle, for display.
    pub fn get_last_mask(&self) -> Option<&BinaryMask> {
        self.last_mask.as_ref()
    }

    pub fn tracked_target(&self) -> Option<&TrackedTarget> {
        self.tracker.target()
    }

    /// Forgets the tracked target and the last dispatched intent.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.dispatcher.reset();
        self.last_mask = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::dispatcher::tests::RecordingSink;
    use crate::protocol::{PanDir, ServerMessage, TiltDir};
    use std::time::Duration;

    const BACKGROUND: [u8; 3] = [70, 80, 75];
    const RED: [u8; 3] = [20, 20, 220];

    fn frame_with_target(cx: u32, cy: u32, half: u32) -> Frame {
        let mut frame = Frame::filled(320, 240, BACKGROUND).expect("frame");
        for y in cy - half..cy + half {
            for x in cx - half..cx + half {
                frame.set_pixel(x, y, RED);
            }
        }
        frame
    }

    #[test]
    fn target_left_of_center_sends_move_dir_left() {
        let mut pipeline = TrackingPipeline::new(&VisionConfig::default());
        let sink = RecordingSink::default();
        let frame = frame_with_target(80, 120, 20);

        let report = pipeline.process_frame(&frame, Instant::now(), &sink);

        let target = report.status.target().expect("tracked");
        assert!((target.position.x - 80).abs() <= 1);
        assert_eq!(report.guidance.to_string(), "Pan: LEFT | Tilt: NONE");
        assert!(matches!(report.dispatch, Dispatch::Sent(_)));

        let sent = sink.sent.borrow();
        assert_eq!(sent.len(), 1);
        match &sent[0].message {
            ServerMessage::MoveDir { id, pan_dir, tilt_dir, speed } => {
                assert_eq!(Some(id), report.dispatch.command_id());
                assert_eq!(*pan_dir, PanDir::Left);
                assert_eq!(*tilt_dir, TiltDir::None);
                assert_eq!(*speed, 2);
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(pipeline.get_last_mask().is_some_and(|mask| mask.count() > 500));
    }

    #[test]
    fn empty_scene_reports_no_target_and_sends_nothing() {
        let mut pipeline = TrackingPipeline::new(&VisionConfig::default());
        let sink = RecordingSink::default();
        let frame = Frame::filled(320, 240, BACKGROUND).expect("frame");
        let start = Instant::now();

        for cycle in 0..3u64 {
            let report = pipeline.process_frame(&frame, start + Duration::from_millis(150 * cycle), &sink);
            assert_eq!(report.guidance.to_string(), "No Target");
            assert_eq!(report.dispatch, Dispatch::Suppressed);
        }
        assert!(sink.sent.borrow().is_empty());
    }

    #[test]
    fn lost_target_shows_last_seen_and_settles() {
        let mut pipeline = TrackingPipeline::new(&VisionConfig::default());
        let sink = RecordingSink::default();
        let start = Instant::now();

        pipeline.process_frame(&frame_with_target(260, 120, 20), start, &sink);
        let empty = Frame::filled(320, 240, BACKGROUND).expect("frame");
        let mut reports = Vec::new();
        for cycle in 1..=4u64 {
            reports.push(pipeline.process_frame(&empty, start + Duration::from_millis(150 * cycle), &sink));
        }

        assert!(reports.iter().all(|r| r.guidance.to_string() == "Last seen"));
        assert!(matches!(reports[0].dispatch, Dispatch::Sent(_)));
        assert!(reports[1..].iter().all(|r| r.dispatch == Dispatch::Suppressed));
        assert_eq!(sink.sent.borrow().len(), 2);

        pipeline.reset();
        let report = pipeline.process_frame(&empty, start + Duration::from_secs(2), &sink);
        assert_eq!(report.guidance, Guidance::NoTarget);
    }

    #[test]
    fn centered_target_keeps_the_actuator_idle() {
        let mut pipeline = TrackingPipeline::new(&VisionConfig::default());
        let sink = RecordingSink::default();
        let report = pipeline.process_frame(&frame_with_target(165, 118, 20), Instant::now(), &sink);
        assert!(matches!(report.guidance, Guidance::Centered(_)));
        assert!(report.guidance.intent().is_idle());
    }
}
