// THEORY:
// The `CommandDispatcher` is the last stage of the capture cycle and the only
// one that produces output for the network. It debounces the per-cycle intent
// into a sparse stream of `MOVE_DIR` commands:
//
// - a command goes out when the intent differs from the last one dispatched
// - while the target stays visible, the same intent is repeated once the
//   resend interval has elapsed, so the actuator keeps moving
// - while the target is lost, a settled idle intent is never repeated
//
// Every command gets a fresh id. Handing it to the network goes through the
// `CommandSink` trait, which must return within a bounded time. A failed
// handoff is logged and the dispatcher still records the intent as sent: a
// server that is down must not turn every following cycle into a retry.

use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::core_modules::decision::Guidance;
use crate::error::HandoffError;
use crate::protocol::{CommandId, MotionCommand, MotionIntent};

/// The receiving end of the capture-to-network handoff.
pub trait CommandSink {
    /// Queues `command` for broadcast. Must not block longer than the
    /// implementation's handoff timeout.
    fn submit(&self, command: MotionCommand) -> Result<(), HandoffError>;
}

impl<S: CommandSink + ?Sized> CommandSink for &S {
    fn submit(&self, command: MotionCommand) -> Result<(), HandoffError> {
        (**self).submit(command)
    }
}

/// What the dispatcher did this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Sent(CommandId),
    Suppressed,
    Failed { id: CommandId, error: HandoffError },
}

impl Dispatch {
    pub fn command_id(&self) -> Option<&CommandId> {
        match self {
            Self::Sent(id) | Self::Failed { id, .. } => Some(id),
            Self::Suppressed => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    resend_interval: Duration,
    speed: u8,
    last_intent: MotionIntent,
    last_dispatch: Option<Instant>,
}

impl CommandDispatcher {
    pub fn new(resend_interval: Duration, speed: u8) -> Self {
        Self {
            resend_interval,
            speed,
            last_intent: MotionIntent::IDLE,
            last_dispatch: None,
        }
    }

    pub fn last_intent(&self) -> MotionIntent {
        self.last_intent
    }

    /// Whether `guidance` warrants a command at `now`.
    pub fn should_dispatch(&self, guidance: &Guidance, now: Instant) -> bool {
        if guidance.intent() != self.last_intent {
            return true;
        }
        if !guidance.target_visible() {
            return false;
        }
        match self.last_dispatch {
            Some(at) => now.saturating_duration_since(at) >= self.resend_interval,
            None => true,
        }
    }

    pub fn dispatch<S>(&mut self, guidance: &Guidance, now: Instant, sink: &S) -> Dispatch
    where
        S: CommandSink + ?Sized,
    {
        if !self.should_dispatch(guidance, now) {
            return Dispatch::Suppressed;
        }

        let intent = guidance.intent();
        let command = MotionCommand::directional(intent, self.speed);
        let Some(id) = command.id().cloned() else {
            return Dispatch::Suppressed;
        };

        self.last_intent = intent;
        self.last_dispatch = Some(now);

        match sink.submit(command) {
            Ok(()) => {
                debug!(%id, %intent, "dispatched MOVE_DIR");
                Dispatch::Sent(id)
            }
            Err(err) => {
                error!(%id, %intent, error = %err, "failed to hand off command");
                Dispatch::Failed { id, error: err }
            }
        }
    }

    /// Forgets the last dispatched intent, so the next cycle always sends.
    pub fn reset(&mut self) {
        self.last_intent = MotionIntent::IDLE;
        self.last_dispatch = None;
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 2)
    }
}
