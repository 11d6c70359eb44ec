// THEORY:
// Actuators answer commands with ACK and STATUS messages that carry the
// command's id. The `Correlator` remembers recently sent commands so those
// replies can be matched back: which kind of command it was and how long the
// round trip took.
//
// The table is a bounded FIFO. Lookups do not remove entries, because one
// command usually gets both an ACK and one or more STATUS reports; old ids
// simply fall off the end once capacity is reached.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sentry_vision::protocol::CommandId;

/// A reply matched to an outstanding command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlated {
    /// Wire type of the command being answered.
    pub kind: &'static str,
    /// Time between sending the command and receiving the reply.
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct Correlator {
    capacity: usize,
    order: VecDeque<CommandId>,
    pending: HashMap<CommandId, (&'static str, Instant)>,
}

impl Correlator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            pending: HashMap::new(),
        }
    }

    pub fn record(&mut self, id: CommandId, kind: &'static str, sent_at: Instant) {
        if self.pending.insert(id.clone(), (kind, sent_at)).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.pending.remove(&oldest);
            }
        }
    }

    pub fn lookup(&self, id: &CommandId, now: Instant) -> Option<Correlated> {
        self.pending.get(id).map(|&(kind, sent_at)| Correlated {
            kind,
            elapsed: now.saturating_duration_since(sent_at),
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
