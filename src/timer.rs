//! The response timeout. At most one timer is armed at a time; arming a
//! new one, or closing the session, invalidates the previous token.

use core::time::Duration;

/// Timeout durations, independently configurable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed between bytes while waiting for a node's response.
    pub node_response: Duration,
    /// Time allowed between address echoes during addressing. Longer than
    /// `node_response` to absorb the per-hop forwarding latency.
    pub addressing: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            node_response: Duration::from_millis(100),
            addressing: Duration::from_millis(1000),
        }
    }
}

/// Identifies one arming of the timer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerToken(u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimeoutKind {
    NodeResponse,
    Addressing,
}

/// The timer the driver should be running.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArmedTimer {
    pub token: TimerToken,
    pub kind: TimeoutKind,
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct TimeoutManager {
    generation: u32,
    armed: Option<ArmedTimer>,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: TimeoutKind, timeouts: &Timeouts) -> TimerToken {
        self.generation = self.generation.wrapping_add(1);
        let token = TimerToken(self.generation);
        let duration = match kind {
            TimeoutKind::NodeResponse => timeouts.node_response,
            TimeoutKind::Addressing => timeouts.addressing,
        };
        self.armed = Some(ArmedTimer {
            token,
            kind,
            duration,
        });
        token
    }

    /// Re-arm the current timer with a fresh token. No-op when disarmed.
    pub fn restart(&mut self, timeouts: &Timeouts) {
        if let Some(armed) = self.armed {
            self.arm(armed.kind, timeouts);
        }
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn armed(&self) -> Option<ArmedTimer> {
        self.armed
    }

    /// Disarm and return the kind if `token` is the armed timer.
    pub fn expire(&mut self, token: TimerToken) -> Option<TimeoutKind> {
        match self.armed {
            Some(armed) if armed.token == token => {
                self.armed = None;
                Some(armed.kind)
            }
            _ => None,
        }
    }
}
