//! Per-session progress notifications.
//!
//! Every session gets a fresh [`EventStream`]. Subscribers only see events
//! emitted after they subscribed, and nothing once the stream has ended
//! with `complete` or `error`.

use crate::error::Error;
use crate::types::Address;

/// Progress of the current message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A byte of a non-batch response.
    ResponseByte { node: Address, value: u8 },
    /// A node's response section in a batch message is complete.
    NodeResponse { node: usize, data: Vec<u8> },
    /// A node accepted an address. `node` is the new node count.
    Addressed { node: u8 },
    /// A node echoed an unexpected address during addressing.
    AddressRejected {
        /// `u16` so the address after 255 can be expressed.
        expected: u16,
        received: u8,
        corrections: u8,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventKind {
    Response,
    Addressing,
    Error,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ResponseByte { .. } | Self::NodeResponse { .. } => EventKind::Response,
            Self::Addressed { .. } => EventKind::Addressing,
            Self::AddressRejected { .. } => EventKind::Error,
        }
    }
}

type NextFn = Box<dyn FnMut(&Event)>;
type ErrorFn = Box<dyn FnMut(&Error)>;
type CompleteFn = Box<dyn FnMut()>;

struct Subscriber {
    next: NextFn,
    error: ErrorFn,
    complete: CompleteFn,
}

/// Hot multicast sink. Callbacks run synchronously in subscription order.
#[derive(Default)]
pub(crate) struct EventStream {
    subscribers: Vec<Subscriber>,
    finished: bool,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        next: impl FnMut(&Event) + 'static,
        error: impl FnMut(&Error) + 'static,
        complete: impl FnMut() + 'static,
    ) {
        if self.finished {
            return;
        }
        self.subscribers.push(Subscriber {
            next: Box::new(next),
            error: Box::new(error),
            complete: Box::new(complete),
        });
    }

    pub fn next(&mut self, event: &Event) {
        if self.finished {
            return;
        }
        for s in self.subscribers.iter_mut() {
            (s.next)(event);
        }
    }

    pub fn error(&mut self, error: &Error) {
        if self.finished {
            return;
        }
        self.finished = true;
        for s in self.subscribers.iter_mut() {
            (s.error)(error);
        }
        self.subscribers.clear();
    }

    pub fn complete(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        for s in self.subscribers.iter_mut() {
            (s.complete)();
        }
        self.subscribers.clear();
    }
}

impl core::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscribers.len())
            .field("finished", &self.finished)
            .finish()
    }
}
