//! Bus master protocol engine.
//!
//! The engine is sans-io: it writes through a [`Transport`], is told about
//! inbound data with [`Master::receive_data`], and exposes the single timer
//! it wants running through [`Master::timer`]. The driver reports expiry
//! with [`Master::timeout_expired`].
//!
//! # Example
//!
//! ```
//! use multidrop_proto::{Master, MessageOptions, Transport};
//! # use std::io;
//! # #[derive(Default)]
//! # struct Wire(Vec<u8>);
//! # impl Transport for Wire {
//! #     fn write(&mut self, data: &[u8]) -> io::Result<()> { self.0.extend_from_slice(data); Ok(()) }
//! #     fn drain(&mut self) -> io::Result<()> { Ok(()) }
//! #     fn set_control_line(&mut self, _enabled: bool) -> io::Result<()> { Ok(()) }
//! # }
//! # fn main() -> Result<(), multidrop_proto::Error> {
//! let mut master = Master::new(Wire::default());
//! master.start_message(0x09, 2, MessageOptions::new().to(5))?;
//! master.send_data(&[1, 2])?;
//! master.end_message(None)?;
//! assert_eq!(
//!     master.transport().unwrap().0,
//!     [0xFF, 0xFF, 0x00, 0x05, 0x09, 0x01, 0x02, 0x01, 0x02, 0x39, 0xE7]
//! );
//! # Ok(()) }
//! ```

use log::{debug, trace, warn};
use snafu::{ensure, OptionExt};
use std::io;

use crate::addressing::Addressing;
use crate::checksum::Accumulator;
use crate::error::{
    DataOverflowSnafu, Error, IncompleteResponseSnafu, NoOpenSessionSnafu, NoTransportSnafu,
    SessionBusySnafu,
};
use crate::event::{Event, EventStream};
use crate::frame::{encode_crc, Header, SYNC};
use crate::response::{Collector, ResponseBuffer};
use crate::timer::{ArmedTimer, TimeoutKind, TimeoutManager, TimerToken, Timeouts};
use crate::types::{command, Address, Flags, MessageOptions};

/// Byte-level access to the bus.
///
/// Each call returns once the operation has completed, so the engine
/// proceeds step by step: flush, toggle the control line, send, arm.
pub trait Transport {
    /// Queue bytes for transmission.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
    /// Block until every written byte has left the transmitter.
    fn drain(&mut self) -> io::Result<()>;
    /// Set the daisy/control line and wait until it has changed.
    fn set_control_line(&mut self, enabled: bool) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data)
    }

    fn drain(&mut self) -> io::Result<()> {
        (**self).drain()
    }

    fn set_control_line(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_control_line(enabled)
    }
}

/// State of an open message.
#[derive(Debug)]
pub(crate) struct Message {
    pub command: u8,
    pub destination: Address,
    pub flags: Flags,
    pub per_node_length: u8,
    /// `per_node_length * node_count` in batch mode, else `per_node_length`.
    pub total: usize,
    pub bytes_sent: usize,
    pub collector: Collector,
    /// Exactly `per_node_length` bytes.
    pub response_default: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum Session {
    Standard(Message),
    Addressing(Addressing),
}

impl Session {
    fn message(&self) -> &Message {
        match self {
            Self::Standard(message) => message,
            Self::Addressing(addressing) => &addressing.message,
        }
    }

    fn into_message(self) -> Message {
        match self {
            Self::Standard(message) => message,
            Self::Addressing(addressing) => addressing.message,
        }
    }
}

type ErrorListener = Box<dyn FnMut(&Error)>;

/// The bus master. Owns the transport and at most one open message.
pub struct Master<T> {
    transport: Option<T>,
    pub(crate) session: Option<Session>,
    pub(crate) node_count: u8,
    pub(crate) crc: Accumulator,
    pub(crate) timer: TimeoutManager,
    pub(crate) timeouts: Timeouts,
    pub(crate) stream: EventStream,
    error_listeners: Vec<ErrorListener>,
    last_response: Option<ResponseBuffer>,
}

impl<T: Transport> Master<T> {
    pub fn new(transport: T) -> Self {
        let mut master = Self::detached();
        master.transport = Some(transport);
        master
    }

    /// Create a master without a transport. Sessions fail with
    /// [`Error::NoTransport`] until one is attached.
    pub fn detached() -> Self {
        Self {
            transport: None,
            session: None,
            node_count: 0,
            crc: Accumulator::new(),
            timer: TimeoutManager::new(),
            timeouts: Timeouts::default(),
            stream: EventStream::new(),
            error_listeners: Vec::new(),
            last_response: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Attach a transport, returning the previous one.
    pub fn attach_transport(&mut self, transport: T) -> Option<T> {
        self.transport.replace(transport)
    }

    /// Remove the transport. The current session, if any, is dropped
    /// without further bus traffic.
    pub fn detach_transport(&mut self) -> Option<T> {
        if self.session.is_some() {
            self.abort(&Error::NoTransport);
        }
        self.transport.take()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    /// Number of nodes assigned an address by the last addressing run.
    pub fn node_count(&self) -> u8 {
        self.node_count
    }

    /// Response data of the latest response message that completed.
    /// Aborted messages and messages without a response leave it as is.
    pub fn last_response(&self) -> Option<&ResponseBuffer> {
        self.last_response.as_ref()
    }

    /// Command of the open message.
    pub fn current_command(&self) -> Option<u8> {
        self.session.as_ref().map(|s| s.message().command)
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn timeouts_mut(&mut self) -> &mut Timeouts {
        &mut self.timeouts
    }

    /// The timer the driver should be running, if any.
    pub fn timer(&self) -> Option<ArmedTimer> {
        self.timer.armed()
    }

    /// Register a bus-wide listener for runtime errors. Listeners persist
    /// across sessions.
    pub fn add_error_listener(&mut self, listener: impl FnMut(&Error) + 'static) {
        self.error_listeners.push(Box::new(listener));
    }

    /// Subscribe to the events of the open message.
    /// # Errors
    /// Returns [`Error::NoOpenSession`] when idle.
    pub fn subscribe(
        &mut self,
        next: impl FnMut(&Event) + 'static,
        error: impl FnMut(&Error) + 'static,
        complete: impl FnMut() + 'static,
    ) -> Result<(), Error> {
        ensure!(self.session.is_some(), NoOpenSessionSnafu);
        self.stream.subscribe(next, error, complete);
        Ok(())
    }

    /// Open a message and transmit its header.
    ///
    /// For response messages the node response timer is armed once the
    /// header has been flushed, and the message closes by itself when the
    /// full response has arrived or been filled in.
    /// # Errors
    /// [`Error::SessionBusy`], [`Error::NoTransport`] or
    /// [`Error::InvalidOptions`] if the message can't be opened,
    /// [`Error::Io`] if the header couldn't be sent.
    pub fn start_message(
        &mut self,
        command: u8,
        per_node_length: u8,
        options: MessageOptions,
    ) -> Result<(), Error> {
        let message = self.open(command, per_node_length, options)?;
        let await_response = message.flags.response() && command != command::ADDRESS;
        self.session = Some(Session::Standard(message));

        if await_response {
            let flushed = self.drain();
            self.fault_on_err(flushed)?;
            self.timer.arm(TimeoutKind::NodeResponse, &self.timeouts);
        }
        Ok(())
    }

    /// Transmit message data.
    /// # Errors
    /// [`Error::NoOpenSession`] when idle. [`Error::DataOverflow`] if the
    /// data doesn't fit in the message; nothing is sent and the message is
    /// aborted.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        let (sent, total) = match &self.session {
            Some(Session::Standard(m)) => (m.bytes_sent, m.total),
            Some(Session::Addressing(_)) => {
                return SessionBusySnafu {
                    command: command::ADDRESS,
                }
                .fail()
            }
            None => return Err(self.report(Error::NoOpenSession)),
        };
        if sent + data.len() > total {
            let error = self.report(
                DataOverflowSnafu {
                    sent,
                    len: data.len(),
                    total,
                }
                .build(),
            );
            self.abort(&error);
            return Err(error);
        }

        let written = self.transmit(data);
        self.fault_on_err(written)?;
        if let Some(Session::Standard(m)) = &mut self.session {
            m.bytes_sent += data.len();
        }
        Ok(())
    }

    /// Close the open message: pad unsent data with zeros, transmit the CRC
    /// and end the event stream with `error`, or `complete` once the
    /// transport has flushed.
    /// # Errors
    /// [`Error::NoOpenSession`] when idle. [`Error::IncompleteResponse`]
    /// while response data is outstanding; the message stays open.
    pub fn end_message(&mut self, error: Option<Error>) -> Result<(), Error> {
        let message = match &self.session {
            Some(Session::Standard(m)) => m,
            Some(Session::Addressing(_)) => return self.close_addressing(error),
            None => return Err(self.report(Error::NoOpenSession)),
        };

        if message.flags.response() {
            if !message.collector.is_complete() {
                let incomplete = IncompleteResponseSnafu {
                    received: message.collector.received(),
                    expected: message.collector.total(),
                }
                .build();
                return Err(self.report(incomplete));
            }
        } else if message.bytes_sent < message.total {
            let padding = vec![0; message.total - message.bytes_sent];
            self.send_data(&padding)?;
        }
        self.close(error)
    }

    /// Feed inbound bytes from the bus. Restarts the timer.
    /// # Errors
    /// Transport failures while closing a completed message; these are
    /// also reported to the listeners.
    pub fn receive_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        self.timer.restart(&self.timeouts);

        let stream = &mut self.stream;
        let complete = match &mut self.session {
            Some(Session::Addressing(_)) => return self.receive_address(data),
            Some(Session::Standard(m)) if m.flags.response() => {
                trace!("{} response bytes received", data.len());
                m.collector.push(data, &mut self.crc, |event| stream.next(&event));
                m.collector.is_complete()
            }
            Some(Session::Standard(_)) => {
                trace!("Ignoring {} bytes, no response requested", data.len());
                return Ok(());
            }
            None => {
                trace!("Ignoring {} bytes, no open session", data.len());
                return Ok(());
            }
        };

        if complete {
            self.close(None)
        } else {
            Ok(())
        }
    }

    /// The driver's timer fired. Tokens of timers that were re-armed or
    /// cancelled are ignored.
    /// # Errors
    /// Transport failures, which are also reported to the listeners.
    pub fn timeout_expired(&mut self, token: TimerToken) -> Result<(), Error> {
        if self.timer.expire(token).is_none() {
            trace!("Ignoring stale timer {:?}", token);
            return Ok(());
        }
        match &self.session {
            Some(Session::Addressing(_)) => {
                debug!("Addressing timed out after {} nodes", self.node_count);
                self.close_addressing(None)
            }
            Some(Session::Standard(_)) => self.fill_next_response(),
            None => Ok(()),
        }
    }

    /// Substitute the default data for the pending response section,
    /// recording it like received data and echoing it on the bus.
    fn fill_next_response(&mut self) -> Result<(), Error> {
        let stream = &mut self.stream;
        let (fill, complete) = match &mut self.session {
            Some(Session::Standard(m)) => {
                let fill = m.collector.missing_fill(&m.response_default);
                m.collector.push(&fill, &mut self.crc, |event| stream.next(&event));
                (fill, m.collector.is_complete())
            }
            _ => return Ok(()),
        };
        debug!("Response timeout, filled {} bytes", fill.len());

        if !fill.is_empty() {
            let written = self.write_raw(&fill);
            self.fault_on_err(written)?;
        }
        if complete {
            self.close(None)
        } else {
            let flushed = self.drain();
            self.fault_on_err(flushed)?;
            self.timer.arm(TimeoutKind::NodeResponse, &self.timeouts);
            Ok(())
        }
    }

    /// Check the preconditions and open a message: reset the CRC, start a
    /// fresh event stream and transmit the header.
    pub(crate) fn open(
        &mut self,
        command: u8,
        per_node_length: u8,
        options: MessageOptions,
    ) -> Result<Message, Error> {
        if let Some(session) = &self.session {
            return SessionBusySnafu {
                command: session.message().command,
            }
            .fail();
        }
        ensure!(self.transport.is_some(), NoTransportSnafu);
        let options = options.resolve(per_node_length)?;

        let batch = options.flags.batch();
        let header = Header {
            flags: options.flags,
            destination: options.destination,
            command,
            node_count: if options.destination.is_broadcast() {
                self.node_count
            } else {
                1
            },
            per_node_length,
        };
        let collector = Collector::new(options.destination, per_node_length, self.node_count, batch);
        let message = Message {
            command,
            destination: options.destination,
            flags: options.flags,
            per_node_length,
            total: collector.total(),
            bytes_sent: 0,
            collector,
            response_default: options.response_default,
        };

        self.timer.cancel();
        self.stream = EventStream::new();
        self.crc.reset();
        debug!(
            "Opening message {:#04x} to {}, flags {:#04x}, {} bytes ({} per node)",
            command,
            *message.destination,
            message.flags.bits(),
            message.total,
            message.per_node_length
        );

        let sent = self
            .write_raw(&SYNC)
            .and_then(|_| self.transmit(&header.to_bytes()));
        if let Err(error) = sent {
            return Err(self.report(error));
        }
        Ok(message)
    }

    /// Transmit the CRC, release the control line and end the stream.
    pub(crate) fn close(&mut self, error: Option<Error>) -> Result<(), Error> {
        self.timer.cancel();
        let trailer = self
            .send_crc()
            .and_then(|_| self.set_control_line(false));
        let message = self.end_session();
        let completed = error.is_none();
        self.conclude(error, trailer)?;
        if let Some(message) = message {
            if completed && message.flags.response() {
                self.last_response = Some(message.collector.into_buffer());
            }
        }
        Ok(())
    }

    /// Flush the transport, then signal the outcome on the event stream.
    pub(crate) fn conclude(
        &mut self,
        error: Option<Error>,
        trailer: Result<(), Error>,
    ) -> Result<(), Error> {
        let flushed = trailer.and_then(|_| self.drain());
        match (error, flushed) {
            (None, Ok(())) => {
                self.stream.complete();
                Ok(())
            }
            (Some(error), flushed) => {
                debug!("Message ended with error: {}", error);
                self.stream.error(&error);
                flushed.map_err(|e| self.report(e))
            }
            (None, Err(e)) => {
                let e = self.report(e);
                self.stream.error(&e);
                Err(e)
            }
        }
    }

    /// Drop the open message without further bus traffic and end the
    /// stream with `error`.
    pub(crate) fn abort(&mut self, error: &Error) {
        warn!("Aborting message: {}", error);
        self.timer.cancel();
        if self.end_session().is_some() {
            if let Some(transport) = self.transport.as_mut() {
                if let Err(e) = transport.set_control_line(false) {
                    warn!("Failed to release the control line: {}", e);
                }
            }
        }
        self.stream.error(error);
    }

    fn end_session(&mut self) -> Option<Message> {
        let message = self.session.take()?.into_message();
        debug!("Closed message {:#04x}", message.command);
        Some(message)
    }

    /// Report a transport failure and abort the message.
    pub(crate) fn fault_on_err(&mut self, result: Result<(), Error>) -> Result<(), Error> {
        result.map_err(|error| {
            let error = self.report(error);
            self.abort(&error);
            error
        })
    }

    /// Pass a runtime error to the error listeners.
    pub(crate) fn report(&mut self, error: Error) -> Error {
        warn!("{}", error);
        for listener in self.error_listeners.iter_mut() {
            listener(&error);
        }
        error
    }

    /// Write bytes that count towards the frame CRC.
    pub(crate) fn transmit(&mut self, data: &[u8]) -> Result<(), Error> {
        self.write_raw(data)?;
        self.crc.update(data);
        Ok(())
    }

    pub(crate) fn write_raw(&mut self, data: &[u8]) -> Result<(), Error> {
        self.transport
            .as_mut()
            .context(NoTransportSnafu)?
            .write(data)?;
        Ok(())
    }

    /// Transmit the CRC of everything accumulated since the last reset.
    pub(crate) fn send_crc(&mut self) -> Result<(), Error> {
        let covered = self.crc.len();
        let crc = self.crc.finalize();
        trace!("CRC {:#06x} over {} bytes", crc, covered);
        self.write_raw(&encode_crc(crc))
    }

    pub(crate) fn drain(&mut self) -> Result<(), Error> {
        self.transport.as_mut().context(NoTransportSnafu)?.drain()?;
        Ok(())
    }

    pub(crate) fn set_control_line(&mut self, enabled: bool) -> Result<(), Error> {
        self.transport
            .as_mut()
            .context(NoTransportSnafu)?
            .set_control_line(enabled)?;
        Ok(())
    }
}
