//! Blocking driver for ports implementing `std::io::{Read, Write}`.
//!
//! The engine itself never blocks or reads a clock. [`run_until_idle`]
//! supplies both: it reads the port, feeds the engine and fires the armed
//! timer by wall clock. The port's read timeout should be well below
//! [`Timeouts::node_response`](crate::Timeouts) so expiry isn't delayed.

use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::Error;
use crate::master::{Master, Transport};
use crate::timer::TimerToken;

/// Ports with a daisy/control line, e.g. RTS on a serial port.
pub trait ControlLine {
    fn set_control_line(&mut self, enabled: bool) -> io::Result<()>;
}

impl<C: ControlLine + ?Sized> ControlLine for &mut C {
    fn set_control_line(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_control_line(enabled)
    }
}

/// [`Transport`] over a writable port.
#[derive(Debug)]
pub struct SerialTransport<P> {
    port: P,
}

impl<P> SerialTransport<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn get_ref(&self) -> &P {
        &self.port
    }

    pub fn get_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P: Write + ControlLine> Transport for SerialTransport<P> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    fn drain(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn set_control_line(&mut self, enabled: bool) -> io::Result<()> {
        self.port.set_control_line(enabled)
    }
}

// Pause after a read that returned nothing without waiting.
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Pump `port` into `master` until no timer is armed, i.e. until the open
/// response or addressing message has closed.
///
/// A standard message that is waiting for [`Master::send_data`] has no
/// timer, so this returns immediately.
/// # Errors
/// Read failures other than timeouts abort the open message. Transport
/// failures from the engine are passed through.
pub fn run_until_idle<T, R>(master: &mut Master<T>, port: &mut R) -> Result<(), Error>
where
    T: Transport,
    R: Read + ?Sized,
{
    let mut buf = [0; 64];
    let mut deadline: Option<(TimerToken, Instant)> = None;

    while let Some(armed) = master.timer() {
        let due = match deadline {
            Some((token, due)) if token == armed.token => due,
            _ => {
                let due = Instant::now() + armed.duration;
                deadline = Some((armed.token, due));
                due
            }
        };
        if Instant::now() >= due {
            trace!("Timer {:?} expired", armed.token);
            master.timeout_expired(armed.token)?;
            continue;
        }

        match port.read(&mut buf) {
            Ok(0) => thread::sleep(IDLE_POLL),
            Ok(len) => master.receive_data(&buf[..len])?,
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(IDLE_POLL),
            Err(e) => return master.fault_on_err(Err(e.into())),
        }
    }
    Ok(())
}
