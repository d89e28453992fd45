//! Sequential address assignment.
//!
//! The master opens a batch response message for the ADDRESS command,
//! raises the control line and transmits the first free address. Each node
//! in turn takes the address it sees, and echoes the next one. The master
//! confirms every echo equal to `node_count + 1` by transmitting it back,
//! and answers anything else with a correction `[0x00, node_count]` asking
//! the bus to retry from the last confirmed address. Addressing ends when
//! no echo arrives before the addressing timeout.

use log::{debug, info};

use crate::error::{AddressMismatchSnafu, Error, MaxAddressCorrectionsSnafu, SessionBusySnafu};
use crate::event::Event;
use crate::frame::{NULL_FRAME, SYNC};
use crate::master::{Master, Message, Session, Transport};
use crate::timer::TimeoutKind;
use crate::types::{command, MessageOptions};

/// Address corrections allowed before addressing is aborted.
pub const MAX_ADDRESS_CORRECTIONS: u8 = 10;

/// Response section length of the ADDRESS message.
pub const ADDRESS_PER_NODE_LENGTH: u8 = 2;

#[derive(Debug)]
pub(crate) struct Addressing {
    pub message: Message,
    pub corrections: u8,
}

impl<T: Transport> Master<T> {
    /// Assign addresses to the unaddressed nodes, starting after
    /// `start_from`. Starting from 0 first broadcasts a RESET, clearing
    /// every address on the bus.
    ///
    /// Progress is reported as [`Event::Addressed`] on the event stream,
    /// which completes when no further node answers. The final count is
    /// available from [`Master::node_count`].
    /// # Errors
    /// The precondition errors of [`Master::start_message`], and transport
    /// failures.
    pub fn start_addressing(&mut self, start_from: u8) -> Result<(), Error> {
        if let Some(command) = self.current_command() {
            return SessionBusySnafu { command }.fail();
        }

        if start_from == 0 {
            self.start_message(command::RESET, 0, MessageOptions::new())?;
            self.end_message(None)?;
        }

        let previous = core::mem::replace(&mut self.node_count, start_from);
        let opened = self.open(
            command::ADDRESS,
            ADDRESS_PER_NODE_LENGTH,
            MessageOptions::new().batch(true).with_response(),
        );
        let message = match opened {
            Ok(message) => message,
            Err(error) => {
                self.node_count = previous;
                return Err(error);
            }
        };
        self.session = Some(Session::Addressing(Addressing {
            message,
            corrections: 0,
        }));

        let started = self
            .drain()
            .and_then(|_| self.set_control_line(true))
            .and_then(|_| self.transmit(&[start_from]));
        self.fault_on_err(started)?;
        self.timer.arm(TimeoutKind::Addressing, &self.timeouts);
        info!("Addressing started from {}", start_from);
        Ok(())
    }

    /// Handle inbound data during addressing. Only the last byte of the
    /// chunk is the candidate address.
    pub(crate) fn receive_address(&mut self, data: &[u8]) -> Result<(), Error> {
        let received = match data.last() {
            Some(&byte) => byte,
            None => return Ok(()),
        };
        let expected = u16::from(self.node_count) + 1;

        if u16::from(received) == expected {
            self.node_count = received;
            if let Some(Session::Addressing(addressing)) = &mut self.session {
                addressing.corrections = 0;
            }
            let echoed = self.transmit(&[received]);
            self.fault_on_err(echoed)?;
            debug!("Node {} addressed", received);
            self.stream.next(&Event::Addressed { node: received });
            self.timer.arm(TimeoutKind::Addressing, &self.timeouts);
            return Ok(());
        }

        let corrections = match &mut self.session {
            Some(Session::Addressing(addressing)) => {
                addressing.corrections = addressing.corrections.saturating_add(1);
                addressing.corrections
            }
            _ => return Ok(()),
        };
        self.stream.next(&Event::AddressRejected {
            expected,
            received,
            corrections,
        });
        self.report(AddressMismatchSnafu { expected, received }.build());

        if corrections > MAX_ADDRESS_CORRECTIONS {
            let error = self.report(
                MaxAddressCorrectionsSnafu {
                    corrections: MAX_ADDRESS_CORRECTIONS,
                }
                .build(),
            );
            return self.close_addressing(Some(error));
        }

        let correction = [0x00, self.node_count];
        let sent = self.transmit(&correction);
        self.fault_on_err(sent)?;
        self.timer.arm(TimeoutKind::Addressing, &self.timeouts);
        Ok(())
    }

    /// Close the ADDRESS message and send the postamble: release the
    /// control line, mark the end with a sync pair unless the bus is full,
    /// then a NULL frame so the trailing `0xFF 0xFF` isn't taken as the
    /// start of another frame.
    pub(crate) fn close_addressing(&mut self, error: Option<Error>) -> Result<(), Error> {
        self.timer.cancel();
        let trailer = self
            .send_crc()
            .and_then(|_| self.set_control_line(false))
            .and_then(|_| {
                if self.node_count < u8::MAX {
                    self.write_raw(&SYNC)?;
                }
                self.crc.reset();
                self.transmit(&NULL_FRAME)?;
                self.send_crc()
            });
        self.end_addressing();
        self.conclude(error, trailer)
    }

    fn end_addressing(&mut self) {
        if let Some(Session::Addressing(addressing)) = self.session.take() {
            info!(
                "Addressing finished with {} nodes after {} corrections",
                self.node_count, addressing.corrections
            );
        }
    }
}
