//! Error type shared by the whole engine.

use snafu::Snafu;

/// Errors reported by the bus master.
///
/// Precondition errors (`SessionBusy`, `NoTransport`, `InvalidOptions`) are
/// only returned to the caller. Everything else is also passed to the error
/// listeners, and to the session's event stream when it ends the session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A message session is already open.
    #[snafu(display("A message session is already open (command {:#04x})", command))]
    SessionBusy { command: u8 },

    /// No transport is attached to the master.
    #[snafu(display("No transport attached"))]
    NoTransport,

    /// The message options contradict each other.
    #[snafu(display("Invalid message options: {}", reason))]
    InvalidOptions { reason: &'static str },

    /// The operation requires an open message session.
    #[snafu(display("No message session is open"))]
    NoOpenSession,

    /// Sending the data would exceed the expected message length.
    #[snafu(display(
        "Data overflow: {} bytes sent, {} more would exceed {}",
        sent,
        len,
        total
    ))]
    DataOverflow { sent: usize, len: usize, total: usize },

    /// The message can't be closed before the full response has arrived.
    #[snafu(display("Incomplete response: {} of {} bytes received", received, expected))]
    IncompleteResponse { received: usize, expected: usize },

    /// A node echoed an unexpected address during addressing.
    #[snafu(display("Address mismatch: expected {}, received {}", expected, received))]
    AddressMismatch {
        /// `u16` so the address after 255 can be expressed.
        expected: u16,
        received: u8,
    },

    /// Addressing was aborted after too many address corrections.
    #[snafu(display("max address corrections ({})", corrections))]
    MaxAddressCorrections { corrections: u8 },

    /// The message was ended by the caller with an error.
    #[snafu(display("Message aborted: {}", reason))]
    Aborted { reason: String },

    /// The transport failed to write, flush or set the control line.
    #[snafu(display("Transport error: {}", source))]
    Io { source: std::io::Error },
}

impl Error {
    /// Create an [`Error::Aborted`] with the given reason.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// True for errors that are detected before a session is created.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::SessionBusy { .. } | Self::NoTransport | Self::InvalidOptions { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}
