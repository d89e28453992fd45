//! Bus addresses, header flags, reserved commands and the validated
//! message options used to open a session.

use core::ops::Deref;
use snafu::ensure;

use crate::error::{Error, InvalidOptionsSnafu};

/// Reserved command bytes.
pub mod command {
    /// Clear all node addresses.
    pub const RESET: u8 = 0xFA;
    /// Sequential address assignment.
    pub const ADDRESS: u8 = 0xFB;
    /// Empty frame, sent after addressing.
    pub const NULL: u8 = 0xFF;

    /// Returns true for the command bytes reserved by the protocol.
    pub const fn is_reserved(command: u8) -> bool {
        matches!(command, RESET | ADDRESS | NULL)
    }
}

/// Node address on the bus. Address 0 is the broadcast address.
///
/// ## Example
/// ```
/// use multidrop_proto::Address;
/// let addr = Address::new(5);
/// assert!(!addr.is_broadcast());
/// assert!(Address::BROADCAST.is_broadcast());
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash, Default)]
#[repr(transparent)]
pub struct Address(u8);

impl Address {
    /// The address every node listens to.
    pub const BROADCAST: Address = Address(0);

    pub const fn new(address: u8) -> Self {
        Self(address)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == 0
    }
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u8> for Address {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

impl From<u8> for Address {
    fn from(address: u8) -> Self {
        Self(address)
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// The flags byte of a frame header.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
#[repr(transparent)]
pub struct Flags(u8);

impl Flags {
    /// The message carries one data section per node.
    pub const BATCH: u8 = 0b0000_0001;
    /// The nodes are expected to respond.
    pub const RESPONSE: u8 = 0b0000_0010;

    pub const fn new(batch: bool, response: bool) -> Self {
        let mut bits = 0;
        if batch {
            bits |= Self::BATCH;
        }
        if response {
            bits |= Self::RESPONSE;
        }
        Self(bits)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn batch(self) -> bool {
        self.0 & Self::BATCH != 0
    }

    pub const fn response(self) -> bool {
        self.0 & Self::RESPONSE != 0
    }
}

/// Options for opening a message session.
///
/// ```
/// use multidrop_proto::MessageOptions;
/// let opts = MessageOptions::new().to(5).with_response().response_default(&[0xEE]);
/// let resolved = opts.resolve(2).unwrap();
/// assert_eq!(resolved.response_default, vec![0xEE, 0x00]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageOptions {
    destination: Address,
    batch_mode: Option<bool>,
    response_requested: bool,
    response_default: Vec<u8>,
}

impl MessageOptions {
    /// Broadcast, no batch, no response, all-zero response default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the message to a single node.
    pub fn to(mut self, destination: impl Into<Address>) -> Self {
        self.destination = destination.into();
        self
    }

    /// One data section per addressed node.
    pub fn batch(mut self, batch_mode: bool) -> Self {
        self.batch_mode = Some(batch_mode);
        self
    }

    /// Request a response from the destination node(s).
    pub fn with_response(mut self) -> Self {
        self.response_requested = true;
        self
    }

    /// Data substituted for a node that doesn't respond in time.
    pub fn response_default(mut self, data: &[u8]) -> Self {
        self.response_default = data.to_vec();
        self
    }

    /// Validate the options and normalize the response default to
    /// `per_node_length` bytes.
    /// # Errors
    /// Returns [`Error::InvalidOptions`] if batch mode is requested together
    /// with a unicast destination.
    pub fn resolve(self, per_node_length: u8) -> Result<ResolvedOptions, Error> {
        let broadcast = self.destination.is_broadcast();
        let batch_mode = match self.batch_mode {
            Some(batch) => batch,
            // A broadcast response fans out into one section per node.
            None => self.response_requested && broadcast,
        };
        ensure!(
            !batch_mode || broadcast,
            InvalidOptionsSnafu {
                reason: "batch mode requires the broadcast destination",
            }
        );

        let mut response_default = self.response_default;
        response_default.resize(per_node_length.into(), 0);

        Ok(ResolvedOptions {
            destination: self.destination,
            flags: Flags::new(batch_mode, self.response_requested),
            response_default,
        })
    }
}

/// Message options after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub destination: Address,
    pub flags: Flags,
    /// Always exactly `per_node_length` bytes long.
    pub response_default: Vec<u8>,
}
