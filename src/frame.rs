//! On-wire layout of master frames.
//!
//! ```text
//! Frame  = SYNC(2) + Header(5) + Data(N) + CRC(2)
//! SYNC   = 0xFF 0xFF                      (excluded from CRC)
//! Header = flags destination command nodeCount perNodeLength
//! CRC    = CRC-16/MODBUS over Header + Data, high byte first
//! ```

use crate::checksum::crc16;
use crate::types::{command, Address, Flags};

/// Frame start marker.
pub const SYNC: [u8; 2] = [0xFF, 0xFF];

pub const HEADER_LEN: usize = 5;

/// The NULL frame sent after addressing, `flags=0, destination=broadcast,
/// command=NULL, length=0`. It isn't preceded by a sync pair, and is
/// followed by its own CRC.
pub const NULL_FRAME: [u8; 4] = [0x00, Address::BROADCAST.value(), command::NULL, 0x00];

/// Frame header, as transmitted after the sync bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub flags: Flags,
    pub destination: Address,
    pub command: u8,
    /// 1 for unicast messages, otherwise the number of addressed nodes.
    pub node_count: u8,
    pub per_node_length: u8,
}

impl Header {
    pub const fn to_bytes(self) -> [u8; HEADER_LEN] {
        [
            self.flags.bits(),
            self.destination.value(),
            self.command,
            self.node_count,
            self.per_node_length,
        ]
    }

    pub const fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            flags: Flags::from_bits(bytes[0]),
            destination: Address::new(bytes[1]),
            command: bytes[2],
            node_count: bytes[3],
            per_node_length: bytes[4],
        }
    }

    /// Number of data bytes between the header and the CRC.
    pub fn data_len(&self) -> usize {
        let per_node = usize::from(self.per_node_length);
        if self.flags.batch() {
            per_node * usize::from(self.node_count)
        } else {
            per_node
        }
    }
}

/// The CRC as transmitted, high byte first.
pub const fn encode_crc(crc: u16) -> [u8; 2] {
    crc.to_be_bytes()
}

/// Encode a complete frame. The engine streams frames piecewise, this is
/// for tools and tests that need a whole frame at once.
pub fn encode_frame(header: Header, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(SYNC.len() + HEADER_LEN + data.len() + 2);
    frame.extend_from_slice(&SYNC);
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(data);
    let crc = crc16(&frame[SYNC.len()..]);
    frame.extend_from_slice(&encode_crc(crc));
    frame
}
