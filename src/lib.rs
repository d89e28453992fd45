//! Sans-io master engine for daisy-chained multidrop buses.
//!
//! The master frames outgoing messages with a CRC-16/MODBUS checksum,
//! assigns sequential addresses to unaddressed nodes, and collects the
//! nodes' responses, substituting default data for nodes that stay silent.
//!
//! See [`Master`] for the engine, and [`io::run_until_idle`] for a blocking
//! driver over `std::io` ports.

mod addressing;
mod checksum;
mod error;
mod event;
pub mod frame;
pub mod io;
mod master;
pub mod nom_parser;
mod response;
mod timer;
mod types;

pub use addressing::{ADDRESS_PER_NODE_LENGTH, MAX_ADDRESS_CORRECTIONS};
pub use checksum::crc16;
pub use error::Error;
pub use event::{Event, EventKind};
pub use master::{Master, Transport};
pub use response::ResponseBuffer;
pub use timer::{ArmedTimer, TimeoutKind, TimerToken, Timeouts};
pub use types::{command, Address, Flags, MessageOptions, ResolvedOptions};
