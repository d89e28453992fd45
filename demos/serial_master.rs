//! Address the nodes on a serial bus and poll each of them.
//!
//! Usage: serial_master <port> [baud]

use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPort;

use multidrop_proto::io::{run_until_idle, ControlLine, SerialTransport};
use multidrop_proto::{Event, Master, MessageOptions, ResponseBuffer};

// Hypothetical node command returning two status bytes.
const READ_STATUS: u8 = 0x10;

/// Serial port with RTS as the daisy line.
struct Port(Box<dyn SerialPort>);

impl Write for Port {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl ControlLine for Port {
    fn set_control_line(&mut self, enabled: bool) -> io::Result<()> {
        self.0.write_request_to_send(enabled).map_err(io::Error::from)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().context("missing serial port path")?;
    let baud = match args.next() {
        Some(baud) => baud.parse().context("invalid baud rate")?,
        None => 115_200,
    };

    let port = serialport::new(&path, baud)
        .timeout(Duration::from_millis(5))
        .open()
        .with_context(|| format!("failed to open {}", path))?;
    let mut reader: Box<dyn Read> = Box::new(port.try_clone()?);
    let mut master = Master::new(SerialTransport::new(Port(port)));
    master.add_error_listener(|e| eprintln!("bus error: {}", e));

    master.start_addressing(0)?;
    master.subscribe(
        |event| {
            if let Event::Addressed { node } = event {
                println!("node {} addressed", node);
            }
        },
        |e| eprintln!("addressing failed: {}", e),
        || (),
    )?;
    run_until_idle(&mut master, &mut reader)?;
    println!("{} nodes on the bus", master.node_count());

    master.start_message(
        READ_STATUS,
        2,
        MessageOptions::new().with_response().response_default(&[0xFF, 0xFF]),
    )?;
    run_until_idle(&mut master, &mut reader)?;

    if let Some(ResponseBuffer::Batch(nodes)) = master.last_response() {
        for (index, status) in nodes.iter().enumerate() {
            println!("node {}: {:02x?}", index + 1, status);
        }
    }
    Ok(())
}
