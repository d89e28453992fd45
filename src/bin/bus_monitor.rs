use std::error::Error;
use std::io::{self, Read};

use multidrop_proto::command;
use multidrop_proto::nom_parser::{parse_frame, FrameToken};

fn command_name(cmd: u8) -> String {
    match cmd {
        command::RESET => "RESET".into(),
        command::ADDRESS => "ADDRESS".into(),
        command::NULL => "NULL".into(),
        other => format!("{:#04x}", other),
    }
}

fn monitor_main_loop() -> Result<(), Box<dyn Error>> {
    let mut buffer = Vec::new();
    let mut data_in = [0; 256];

    loop {
        let len = io::stdin().read(&mut data_in)?;
        if len == 0 {
            break;
        }
        buffer.extend_from_slice(&data_in[..len]);

        loop {
            let (consumed, token) = parse_frame(&buffer);
            match token {
                FrameToken::NeedData => break,
                FrameToken::Frame(frame) => {
                    let h = frame.header;
                    println!(
                        "{} to {} flags {:#04x} nodes {} len {}: {:02x?}",
                        command_name(h.command),
                        *h.destination,
                        h.flags.bits(),
                        h.node_count,
                        h.per_node_length,
                        frame.data
                    );
                }
                FrameToken::InvalidCrc(h) => {
                    println!("{} to {}: CRC error", command_name(h.command), *h.destination);
                }
            }
            buffer.drain(..consumed);
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    monitor_main_loop()
}
