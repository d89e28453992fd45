//! Streaming decoder for master frames seen on the bus.
//!
//! The master never parses its inbound data; response bytes are raw
//! payload. This decoder is for monitors and simulated nodes that need to
//! split a captured byte stream back into frames.

use nom::bytes::streaming::{tag, take, take_until};
use nom::number::streaming::be_u16;
use nom::sequence::preceded;
use nom::Err::Incomplete;
use nom::IResult;

use crate::checksum::crc16;
use crate::frame::{Header, HEADER_LEN, SYNC};

type Buf = [u8];

/// A frame with a valid CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub header: Header,
    pub data: Vec<u8>,
    pub crc: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameToken {
    Frame(DecodedFrame),
    /// The frame was complete, but the CRC didn't match.
    InvalidCrc(Header),
    NeedData,
}

/// Try to decode one frame from the start of `buf`.
///
/// Returns the number of bytes consumed along with the token. Bytes before
/// the first sync pair are skipped. Nothing is consumed on `NeedData`.
pub fn parse_frame(buf: &Buf) -> (usize, FrameToken) {
    match frame(buf) {
        Ok((remaining, token)) => (buf.len() - remaining.len(), token),
        Err(Incomplete(_)) => (0, FrameToken::NeedData),
        // The parsers above only fail by running out of data.
        Err(_) => (0, FrameToken::NeedData),
    }
}

/// Decode every complete frame in `buf`, returning the tokens and the
/// number of bytes consumed.
pub fn parse_frames(mut buf: &Buf) -> (usize, Vec<FrameToken>) {
    let mut tokens = Vec::new();
    let mut total = 0;
    loop {
        match parse_frame(buf) {
            (_, FrameToken::NeedData) => return (total, tokens),
            (consumed, token) => {
                tokens.push(token);
                total += consumed;
                buf = &buf[consumed..];
            }
        }
    }
}

fn frame(buf: &Buf) -> IResult<&Buf, FrameToken> {
    let (buf, header_bytes) = preceded(sync, take(HEADER_LEN))(buf)?;
    let header = Header::from_bytes(header_array(header_bytes));
    let (buf, data) = take(header.data_len())(buf)?;
    let (buf, crc) = be_u16(buf)?;

    let mut covered = header_bytes.to_vec();
    covered.extend_from_slice(data);
    let token = if crc16(&covered) == crc {
        FrameToken::Frame(DecodedFrame {
            header,
            data: data.to_vec(),
            crc,
        })
    } else {
        FrameToken::InvalidCrc(header)
    };
    Ok((buf, token))
}

fn sync(buf: &Buf) -> IResult<&Buf, &Buf> {
    let (buf, _garbage) = take_until(&SYNC[..])(buf)?;
    tag(&SYNC[..])(buf)
}

fn header_array(bytes: &Buf) -> [u8; HEADER_LEN] {
    let mut header = [0; HEADER_LEN];
    header.copy_from_slice(bytes);
    header
}
