//! Command headers and block transfers.
//!
//! Every message starts with a 4-byte big-endian header:
//!
//! ```text
//! action : 1000_0000 0000_0000 | code:u16
//! buffer : 00LL_LLLL LLLL_LLLL LLLL_LLLL LLLL_LLLL   (30-bit total length)
//! ```
//!
//! A buffer header is the buffer's own length prefix, so the bytes after it
//! are the remaining `length - 4` bytes of the buffer. Payloads move in
//! blocks of [`BLOCK_SIZE`] bytes.

use std::io::{self, Read, Write};

use dbgwire_protocol::LENGTH_PREFIX;

/// Size of a command header.
pub const COMMAND_LEN: usize = 4;

/// Transfer block size for payloads.
pub const BLOCK_SIZE: usize = 1024;

/// Set in byte 0 of an action header.
pub const ACTION_FLAG: u8 = 0x80;

/// Mask for the 30-bit payload length.
pub const LENGTH_MASK: u32 = 0x3fff_ffff;

/// Largest buffer a header can announce.
pub const MAX_PAYLOAD_LEN: u32 = LENGTH_MASK;

/// A decoded command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Bare action code, no payload.
    Action(u16),
    /// A buffer of this total length (header included) follows.
    Payload(u32),
}

impl Command {
    pub fn encode(self) -> [u8; COMMAND_LEN] {
        match self {
            Self::Action(code) => {
                let [hi, lo] = code.to_be_bytes();
                [ACTION_FLAG, 0, hi, lo]
            }
            Self::Payload(len) => (len & LENGTH_MASK).to_be_bytes(),
        }
    }

    pub fn decode(header: [u8; COMMAND_LEN]) -> Self {
        if header[0] & ACTION_FLAG != 0 {
            Self::Action(u16::from_be_bytes([header[2], header[3]]))
        } else {
            Self::Payload(u32::from_be_bytes(header) & LENGTH_MASK)
        }
    }
}

/// A complete message read from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Action(u16),
    /// A whole buffer, length prefix included.
    Buffer(Vec<u8>),
}

/// Why a message could not be read.
#[derive(Debug)]
pub(crate) enum FrameError {
    Io(io::Error),
    TooShort(u32),
    TooLarge(u32),
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Writes `bytes` in blocks of [`BLOCK_SIZE`].
pub fn write_blocks<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    for block in bytes.chunks(BLOCK_SIZE) {
        writer.write_all(block)?;
    }
    writer.flush()
}

/// Reads one command and, for buffers, the rest of the buffer.
///
/// Buffers announcing more than `max_payload` bytes are rejected before
/// anything is allocated.
pub(crate) fn read_message<R: Read>(reader: &mut R, max_payload: u32) -> Result<Incoming, FrameError> {
    let mut header = [0u8; COMMAND_LEN];
    reader.read_exact(&mut header)?;

    match Command::decode(header) {
        Command::Action(code) => Ok(Incoming::Action(code)),
        Command::Payload(len) if (len as usize) < LENGTH_PREFIX => Err(FrameError::TooShort(len)),
        Command::Payload(len) if len > max_payload => Err(FrameError::TooLarge(len)),
        Command::Payload(len) => {
            let mut buf = vec![0u8; len as usize];
            buf[..COMMAND_LEN].copy_from_slice(&header);
            for block in buf[COMMAND_LEN..].chunks_mut(BLOCK_SIZE) {
                reader.read_exact(block)?;
            }
            Ok(Incoming::Buffer(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn action_header_layout() {
        assert_eq!(Command::Action(3).encode(), [0x80, 0x00, 0x00, 0x03]);
        assert_eq!(Command::Action(0x1001).encode(), [0x80, 0x00, 0x10, 0x01]);
        assert_eq!(Command::decode([0x80, 0, 0, 3]), Command::Action(3));
    }

    #[test]
    fn payload_header_is_the_length_prefix() {
        assert_eq!(Command::Payload(10_000).encode(), 10_000u32.to_be_bytes());
        assert_eq!(
            Command::decode(10_000u32.to_be_bytes()),
            Command::Payload(10_000)
        );
    }

    #[test]
    fn reserved_bits_are_masked() {
        assert_eq!(
            Command::decode([0x40, 0, 0x01, 0x00]),
            Command::Payload(256)
        );
        assert_eq!(Command::Payload(u32::MAX).encode(), [0x3f, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn read_action() {
        let mut stream = Cursor::new(vec![0x80, 0, 0, 6]);
        let message = read_message(&mut stream, MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(message, Incoming::Action(6));
    }

    #[test]
    fn read_buffer_across_blocks() {
        let mut buf: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        buf[..4].copy_from_slice(&3000u32.to_be_bytes());

        let mut wire = Vec::new();
        write_blocks(&mut wire, &buf).unwrap();
        assert_eq!(wire, buf);

        let mut stream = Cursor::new(wire);
        let message = read_message(&mut stream, MAX_PAYLOAD_LEN).unwrap();
        assert_eq!(message, Incoming::Buffer(buf));
    }

    #[test]
    fn read_rejects_short_and_oversized() {
        let mut stream = Cursor::new(vec![0, 0, 0, 2]);
        assert!(matches!(
            read_message(&mut stream, MAX_PAYLOAD_LEN),
            Err(FrameError::TooShort(2))
        ));

        let mut stream = Cursor::new(vec![0, 1, 0, 0]);
        assert!(matches!(
            read_message(&mut stream, 1024),
            Err(FrameError::TooLarge(65536))
        ));
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut stream = Cursor::new(vec![0, 0, 0, 10, 1, 2]);
        let err = read_message(&mut stream, MAX_PAYLOAD_LEN).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }
}
