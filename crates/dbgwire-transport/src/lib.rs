//! Socket transport between a debugger front end and a remote backend host.
//!
//! # Wire Overview
//!
//! Each message starts with a 4-byte command header:
//! - action: `0x80 0x00` followed by the 16-bit action code
//! - buffer: the buffer's own big-endian length prefix (30 bits used),
//!   followed by the remaining bytes of the buffer
//!
//! Buffers are moved in blocks of [`BLOCK_SIZE`] bytes. A listener holds at
//! most one peer and keeps listening after the peer leaves. Any failed
//! transfer drops the peer.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbgwire_transport::{Connection, Incoming, TransportConfig};
//!
//! let mut host = Connection::listen(TransportConfig::default())?;
//! loop {
//!     if host.poll_accept() {
//!         if let Some(Incoming::Action(code)) = host.recv()? {
//!             println!("action {code}");
//!         }
//!     }
//! #   break;
//! }
//! # Ok::<(), dbgwire_transport::TransportError>(())
//! ```

mod config;
mod connection;
mod error;
mod framing;

pub use config::{DEFAULT_PORT, TransportConfig};
pub use connection::{Connection, Role};
pub use error::{TransportError, TransportResult};
pub use framing::{BLOCK_SIZE, COMMAND_LEN, Command, Incoming, MAX_PAYLOAD_LEN, write_blocks};
