//! Self-describing binary event format for the dbgwire debugger pipeline.
//!
//! # Buffer Layout
//!
//! A buffer is a 4-byte big-endian total length (prefix included) followed
//! by a sequence of events:
//!
//! ```text
//! +----------------+---------+---------+-----+
//! | length (4 BE)  | event 0 | event 1 | ... |
//! +----------------+---------+---------+-----+
//! ```
//!
//! Each event carries a 16-bit id and a body of keyed records: numbers,
//! strings, byte blobs and arrays of entries. Record layouts are described
//! in [`record`].
//!
//! # Example
//!
//! ```rust
//! use dbgwire_protocol::{Cursor, Reader, Writer};
//!
//! let mut writer = Writer::new();
//! writer.begin_event(18u16).unwrap();
//! writer.write_u32("state", 2).unwrap();
//! writer.end_event().unwrap();
//! writer.finalize().unwrap();
//!
//! let mut reader = Reader::new(writer.as_bytes()).unwrap();
//! assert_eq!(reader.get_event().unwrap(), Some(18));
//! let state = reader.find_u32("state", Cursor::EVENT).unwrap();
//! assert_eq!(state.value, 2);
//! ```

mod cursor;
pub mod dump;
mod error;
mod reader;
pub mod record;
mod status;
mod writer;

pub use cursor::Cursor;
pub use error::{DecodeError, ReadError, ScopeKind, WriteError, WriteResult};
pub use reader::{Field, FieldValue, Fields, Lookup, ReadResult, Reader};
pub use record::{LENGTH_PREFIX, MAX_NARROW_RECORD, Number, RecordType, Scalar};
pub use status::{Outcome, Status};
pub use writer::{Mark, Writer};
