//! Protocol error types.

use thiserror::Error;

use crate::record::RecordType;
use crate::status::{Outcome, Status};

/// Result type for writer operations.
pub type WriteResult<T> = Result<T, WriteError>;

/// Malformed buffer contents.
///
/// Every length and tag is checked against the enclosing scope before it is
/// trusted; any inconsistency surfaces here instead of as an out-of-bounds
/// read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer is shorter than its own length prefix.
    #[error("buffer too short for length prefix: {len} bytes")]
    MissingPrefix { len: usize },

    /// Declared total length disagrees with the bytes available.
    #[error("declared length {declared} does not fit a buffer of {available} bytes")]
    LengthMismatch { declared: u32, available: usize },

    /// Tag byte is not a known record type.
    #[error("unknown record tag {tag:#04x} at offset {offset}")]
    UnknownTag { offset: usize, tag: u8 },

    /// Not enough bytes left in the scope for the record header.
    #[error("record header at offset {offset} needs {needed} bytes, {available} left in scope")]
    TruncatedHeader {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Record length is smaller than its header or overruns its scope.
    #[error("record at offset {offset} has invalid length {len} ({available} bytes left in scope)")]
    BadLength {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// Key has no NUL terminator inside the record.
    #[error("record key at offset {offset} is not terminated")]
    MissingKeyTerminator { offset: usize },

    /// Numeric payload has the wrong width.
    #[error("{ty} payload at offset {offset} is {actual} bytes, expected {expected}")]
    BadPayload {
        offset: usize,
        ty: RecordType,
        expected: usize,
        actual: usize,
    },

    /// String payload has no NUL terminator.
    #[error("string at offset {offset} is not terminated")]
    MissingStringTerminator { offset: usize },

    /// Key or string is not valid UTF-8.
    #[error("invalid UTF-8 in record at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Cursor points outside the buffer.
    #[error("cursor {offset}+{len} lies outside a buffer of {available} bytes")]
    CursorOutOfBounds {
        offset: u32,
        len: u32,
        available: usize,
    },

    /// `next_entry` did not land on an array entry.
    #[error("expected an array entry at offset {offset}, found {found}")]
    NotArrayEntry { offset: usize, found: RecordType },

    /// Scopes nest deeper than a walker is willing to follow.
    #[error("scope at offset {offset} nests deeper than {limit} levels")]
    TooDeep { offset: u32, limit: usize },
}

/// Scope kinds tracked by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Event,
    Array,
    ArrayEntry,
}

impl ScopeKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Array => "array",
            Self::ArrayEntry => "array entry",
        }
    }
}

/// Writer misuse. Every variant maps to the `Fail` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// Call made in the wrong scope, e.g. `begin_event` inside an event or
    /// `end_array` without an open array.
    #[error("{operation} requires {expected}, innermost open scope is {found}")]
    ScopeMisuse {
        operation: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// `finalize` with scopes still open.
    #[error("cannot finalize with an open {}", .open.name())]
    UnclosedScope { open: ScopeKind },

    /// Record would not fit its length field.
    #[error("record {key:?} is {len} bytes, limit is {max}")]
    RecordTooLarge { key: String, len: usize, max: usize },

    /// Key or string value contains a NUL byte.
    #[error("key or string for {key:?} contains a NUL byte")]
    InteriorNul { key: String },

    /// More fields in one array entry than its 16-bit count can hold.
    #[error("array entry holds more than {} fields", u16::MAX)]
    FieldCountOverflow,

    /// Total buffer would exceed its 32-bit length prefix.
    #[error("buffer of {len} bytes exceeds the 32-bit length prefix")]
    BufferTooLarge { len: usize },
}

impl WriteError {
    pub fn status(&self) -> Status {
        Status::fail()
    }

    pub(crate) fn misuse(
        operation: &'static str,
        expected: &'static str,
        found: Option<ScopeKind>,
    ) -> Self {
        Self::ScopeMisuse {
            operation,
            expected,
            found: found.map_or("none", ScopeKind::name),
        }
    }
}

/// Reader lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// No record with this key in the scope.
    #[error("key {key:?} not found")]
    NotFound { key: String },

    /// Key exists but holds a type the accessor cannot return. Re-read with
    /// the accessor for `stored`.
    #[error("key {key:?} holds {stored}, requested {requested}")]
    IllegalType {
        key: String,
        stored: RecordType,
        requested: RecordType,
    },

    /// The event cursor was used before any `get_event`.
    #[error("no current event")]
    NoEvent,

    /// Buffer is malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ReadError {
    /// Status equivalent of this error.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound { .. } => Status::not_found(),
            Self::IllegalType { stored, .. } => Status::illegal_type(*stored),
            Self::NoEvent | Self::Decode(_) => Status::fail(),
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.status().outcome()
    }

    /// The type found on the wire, for `IllegalType`.
    pub fn stored_type(&self) -> Option<RecordType> {
        match self {
            Self::IllegalType { stored, .. } => Some(*stored),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_statuses() {
        let err = ReadError::IllegalType {
            key: "name".into(),
            stored: RecordType::String,
            requested: RecordType::U32,
        };
        assert_eq!(err.status(), Status::illegal_type(RecordType::String));
        assert_eq!(err.stored_type(), Some(RecordType::String));
        assert_eq!(
            ReadError::NotFound { key: "x".into() }.outcome(),
            Outcome::NotFound
        );
        assert_eq!(ReadError::NoEvent.outcome(), Outcome::Fail);
    }

    #[test]
    fn write_error_messages() {
        let err = WriteError::misuse("end_array", "an open array", None);
        assert_eq!(
            err.to_string(),
            "end_array requires an open array, innermost open scope is none"
        );
        assert_eq!(err.status().outcome(), Outcome::Fail);
        let err = WriteError::UnclosedScope {
            open: ScopeKind::ArrayEntry,
        };
        assert_eq!(err.to_string(), "cannot finalize with an open array entry");
    }
}
