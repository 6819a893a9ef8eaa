//! Record layout on the wire.
//!
//! ```text
//! scalar / string : tag:u8 len:u16 key\0 payload
//! data            : tag:u8 len:u32 key\0 bytes
//! array           : tag:u8 len:u32 name\0 entry* entry(count = 0)
//! array entry     : tag:u8 len:u32 count:u16 record*
//! event           : tag:u8 id:u16 len:u32 record*
//! ```
//!
//! Every `len` covers the whole record, header included, so a scanner can
//! hop from one record to the next without looking at payloads. All
//! integers are big-endian.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::DecodeError;

/// Size of the total-length prefix at the start of every buffer.
pub const LENGTH_PREFIX: usize = 4;

/// Largest record that fits a 16-bit length field.
pub const MAX_NARROW_RECORD: usize = u16::MAX as usize;

/// Record type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// No record. Only used in statuses, never on the wire.
    None = 0,
    S8 = 1,
    U8 = 2,
    S16 = 3,
    U16 = 4,
    S32 = 5,
    U32 = 6,
    S64 = 7,
    U64 = 8,
    Float = 9,
    Double = 10,
    String = 12,
    Data = 13,
    Event = 14,
    Array = 15,
    ArrayEntry = 16,
}

impl RecordType {
    /// Decodes a wire tag. Tag 0 and the numeric end marker (11) are not
    /// valid on the wire.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::S8,
            2 => Self::U8,
            3 => Self::S16,
            4 => Self::U16,
            5 => Self::S32,
            6 => Self::U32,
            7 => Self::S64,
            8 => Self::U64,
            9 => Self::Float,
            10 => Self::Double,
            12 => Self::String,
            13 => Self::Data,
            14 => Self::Event,
            15 => Self::Array,
            16 => Self::ArrayEntry,
            _ => return None,
        })
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::S8
                | Self::U8
                | Self::S16
                | Self::U16
                | Self::S32
                | Self::U32
                | Self::S64
                | Self::U64
                | Self::Float
                | Self::Double
        )
    }

    /// Payload width of a numeric type, 0 otherwise.
    pub const fn width(self) -> usize {
        match self {
            Self::S8 | Self::U8 => 1,
            Self::S16 | Self::U16 => 2,
            Self::S32 | Self::U32 | Self::Float => 4,
            Self::S64 | Self::U64 | Self::Double => 8,
            _ => 0,
        }
    }

    /// Returns true if the record carries a NUL-terminated key after its
    /// header.
    pub const fn has_key(self) -> bool {
        self.is_numeric() || matches!(self, Self::String | Self::Data | Self::Array)
    }

    /// Size of the fixed header (tag, length and, where present, the event
    /// id or field count).
    pub const fn header_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Data | Self::Array => 5,
            Self::Event | Self::ArrayEntry => 7,
            _ => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::S8 => "s8",
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::U16 => "u16",
            Self::S32 => "s32",
            Self::U32 => "u32",
            Self::S64 => "s64",
            Self::U64 => "u64",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Data => "data",
            Self::Event => "event",
            Self::Array => "array",
            Self::ArrayEntry => "array entry",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded numeric value in its stored form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    S8(i8),
    U8(u8),
    S16(i16),
    U16(u16),
    S32(i32),
    U32(u32),
    S64(i64),
    U64(u64),
    Float(f32),
    Double(f64),
}

impl Number {
    pub const fn record_type(self) -> RecordType {
        match self {
            Self::S8(_) => RecordType::S8,
            Self::U8(_) => RecordType::U8,
            Self::S16(_) => RecordType::S16,
            Self::U16(_) => RecordType::U16,
            Self::S32(_) => RecordType::S32,
            Self::U32(_) => RecordType::U32,
            Self::S64(_) => RecordType::S64,
            Self::U64(_) => RecordType::U64,
            Self::Float(_) => RecordType::Float,
            Self::Double(_) => RecordType::Double,
        }
    }

    /// Casts to another numeric type with `as` semantics.
    pub fn cast<T: Scalar>(self) -> T {
        T::from_number(self)
    }

    /// Decodes a payload of exactly `ty.width()` bytes.
    pub(crate) fn decode(ty: RecordType, payload: &[u8]) -> Option<Self> {
        Some(match ty {
            RecordType::S8 => Self::S8(i8::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::U8 => Self::U8(u8::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::S16 => Self::S16(i16::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::U16 => Self::U16(u16::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::S32 => Self::S32(i32::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::U32 => Self::U32(u32::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::S64 => Self::S64(i64::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::U64 => Self::U64(u64::from_be_bytes(be_bytes(payload, 0)?)),
            RecordType::Float => Self::Float(f32::from_bits(u32::from_be_bytes(be_bytes(
                payload, 0,
            )?))),
            RecordType::Double => Self::Double(f64::from_bits(u64::from_be_bytes(be_bytes(
                payload, 0,
            )?))),
            _ => return None,
        })
    }

    pub(crate) fn put(self, out: &mut BytesMut) {
        match self {
            Self::S8(v) => out.put_i8(v),
            Self::U8(v) => out.put_u8(v),
            Self::S16(v) => out.put_i16(v),
            Self::U16(v) => out.put_u16(v),
            Self::S32(v) => out.put_i32(v),
            Self::U32(v) => out.put_u32(v),
            Self::S64(v) => out.put_i64(v),
            Self::U64(v) => out.put_u64(v),
            Self::Float(v) => out.put_u32(v.to_bits()),
            Self::Double(v) => out.put_u64(v.to_bits()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S8(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::S16(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::S32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::S64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Double(v) => write!(f, "{v:?}"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Primitive types that can be stored as numeric records.
pub trait Scalar: Copy + sealed::Sealed {
    /// The record type this primitive is stored as.
    const TYPE: RecordType;

    fn into_number(self) -> Number;

    fn from_number(number: Number) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const TYPE: RecordType = RecordType::$variant;

                fn into_number(self) -> Number {
                    Number::$variant(self)
                }

                fn from_number(number: Number) -> Self {
                    match number {
                        Number::S8(v) => v as $ty,
                        Number::U8(v) => v as $ty,
                        Number::S16(v) => v as $ty,
                        Number::U16(v) => v as $ty,
                        Number::S32(v) => v as $ty,
                        Number::U32(v) => v as $ty,
                        Number::S64(v) => v as $ty,
                        Number::U64(v) => v as $ty,
                        Number::Float(v) => v as $ty,
                        Number::Double(v) => v as $ty,
                    }
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => S8,
    u8 => U8,
    i16 => S16,
    u16 => U16,
    i32 => S32,
    u32 => U32,
    i64 => S64,
    u64 => U64,
    f32 => Float,
    f64 => Double,
}

/// Reads `N` bytes at `at`, or `None` if the slice is too short.
pub(crate) fn be_bytes<const N: usize>(buf: &[u8], at: usize) -> Option<[u8; N]> {
    buf.get(at..at.checked_add(N)?)?.try_into().ok()
}

/// A record header validated against its enclosing scope.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawRecord<'a> {
    pub ty: RecordType,
    /// Absolute offset of the tag byte.
    pub offset: usize,
    /// Whole record length.
    pub len: usize,
    /// Key bytes without the terminator; empty for events and entries.
    pub key: &'a [u8],
    /// Absolute offset of the payload (after header and key).
    pub body: usize,
    /// Event id or entry field count.
    pub extra: u16,
}

impl<'a> RawRecord<'a> {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn payload<'b>(&self, buf: &'b [u8]) -> &'b [u8] {
        buf.get(self.body..self.end()).unwrap_or_default()
    }
}

/// Parses and bounds-checks the record starting at `offset`, which must end
/// at or before `end`.
pub(crate) fn parse_record(buf: &[u8], offset: usize, end: usize) -> Result<RawRecord<'_>, DecodeError> {
    let end = end.min(buf.len());
    let available = end.saturating_sub(offset);
    let tag = *buf
        .get(offset)
        .filter(|_| available > 0)
        .ok_or(DecodeError::TruncatedHeader {
            offset,
            needed: 1,
            available,
        })?;
    let ty = RecordType::from_tag(tag).ok_or(DecodeError::UnknownTag { offset, tag })?;

    let header_len = ty.header_len();
    if available < header_len {
        return Err(DecodeError::TruncatedHeader {
            offset,
            needed: header_len,
            available,
        });
    }

    let truncated = || DecodeError::TruncatedHeader {
        offset,
        needed: header_len,
        available,
    };
    let (len, extra) = match ty {
        RecordType::Event => {
            let id = u16::from_be_bytes(be_bytes(buf, offset + 1).ok_or_else(truncated)?);
            let len = u32::from_be_bytes(be_bytes(buf, offset + 3).ok_or_else(truncated)?);
            (len as usize, id)
        }
        RecordType::ArrayEntry => {
            let len = u32::from_be_bytes(be_bytes(buf, offset + 1).ok_or_else(truncated)?);
            let count = u16::from_be_bytes(be_bytes(buf, offset + 5).ok_or_else(truncated)?);
            (len as usize, count)
        }
        RecordType::Data | RecordType::Array => {
            let len = u32::from_be_bytes(be_bytes(buf, offset + 1).ok_or_else(truncated)?);
            (len as usize, 0)
        }
        _ => {
            let len = u16::from_be_bytes(be_bytes(buf, offset + 1).ok_or_else(truncated)?);
            (usize::from(len), 0)
        }
    };

    let min_len = header_len + usize::from(ty.has_key());
    if len < min_len || len > available {
        return Err(DecodeError::BadLength {
            offset,
            len,
            available,
        });
    }

    let key_start = offset + header_len;
    let (key, body) = if ty.has_key() {
        let region = buf
            .get(key_start..offset + len)
            .ok_or(DecodeError::MissingKeyTerminator { offset })?;
        let nul = region
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::MissingKeyTerminator { offset })?;
        (&region[..nul], key_start + nul + 1)
    } else {
        (&[][..], key_start)
    };

    Ok(RawRecord {
        ty,
        offset,
        len,
        key,
        body,
        extra,
    })
}

/// Walks sibling records in `[start, end)`. Stops after the first error.
#[derive(Debug)]
pub(crate) struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
    failed: bool,
}

impl<'a> Records<'a> {
    pub fn new(buf: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            buf,
            pos: start,
            end,
            failed: false,
        }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<RawRecord<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.end {
            return None;
        }
        match parse_record(self.buf, self.pos, self.end) {
            Ok(record) => {
                self.pos = record.end();
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip() {
        for tag in 0..=20u8 {
            match RecordType::from_tag(tag) {
                Some(ty) => assert_eq!(ty.tag(), tag),
                None => assert!(matches!(tag, 0 | 11 | 17..)),
            }
        }
    }

    #[test]
    fn header_lengths() {
        assert_eq!(RecordType::U32.header_len(), 3);
        assert_eq!(RecordType::String.header_len(), 3);
        assert_eq!(RecordType::Data.header_len(), 5);
        assert_eq!(RecordType::Array.header_len(), 5);
        assert_eq!(RecordType::Event.header_len(), 7);
        assert_eq!(RecordType::ArrayEntry.header_len(), 7);
    }

    #[test]
    fn number_casts_follow_as_semantics() {
        assert_eq!(Number::U16(56).cast::<u8>(), 56);
        assert_eq!(Number::U16(300).cast::<u8>(), 44);
        assert_eq!(Number::S32(-1).cast::<u32>(), u32::MAX);
        assert_eq!(Number::Double(2.75).cast::<i32>(), 2);
        assert_eq!(Number::Float(-1.5).cast::<u8>(), 0);
        assert_eq!(Number::U8(3).cast::<f64>(), 3.0);
    }

    #[test]
    fn floats_encode_big_endian_bits() {
        let mut out = BytesMut::new();
        Number::Float(1.0).put(&mut out);
        assert_eq!(&out[..], &[0x3f, 0x80, 0x00, 0x00]);
        assert_eq!(Number::decode(RecordType::Float, &out), Some(Number::Float(1.0)));
    }

    #[test]
    fn decode_rejects_short_payload() {
        assert_eq!(Number::decode(RecordType::U32, &[0, 1]), None);
        assert_eq!(Number::decode(RecordType::String, &[0]), None);
    }

    #[test]
    fn parse_scalar_record() {
        // u8 "ab" = 7
        let buf = [2, 0, 7, b'a', b'b', 0, 7];
        let record = parse_record(&buf, 0, buf.len()).unwrap();
        assert_eq!(record.ty, RecordType::U8);
        assert_eq!(record.len, 7);
        assert_eq!(record.key, b"ab");
        assert_eq!(record.payload(&buf), &[7]);
    }

    #[test]
    fn parse_rejects_overlong_length() {
        let buf = [2, 0, 9, b'a', 0, 7];
        let err = parse_record(&buf, 0, buf.len()).unwrap_err();
        assert!(matches!(err, DecodeError::BadLength { len: 9, .. }));
    }

    #[test]
    fn parse_rejects_missing_key_terminator() {
        let buf = [2, 0, 5, b'a', b'b'];
        let err = parse_record(&buf, 0, buf.len()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingKeyTerminator { offset: 0 }));
    }

    #[test]
    fn parse_rejects_unknown_tag() {
        let buf = [11, 0, 4, 0];
        let err = parse_record(&buf, 0, buf.len()).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTag { tag: 11, .. }));
    }

    #[test]
    fn parse_respects_scope_end() {
        let buf = [2, 0, 5, 0, 9, 2, 0, 5, 0, 8];
        // Second record lies outside a scope that ends at 7.
        let mut records = Records::new(&buf, 0, 7);
        assert!(records.next().unwrap().is_ok());
        assert!(matches!(
            records.next(),
            Some(Err(DecodeError::TruncatedHeader { .. }))
        ));
        assert!(records.next().is_none());
    }
}
