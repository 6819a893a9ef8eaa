//! Buffer reader.
//!
//! A [`Reader`] borrows a finalized buffer. Events are consumed in order with
//! [`Reader::get_event`]; fields inside the current event (or inside an array
//! entry) are located by key with a linear scan of sibling records.

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::{DecodeError, ReadError};
use crate::record::{LENGTH_PREFIX, Number, RawRecord, RecordType, Records, Scalar, be_bytes, parse_record};
use crate::status::Status;

/// Shared empty buffer: just a length prefix of 4.
static EMPTY: [u8; LENGTH_PREFIX] = [0, 0, 0, LENGTH_PREFIX as u8];

/// A value found by key, with the status of the lookup (`Ok` or
/// `Converted`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lookup<T> {
    pub value: T,
    pub status: Status,
}

impl<T> Lookup<T> {
    pub fn is_converted(&self) -> bool {
        self.status.outcome() == crate::status::Outcome::Converted
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Result of a keyed lookup.
pub type ReadResult<T> = Result<Lookup<T>, ReadError>;

#[derive(Debug, Clone, Copy)]
struct CurrentEvent {
    id: u16,
    body: usize,
    end: usize,
}

/// Decodes events and fields from a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    event: Option<CurrentEvent>,
    halted: bool,
}

impl Reader<'static> {
    /// A reader over a buffer with no events.
    pub fn empty() -> Self {
        Self {
            buf: &EMPTY,
            pos: LENGTH_PREFIX,
            event: None,
            halted: false,
        }
    }
}

impl<'a> Reader<'a> {
    /// Points a reader at a finalized buffer.
    ///
    /// The length prefix must be at least 4 and no larger than `buf`; any
    /// trailing bytes beyond the declared length are ignored.
    pub fn new(buf: &'a [u8]) -> Result<Self, DecodeError> {
        let prefix: [u8; 4] =
            be_bytes(buf, 0).ok_or(DecodeError::MissingPrefix { len: buf.len() })?;
        let declared = u32::from_be_bytes(prefix);
        let len = declared as usize;
        if len < LENGTH_PREFIX || len > buf.len() {
            return Err(DecodeError::LengthMismatch {
                declared,
                available: buf.len(),
            });
        }
        Ok(Self {
            buf: &buf[..len],
            pos: LENGTH_PREFIX,
            event: None,
            halted: false,
        })
    }

    /// The buffer this reader decodes, prefix included.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// True when the buffer holds nothing but its prefix.
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= LENGTH_PREFIX
    }

    /// Rewinds to the first event. The source buffer is unchanged.
    pub fn rewind(&mut self) {
        self.pos = LENGTH_PREFIX;
        self.event = None;
        self.halted = false;
    }

    /// Id of the event returned by the last `get_event`.
    pub fn current_event(&self) -> Option<u16> {
        self.event.map(|e| e.id)
    }

    /// Advances to the next event and returns its id.
    ///
    /// Returns `Ok(None)` once the buffer is exhausted, or when the next
    /// top-level record is not an event; in that case every later call also
    /// returns `None` until [`rewind`](Self::rewind).
    pub fn get_event(&mut self) -> Result<Option<u16>, DecodeError> {
        self.event = None;
        if self.halted || self.pos >= self.buf.len() {
            return Ok(None);
        }

        let tag = self.buf[self.pos];
        if tag != RecordType::Event.tag() {
            debug!(offset = self.pos, tag, "non-event record at top level, stopping");
            self.halted = true;
            return Ok(None);
        }

        let record = match parse_record(self.buf, self.pos, self.buf.len()) {
            Ok(record) => record,
            Err(e) => {
                self.halted = true;
                return Err(e);
            }
        };
        self.event = Some(CurrentEvent {
            id: record.extra,
            body: record.body,
            end: record.end(),
        });
        self.pos = record.end();
        Ok(Some(record.extra))
    }

    /// Looks up a numeric field, casting if it is stored as another numeric
    /// type.
    pub fn find<T: Scalar>(&self, key: &str, scope: Cursor) -> ReadResult<T> {
        let record = self.locate(key, scope)?;
        if !record.ty.is_numeric() {
            return Err(ReadError::IllegalType {
                key: key.to_string(),
                stored: record.ty,
                requested: T::TYPE,
            });
        }
        let value = number(self.buf, &record)?;
        let status = if record.ty == T::TYPE {
            Status::ok(record.ty)
        } else {
            Status::converted(record.ty)
        };
        Ok(Lookup {
            value: T::from_number(value),
            status,
        })
    }

    pub fn find_s8(&self, key: &str, scope: Cursor) -> ReadResult<i8> {
        self.find(key, scope)
    }

    pub fn find_u8(&self, key: &str, scope: Cursor) -> ReadResult<u8> {
        self.find(key, scope)
    }

    pub fn find_s16(&self, key: &str, scope: Cursor) -> ReadResult<i16> {
        self.find(key, scope)
    }

    pub fn find_u16(&self, key: &str, scope: Cursor) -> ReadResult<u16> {
        self.find(key, scope)
    }

    pub fn find_s32(&self, key: &str, scope: Cursor) -> ReadResult<i32> {
        self.find(key, scope)
    }

    pub fn find_u32(&self, key: &str, scope: Cursor) -> ReadResult<u32> {
        self.find(key, scope)
    }

    pub fn find_s64(&self, key: &str, scope: Cursor) -> ReadResult<i64> {
        self.find(key, scope)
    }

    pub fn find_u64(&self, key: &str, scope: Cursor) -> ReadResult<u64> {
        self.find(key, scope)
    }

    pub fn find_float(&self, key: &str, scope: Cursor) -> ReadResult<f32> {
        self.find(key, scope)
    }

    pub fn find_double(&self, key: &str, scope: Cursor) -> ReadResult<f64> {
        self.find(key, scope)
    }

    pub fn find_string(&self, key: &str, scope: Cursor) -> ReadResult<&'a str> {
        let record = self.exact(key, scope, RecordType::String)?;
        let text = string(self.buf, &record)?;
        Ok(Lookup {
            value: text,
            status: Status::ok(RecordType::String),
        })
    }

    pub fn find_data(&self, key: &str, scope: Cursor) -> ReadResult<&'a [u8]> {
        let record = self.exact(key, scope, RecordType::Data)?;
        Ok(Lookup {
            value: record.payload(self.buf),
            status: Status::ok(RecordType::Data),
        })
    }

    /// Finds an array and returns a cursor for [`next_entry`](Self::next_entry).
    pub fn find_array(&self, key: &str, scope: Cursor) -> ReadResult<Cursor> {
        let record = self.exact(key, scope, RecordType::Array)?;
        Ok(Lookup {
            value: Cursor::span(record.body, record.body),
            status: Status::ok(RecordType::Array),
        })
    }

    /// Moves `cursor` to the next array entry and returns its field count.
    ///
    /// On success the cursor covers the entry body, so it can be passed to
    /// the `find_*` accessors. A count of 0 marks the end of the array.
    pub fn next_entry(&self, cursor: &mut Cursor) -> Result<u16, DecodeError> {
        if cursor.is_event() {
            return Err(self.out_of_bounds(*cursor));
        }
        let pos = cursor.offset() as usize + cursor.len() as usize;
        let record = parse_record(self.buf, pos, self.buf.len())?;
        if record.ty != RecordType::ArrayEntry {
            return Err(DecodeError::NotArrayEntry {
                offset: pos,
                found: record.ty,
            });
        }
        *cursor = Cursor::span(record.body, record.end());
        Ok(record.extra)
    }

    /// Iterates every record in a scope, for dumps and introspection.
    pub fn iterate(&self, scope: Cursor) -> Result<Fields<'a>, ReadError> {
        let (start, end) = self.scope(scope)?;
        Ok(Fields {
            buf: self.buf,
            records: Records::new(self.buf, start, end),
        })
    }

    fn scope(&self, cursor: Cursor) -> Result<(usize, usize), ReadError> {
        if cursor.is_event() {
            return self
                .event
                .map(|e| (e.body, e.end))
                .ok_or(ReadError::NoEvent);
        }
        let start = cursor.offset() as usize;
        let end = start + cursor.len() as usize;
        if start < LENGTH_PREFIX || end > self.buf.len() {
            return Err(self.out_of_bounds(cursor).into());
        }
        Ok((start, end))
    }

    fn locate(&self, key: &str, scope: Cursor) -> Result<RawRecord<'a>, ReadError> {
        let (start, end) = self.scope(scope)?;
        for record in Records::new(self.buf, start, end) {
            let record = record?;
            if record.ty.has_key() && record.key == key.as_bytes() {
                return Ok(record);
            }
        }
        Err(ReadError::NotFound {
            key: key.to_string(),
        })
    }

    fn exact(&self, key: &str, scope: Cursor, ty: RecordType) -> Result<RawRecord<'a>, ReadError> {
        let record = self.locate(key, scope)?;
        if record.ty != ty {
            return Err(ReadError::IllegalType {
                key: key.to_string(),
                stored: record.ty,
                requested: ty,
            });
        }
        Ok(record)
    }

    fn out_of_bounds(&self, cursor: Cursor) -> DecodeError {
        DecodeError::CursorOutOfBounds {
            offset: cursor.offset(),
            len: cursor.len(),
            available: self.buf.len(),
        }
    }
}

fn number(buf: &[u8], record: &RawRecord<'_>) -> Result<Number, DecodeError> {
    let payload = record.payload(buf);
    let expected = record.ty.width();
    if payload.len() != expected {
        return Err(DecodeError::BadPayload {
            offset: record.offset,
            ty: record.ty,
            expected,
            actual: payload.len(),
        });
    }
    Number::decode(record.ty, payload).ok_or(DecodeError::BadPayload {
        offset: record.offset,
        ty: record.ty,
        expected,
        actual: payload.len(),
    })
}

fn string<'a>(buf: &'a [u8], record: &RawRecord<'a>) -> Result<&'a str, DecodeError> {
    let payload = record.payload(buf);
    let text = payload
        .strip_suffix(&[0])
        .ok_or(DecodeError::MissingStringTerminator {
            offset: record.offset,
        })?;
    std::str::from_utf8(text).map_err(|_| DecodeError::InvalidUtf8 {
        offset: record.offset,
    })
}

/// Decoded value of a record yielded by [`Reader::iterate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(Number),
    String(&'a str),
    Data(&'a [u8]),
    /// Cursor ready for [`Reader::next_entry`].
    Array(Cursor),
    /// An array entry seen directly; `body` covers its fields.
    Entry { fields: u16, body: Cursor },
    /// A nested event; `body` covers its fields.
    Event { id: u16, body: Cursor },
}

/// One record in a scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    /// Key, empty for entries and events.
    pub key: &'a str,
    pub ty: RecordType,
    pub value: FieldValue<'a>,
}

/// Iterator over the records of one scope.
#[derive(Debug)]
pub struct Fields<'a> {
    buf: &'a [u8],
    records: Records<'a>,
}

impl<'a> Fields<'a> {
    fn decode(&self, record: RawRecord<'a>) -> Result<Field<'a>, DecodeError> {
        let key = std::str::from_utf8(record.key).map_err(|_| DecodeError::InvalidUtf8 {
            offset: record.offset,
        })?;
        let value = match record.ty {
            RecordType::String => FieldValue::String(string(self.buf, &record)?),
            RecordType::Data => FieldValue::Data(record.payload(self.buf)),
            RecordType::Array => FieldValue::Array(Cursor::span(record.body, record.body)),
            RecordType::ArrayEntry => FieldValue::Entry {
                fields: record.extra,
                body: Cursor::span(record.body, record.end()),
            },
            RecordType::Event => FieldValue::Event {
                id: record.extra,
                body: Cursor::span(record.body, record.end()),
            },
            _ => FieldValue::Number(number(self.buf, &record)?),
        };
        Ok(Field {
            key,
            ty: record.ty,
            value,
        })
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<Field<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(record.and_then(|record| self.decode(record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Writer;
    use crate::status::Outcome;

    fn one_event(build: impl FnOnce(&mut Writer)) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.begin_event(7u16).unwrap();
        build(&mut writer);
        writer.end_event().unwrap();
        writer.finalize().unwrap();
        writer.as_bytes().to_vec()
    }

    #[test]
    fn empty_reader_has_no_events() {
        let mut reader = Reader::empty();
        assert!(reader.is_empty());
        assert_eq!(reader.get_event(), Ok(None));
    }

    #[test]
    fn new_validates_prefix() {
        assert!(matches!(
            Reader::new(&[0, 0]),
            Err(DecodeError::MissingPrefix { len: 2 })
        ));
        assert!(matches!(
            Reader::new(&[0, 0, 0, 9, 1]),
            Err(DecodeError::LengthMismatch { declared: 9, .. })
        ));
        assert!(matches!(
            Reader::new(&[0, 0, 0, 2]),
            Err(DecodeError::LengthMismatch { declared: 2, .. })
        ));
        // Bytes past the declared length are ignored.
        let reader = Reader::new(&[0, 0, 0, 4, 99]).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn narrowing_reports_stored_type() {
        let buf = one_event(|w| w.write_u16("v", 56).unwrap());
        let mut reader = Reader::new(&buf).unwrap();
        assert_eq!(reader.get_event(), Ok(Some(7)));

        let found = reader.find_u8("v", Cursor::EVENT).unwrap();
        assert_eq!(found.value, 56);
        assert_eq!(found.status, Status::converted(RecordType::U16));
        assert!(found.is_converted());

        let exact = reader.find_u16("v", Cursor::EVENT).unwrap();
        assert_eq!(exact.status.outcome(), Outcome::Ok);
    }

    #[test]
    fn missing_key_is_not_found() {
        let buf = one_event(|w| w.write_u16("v", 1).unwrap());
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();
        let err = reader.find_u32("missing", Cursor::EVENT).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.outcome(), Outcome::NotFound);
    }

    #[test]
    fn string_read_as_number_is_illegal() {
        let buf = one_event(|w| w.write_string("name", "main.c").unwrap());
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();

        let err = reader.find_u32("name", Cursor::EVENT).unwrap_err();
        assert_eq!(err.stored_type(), Some(RecordType::String));
        assert_eq!(err.outcome(), Outcome::IllegalType);

        let text = reader.find_string("name", Cursor::EVENT).unwrap();
        assert_eq!(text.value, "main.c");
    }

    #[test]
    fn number_read_as_string_is_illegal() {
        let buf = one_event(|w| w.write_u8("n", 1).unwrap());
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();
        let err = reader.find_string("n", Cursor::EVENT).unwrap_err();
        assert_eq!(err.stored_type(), Some(RecordType::U8));
    }

    #[test]
    fn duplicate_keys_first_match_wins() {
        let buf = one_event(|w| {
            w.write_u8("k", 1).unwrap();
            w.write_u8("k", 2).unwrap();
        });
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();
        assert_eq!(reader.find_u8("k", Cursor::EVENT).unwrap().value, 1);
    }

    #[test]
    fn event_cursor_requires_current_event() {
        let buf = one_event(|w| w.write_u8("k", 1).unwrap());
        let reader = Reader::new(&buf).unwrap();
        assert_eq!(
            reader.find_u8("k", Cursor::EVENT),
            Err(ReadError::NoEvent)
        );
    }

    #[test]
    fn lookups_stay_inside_event() {
        let mut writer = Writer::new();
        writer.begin_event(1u16).unwrap();
        writer.write_u8("first", 1).unwrap();
        writer.end_event().unwrap();
        writer.begin_event(2u16).unwrap();
        writer.write_u8("second", 2).unwrap();
        writer.end_event().unwrap();
        writer.finalize().unwrap();

        let mut reader = Reader::new(writer.as_bytes()).unwrap();
        assert_eq!(reader.get_event(), Ok(Some(1)));
        assert!(reader.find_u8("second", Cursor::EVENT).is_err());
        assert_eq!(reader.get_event(), Ok(Some(2)));
        assert!(reader.find_u8("first", Cursor::EVENT).is_err());
        assert_eq!(reader.get_event(), Ok(None));

        reader.rewind();
        assert_eq!(reader.get_event(), Ok(Some(1)));
    }

    #[test]
    fn non_event_record_is_a_hard_stop() {
        // prefix, then a bare u8 record at top level, then a valid event
        let mut buf = vec![0, 0, 0, 0, 2, 0, 5, 0, 1];
        buf.extend_from_slice(&[14, 0, 1, 0, 0, 0, 7]);
        let len = buf.len() as u32;
        buf[..4].copy_from_slice(&len.to_be_bytes());

        let mut reader = Reader::new(&buf).unwrap();
        assert_eq!(reader.get_event(), Ok(None));
        assert_eq!(reader.get_event(), Ok(None));
    }

    #[test]
    fn truncated_event_is_a_decode_error() {
        // event claims 50 bytes but the buffer ends after its header
        let buf = [0, 0, 0, 11, 14, 0, 1, 0, 0, 0, 50];
        let mut reader = Reader::new(&buf).unwrap();
        assert!(matches!(
            reader.get_event(),
            Err(DecodeError::BadLength { len: 50, .. })
        ));
        assert_eq!(reader.get_event(), Ok(None));
    }

    #[test]
    fn corrupted_field_length_is_a_decode_error() {
        let mut buf = one_event(|w| w.write_u32("v", 1).unwrap());
        // low byte of the field's 16-bit length
        buf[13] = 200;
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();
        assert!(matches!(
            reader.find_u32("v", Cursor::EVENT),
            Err(ReadError::Decode(DecodeError::BadLength { .. }))
        ));
    }

    #[test]
    fn array_walk() {
        let buf = one_event(|w| {
            w.begin_array("items").unwrap();
            w.begin_array_entry().unwrap();
            w.write_u32("a", 1).unwrap();
            w.end_array_entry().unwrap();
            w.begin_array_entry().unwrap();
            w.write_string("b", "x").unwrap();
            w.write_double("c", 2.0).unwrap();
            w.end_array_entry().unwrap();
            w.end_array().unwrap();
        });
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();

        let mut cursor = reader.find_array("items", Cursor::EVENT).unwrap().value;
        assert_eq!(reader.next_entry(&mut cursor), Ok(1));
        assert_eq!(reader.find_u32("a", cursor).unwrap().value, 1);
        assert!(reader.find_string("b", cursor).is_err());

        assert_eq!(reader.next_entry(&mut cursor), Ok(2));
        assert_eq!(reader.find_string("b", cursor).unwrap().value, "x");
        assert_eq!(reader.find_double("c", cursor).unwrap().value, 2.0);

        assert_eq!(reader.next_entry(&mut cursor), Ok(0));
    }

    #[test]
    fn next_entry_past_array_end_fails() {
        let buf = one_event(|w| {
            w.begin_array("items").unwrap();
            w.end_array().unwrap();
            w.write_u8("after", 1).unwrap();
        });
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();
        let mut cursor = reader.find_array("items", Cursor::EVENT).unwrap().value;
        assert_eq!(reader.next_entry(&mut cursor), Ok(0));
        assert!(matches!(
            reader.next_entry(&mut cursor),
            Err(DecodeError::NotArrayEntry {
                found: RecordType::U8,
                ..
            })
        ));
        let mut event_scope = Cursor::EVENT;
        assert!(reader.next_entry(&mut event_scope).is_err());
    }

    #[test]
    fn cursor_outside_buffer_rejected() {
        let buf = one_event(|w| w.write_u8("k", 1).unwrap());
        let reader = Reader::new(&buf).unwrap();
        let err = reader.find_u8("k", Cursor::new(4, 1000)).unwrap_err();
        assert!(matches!(
            err,
            ReadError::Decode(DecodeError::CursorOutOfBounds { .. })
        ));
    }

    #[test]
    fn iterate_yields_typed_fields() {
        let buf = one_event(|w| {
            w.write_s8("s", -2).unwrap();
            w.write_string("t", "hi").unwrap();
            w.write_data("d", &[1, 2]).unwrap();
            w.begin_array("a").unwrap();
            w.end_array().unwrap();
        });
        let mut reader = Reader::new(&buf).unwrap();
        reader.get_event().unwrap();

        let fields: Vec<_> = reader
            .iterate(Cursor::EVENT)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].value, FieldValue::Number(Number::S8(-2)));
        assert_eq!(fields[1].value, FieldValue::String("hi"));
        assert_eq!(fields[2].value, FieldValue::Data(&[1, 2]));
        assert_eq!(fields[3].key, "a");
        let FieldValue::Array(mut cursor) = fields[3].value else {
            panic!("expected array");
        };
        assert_eq!(reader.next_entry(&mut cursor), Ok(0));
    }
}
