//! Buffer writer.
//!
//! A [`Writer`] owns one growable buffer that a pipeline stage fills once per
//! tick: `reset`, a sequence of events, then `finalize`. Open scopes are
//! tracked on an explicit stack; lengths of events, arrays and entries are
//! patched in when the scope closes.

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::error::{ScopeKind, WriteError, WriteResult};
use crate::record::{LENGTH_PREFIX, MAX_NARROW_RECORD, Number, RecordType, Scalar};

const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct OpenScope {
    kind: ScopeKind,
    start: usize,
    fields: u16,
}

/// A position to roll back to, taken with [`Writer::mark`].
#[derive(Debug, Clone)]
pub struct Mark {
    len: usize,
    scopes: Vec<OpenScope>,
}

/// Encodes events into a length-prefixed buffer.
#[derive(Debug, Clone)]
pub struct Writer {
    buf: BytesMut,
    scopes: Vec<OpenScope>,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut writer = Self {
            buf: BytesMut::with_capacity(capacity.max(LENGTH_PREFIX)),
            scopes: Vec::with_capacity(3),
        };
        writer.reset();
        writer
    }

    /// Rewinds to just past the length prefix, keeping the allocation.
    ///
    /// The prefix is rewritten so the buffer reads as empty until the next
    /// `finalize`.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.buf.put_u32(LENGTH_PREFIX as u32);
        self.scopes.clear();
    }

    /// Writes the total length into the prefix and returns it.
    pub fn finalize(&mut self) -> WriteResult<u32> {
        if let Some(open) = self.scopes.last() {
            return Err(WriteError::UnclosedScope { open: open.kind });
        }
        let len = self.checked_len()?;
        self.patch_u32(0, len);
        trace!(len, "finalized buffer");
        Ok(len)
    }

    /// Encoded bytes, prefix included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing but the length prefix has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= LENGTH_PREFIX
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Number of scopes currently open.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn mark(&self) -> Mark {
        Mark {
            len: self.buf.len(),
            scopes: self.scopes.clone(),
        }
    }

    /// Drops everything written since `mark`, including scopes opened since.
    pub fn rollback(&mut self, mark: Mark) {
        self.buf.truncate(mark.len.max(LENGTH_PREFIX));
        self.scopes = mark.scopes;
    }

    pub fn begin_event(&mut self, id: impl Into<u16>) -> WriteResult<()> {
        if let Some(open) = self.scopes.last() {
            return Err(WriteError::misuse(
                "begin_event",
                "no open scope",
                Some(open.kind),
            ));
        }
        let start = self.buf.len();
        self.buf.put_u8(RecordType::Event.tag());
        self.buf.put_u16(id.into());
        self.buf.put_u32(0);
        self.push(ScopeKind::Event, start);
        Ok(())
    }

    pub fn end_event(&mut self) -> WriteResult<()> {
        let scope = self.pop(ScopeKind::Event, "end_event", "an open event")?;
        let len = self.scope_len(scope.start)?;
        self.patch_u32(scope.start + 3, len);
        Ok(())
    }

    /// Opens a named array inside the current event.
    pub fn begin_array(&mut self, name: &str) -> WriteResult<()> {
        self.expect_top(&[ScopeKind::Event], "begin_array", "an open event")?;
        check_text(name, name)?;
        let start = self.buf.len();
        self.buf.put_u8(RecordType::Array.tag());
        self.buf.put_u32(0);
        self.put_key(name);
        self.push(ScopeKind::Array, start);
        Ok(())
    }

    /// Closes the array, appending the empty terminating entry.
    pub fn end_array(&mut self) -> WriteResult<()> {
        self.expect_top(&[ScopeKind::Array], "end_array", "an open array")?;
        self.buf.put_u8(RecordType::ArrayEntry.tag());
        self.buf.put_u32(RecordType::ArrayEntry.header_len() as u32);
        self.buf.put_u16(0);
        let scope = self.pop(ScopeKind::Array, "end_array", "an open array")?;
        let len = self.scope_len(scope.start)?;
        self.patch_u32(scope.start + 1, len);
        Ok(())
    }

    pub fn begin_array_entry(&mut self) -> WriteResult<()> {
        self.expect_top(&[ScopeKind::Array], "begin_array_entry", "an open array")?;
        let start = self.buf.len();
        self.buf.put_u8(RecordType::ArrayEntry.tag());
        self.buf.put_u32(0);
        self.buf.put_u16(0);
        self.push(ScopeKind::ArrayEntry, start);
        Ok(())
    }

    pub fn end_array_entry(&mut self) -> WriteResult<()> {
        let scope = self.pop(
            ScopeKind::ArrayEntry,
            "end_array_entry",
            "an open array entry",
        )?;
        let len = self.scope_len(scope.start)?;
        self.patch_u32(scope.start + 1, len);
        self.buf[scope.start + 5..scope.start + 7].copy_from_slice(&scope.fields.to_be_bytes());
        Ok(())
    }

    /// Writes a numeric record.
    pub fn write<T: Scalar>(&mut self, key: &str, value: T) -> WriteResult<()> {
        self.begin_value("write")?;
        check_text(key, key)?;
        let len = RecordType::U8.header_len() + key.len() + 1 + T::TYPE.width();
        let len = narrow_len(key, len)?;
        self.buf.put_u8(T::TYPE.tag());
        self.buf.put_u16(len);
        self.put_key(key);
        value.into_number().put(&mut self.buf);
        self.count_field();
        Ok(())
    }

    /// Writes an already decoded number in its own type.
    pub fn write_number(&mut self, key: &str, value: Number) -> WriteResult<()> {
        match value {
            Number::S8(v) => self.write(key, v),
            Number::U8(v) => self.write(key, v),
            Number::S16(v) => self.write(key, v),
            Number::U16(v) => self.write(key, v),
            Number::S32(v) => self.write(key, v),
            Number::U32(v) => self.write(key, v),
            Number::S64(v) => self.write(key, v),
            Number::U64(v) => self.write(key, v),
            Number::Float(v) => self.write(key, v),
            Number::Double(v) => self.write(key, v),
        }
    }

    pub fn write_s8(&mut self, key: &str, value: i8) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_u8(&mut self, key: &str, value: u8) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_s16(&mut self, key: &str, value: i16) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_u16(&mut self, key: &str, value: u16) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_s32(&mut self, key: &str, value: i32) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_u32(&mut self, key: &str, value: u32) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_s64(&mut self, key: &str, value: i64) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_u64(&mut self, key: &str, value: u64) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_float(&mut self, key: &str, value: f32) -> WriteResult<()> {
        self.write(key, value)
    }

    pub fn write_double(&mut self, key: &str, value: f64) -> WriteResult<()> {
        self.write(key, value)
    }

    /// Writes a NUL-terminated string record.
    pub fn write_string(&mut self, key: &str, value: &str) -> WriteResult<()> {
        self.begin_value("write_string")?;
        check_text(key, key)?;
        check_text(key, value)?;
        let len = RecordType::String.header_len() + key.len() + 1 + value.len() + 1;
        let len = narrow_len(key, len)?;
        self.buf.put_u8(RecordType::String.tag());
        self.buf.put_u16(len);
        self.put_key(key);
        self.put_key(value);
        self.count_field();
        Ok(())
    }

    /// Writes a raw byte blob with a 32-bit length.
    pub fn write_data(&mut self, key: &str, data: &[u8]) -> WriteResult<()> {
        self.begin_value("write_data")?;
        check_text(key, key)?;
        let len = RecordType::Data.header_len() + key.len() + 1 + data.len();
        let len = u32::try_from(len).map_err(|_| WriteError::RecordTooLarge {
            key: key.to_string(),
            len,
            max: u32::MAX as usize,
        })?;
        self.buf.put_u8(RecordType::Data.tag());
        self.buf.put_u32(len);
        self.put_key(key);
        self.buf.put_slice(data);
        self.count_field();
        Ok(())
    }

    fn push(&mut self, kind: ScopeKind, start: usize) {
        self.scopes.push(OpenScope {
            kind,
            start,
            fields: 0,
        });
    }

    fn expect_top(
        &self,
        kinds: &[ScopeKind],
        operation: &'static str,
        expected: &'static str,
    ) -> WriteResult<()> {
        let top = self.scopes.last().map(|s| s.kind);
        match top {
            Some(kind) if kinds.contains(&kind) => Ok(()),
            found => Err(WriteError::misuse(operation, expected, found)),
        }
    }

    fn pop(
        &mut self,
        kind: ScopeKind,
        operation: &'static str,
        expected: &'static str,
    ) -> WriteResult<OpenScope> {
        self.expect_top(&[kind], operation, expected)?;
        self.scopes
            .pop()
            .ok_or_else(|| WriteError::misuse(operation, expected, None))
    }

    /// Checks that a value may be written here and that the enclosing entry
    /// can count one more field.
    fn begin_value(&self, operation: &'static str) -> WriteResult<()> {
        self.expect_top(
            &[ScopeKind::Event, ScopeKind::ArrayEntry],
            operation,
            "an open event or array entry",
        )?;
        if let Some(scope) = self.scopes.last()
            && scope.kind == ScopeKind::ArrayEntry
            && scope.fields == u16::MAX
        {
            return Err(WriteError::FieldCountOverflow);
        }
        Ok(())
    }

    fn count_field(&mut self) {
        if let Some(scope) = self.scopes.last_mut()
            && scope.kind == ScopeKind::ArrayEntry
        {
            scope.fields += 1;
        }
    }

    fn put_key(&mut self, text: &str) {
        self.buf.put_slice(text.as_bytes());
        self.buf.put_u8(0);
    }

    fn checked_len(&self) -> WriteResult<u32> {
        u32::try_from(self.buf.len()).map_err(|_| WriteError::BufferTooLarge {
            len: self.buf.len(),
        })
    }

    fn scope_len(&self, start: usize) -> WriteResult<u32> {
        let len = self.buf.len() - start;
        u32::try_from(len).map_err(|_| WriteError::BufferTooLarge { len })
    }

    fn patch_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }
}

fn check_text(key: &str, text: &str) -> WriteResult<()> {
    if text.as_bytes().contains(&0) {
        return Err(WriteError::InteriorNul {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn narrow_len(key: &str, len: usize) -> WriteResult<u16> {
    u16::try_from(len).map_err(|_| WriteError::RecordTooLarge {
        key: key.to_string(),
        len,
        max: MAX_NARROW_RECORD,
    })
}
