//! Scope cursors.

use std::fmt;

/// A position inside a buffer: `(offset << 32) | remaining length`.
///
/// Offsets count from the first byte of the buffer, length prefix included,
/// so no real scope starts at offset 0. The zero cursor, [`Cursor::EVENT`],
/// always means "the body of the event returned by the last `get_event`".
///
/// Cursors are plain values; copying one snapshots a position.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cursor(u64);

impl Cursor {
    /// The body of the current event.
    pub const EVENT: Cursor = Cursor(0);

    pub const fn new(offset: u32, len: u32) -> Self {
        Self(((offset as u64) << 32) | len as u64)
    }

    /// Builds a cursor over `[start, end)`.
    ///
    /// Buffers are limited to `u32::MAX` bytes by their length prefix, so
    /// both bounds fit in 32 bits.
    pub(crate) fn span(start: usize, end: usize) -> Self {
        Self::new(start as u32, end.saturating_sub(start) as u32)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn offset(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn len(self) -> u32 {
        self.0 as u32
    }

    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Returns true for the current-event cursor.
    pub const fn is_event(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_event() {
            f.write_str("Cursor(event)")
        } else {
            write!(f, "Cursor({}+{})", self.offset(), self.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_offset_and_length() {
        let cursor = Cursor::new(40, 12);
        assert_eq!(cursor.raw(), (40u64 << 32) | 12);
        assert_eq!(cursor.offset(), 40);
        assert_eq!(cursor.len(), 12);
        assert_eq!(Cursor::from_raw(cursor.raw()), cursor);
    }

    #[test]
    fn zero_is_event_scope() {
        assert!(Cursor::EVENT.is_event());
        assert!(Cursor::default().is_event());
        assert!(!Cursor::new(4, 0).is_event());
        assert!(Cursor::new(4, 0).is_empty());
        assert_eq!(format!("{:?}", Cursor::EVENT), "Cursor(event)");
        assert_eq!(format!("{:?}", Cursor::span(10, 15)), "Cursor(10+5)");
    }
}
