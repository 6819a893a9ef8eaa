//! Read/write statuses.

use std::fmt;

use crate::record::RecordType;

/// Outcome of a reader or writer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Outcome {
    Ok = 1,
    /// The value was found but stored as a different numeric type and cast.
    Converted = 2,
    /// The key exists but holds a non-numeric (or otherwise mismatched) type.
    IllegalType = 3,
    NotFound = 4,
    Fail = 5,
}

impl Outcome {
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Ok,
            2 => Self::Converted,
            3 => Self::IllegalType,
            4 => Self::NotFound,
            5 => Self::Fail,
            _ => return None,
        })
    }
}

/// An outcome paired with the type actually stored on the wire.
///
/// Packs into a `u32` as `outcome << 8 | stored type tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    outcome: Outcome,
    stored: RecordType,
}

impl Status {
    const TYPE_MASK: u32 = 0xff;

    pub const fn new(outcome: Outcome, stored: RecordType) -> Self {
        Self { outcome, stored }
    }

    pub const fn ok(stored: RecordType) -> Self {
        Self::new(Outcome::Ok, stored)
    }

    pub const fn converted(stored: RecordType) -> Self {
        Self::new(Outcome::Converted, stored)
    }

    pub const fn illegal_type(stored: RecordType) -> Self {
        Self::new(Outcome::IllegalType, stored)
    }

    pub const fn not_found() -> Self {
        Self::new(Outcome::NotFound, RecordType::None)
    }

    pub const fn fail() -> Self {
        Self::new(Outcome::Fail, RecordType::None)
    }

    pub const fn outcome(self) -> Outcome {
        self.outcome
    }

    pub const fn stored_type(self) -> RecordType {
        self.stored
    }

    /// True for `Ok` and `Converted`.
    pub const fn is_success(self) -> bool {
        matches!(self.outcome, Outcome::Ok | Outcome::Converted)
    }

    pub const fn pack(self) -> u32 {
        ((self.outcome as u32) << 8) | self.stored as u32
    }

    pub fn unpack(packed: u32) -> Option<Self> {
        let outcome = Outcome::from_code(u8::try_from(packed >> 8).ok()?)?;
        let tag = (packed & Self::TYPE_MASK) as u8;
        let stored = if tag == 0 {
            RecordType::None
        } else {
            RecordType::from_tag(tag)?
        };
        Some(Self { outcome, stored })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stored {
            RecordType::None => write!(f, "{:?}", self.outcome),
            stored => write!(f, "{:?} ({stored})", self.outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_outcome_over_type() {
        let status = Status::converted(RecordType::U16);
        assert_eq!(status.pack(), (2 << 8) | 4);
        assert_eq!(Status::unpack(status.pack()), Some(status));
        assert_eq!(Status::not_found().pack(), 4 << 8);
    }

    #[test]
    fn unpack_rejects_garbage() {
        assert_eq!(Status::unpack(0), None);
        assert_eq!(Status::unpack((9 << 8) | 1), None);
        assert_eq!(Status::unpack((1 << 8) | 11), None);
        assert_eq!(Status::unpack(1 << 20), None);
    }

    #[test]
    fn success_outcomes() {
        assert!(Status::ok(RecordType::U8).is_success());
        assert!(Status::converted(RecordType::S64).is_success());
        assert!(!Status::illegal_type(RecordType::String).is_success());
        assert!(!Status::fail().is_success());
        assert_eq!(Status::illegal_type(RecordType::String).to_string(), "IllegalType (string)");
    }
}
