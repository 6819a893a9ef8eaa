//! Plugin state persistence.
//!
//! A plugin saves its state as an ordered list of ints, doubles and strings
//! and reads it back in the same order. The list is stored as a JSON array,
//! so saved state survives in a session file next to the plugin names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collects a plugin's saved values in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveState {
    items: Vec<Value>,
}

impl SaveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_int(&mut self, value: i64) {
        self.items.push(Value::from(value));
    }

    /// Appends a double. Non-finite values have no JSON form and are stored
    /// as null, which reads back as [`LoadStatus::Fail`].
    pub fn write_double(&mut self, value: f64) {
        self.items.push(Value::from(value));
    }

    pub fn write_string(&mut self, value: &str) {
        self.items.push(Value::from(value));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Array(self.items)
    }
}

/// How a single load went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Ok,
    /// Stored as the other numeric kind (int vs double) and converted.
    Converted,
    /// String was longer than the requested bound and was cut.
    Truncated,
    /// No value left.
    OutOfData,
    /// Stored value has an incompatible type.
    Fail,
}

/// A loaded value and how it was obtained.
///
/// On [`LoadStatus::OutOfData`] and [`LoadStatus::Fail`] the value is the
/// type's default.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub status: LoadStatus,
}

impl<T> Loaded<T> {
    fn new(value: T, status: LoadStatus) -> Self {
        Self { value, status }
    }

    /// True for `Ok`, `Converted` and `Truncated`.
    pub fn is_usable(&self) -> bool {
        matches!(
            self.status,
            LoadStatus::Ok | LoadStatus::Converted | LoadStatus::Truncated
        )
    }
}

/// Reads back values written by a [`SaveState`]. Every read consumes one
/// slot, whether it succeeds or not.
#[derive(Debug, Clone)]
pub struct LoadState<'a> {
    items: &'a [Value],
    pos: usize,
}

impl<'a> LoadState<'a> {
    /// Wraps a saved array. Anything other than an array loads as empty.
    pub fn new(saved: &'a Value) -> Self {
        let items = saved.as_array().map(Vec::as_slice).unwrap_or_default();
        Self { items, pos: 0 }
    }

    /// Values not read yet.
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.pos)
    }

    fn next(&mut self) -> Option<&'a Value> {
        let item = self.items.get(self.pos);
        self.pos += 1;
        item
    }

    pub fn read_int(&mut self) -> Loaded<i64> {
        let Some(item) = self.next() else {
            return Loaded::new(0, LoadStatus::OutOfData);
        };
        if let Some(v) = item.as_i64() {
            return Loaded::new(v, LoadStatus::Ok);
        }
        if let Some(v) = item.as_u64() {
            return Loaded::new(v as i64, LoadStatus::Converted);
        }
        match item.as_f64() {
            Some(v) => Loaded::new(v as i64, LoadStatus::Converted),
            None => Loaded::new(0, LoadStatus::Fail),
        }
    }

    pub fn read_double(&mut self) -> Loaded<f64> {
        let Some(item) = self.next() else {
            return Loaded::new(0.0, LoadStatus::OutOfData);
        };
        match (item.as_f64(), item.is_f64()) {
            (Some(v), true) => Loaded::new(v, LoadStatus::Ok),
            (Some(v), false) => Loaded::new(v, LoadStatus::Converted),
            (None, _) => Loaded::new(0.0, LoadStatus::Fail),
        }
    }

    pub fn read_string(&mut self) -> Loaded<String> {
        self.read_string_bounded(usize::MAX)
    }

    /// Reads a string of at most `max_len` bytes, cutting at a character
    /// boundary when it is longer.
    pub fn read_string_bounded(&mut self, max_len: usize) -> Loaded<String> {
        let Some(item) = self.next() else {
            return Loaded::new(String::new(), LoadStatus::OutOfData);
        };
        let Some(s) = item.as_str() else {
            return Loaded::new(String::new(), LoadStatus::Fail);
        };
        if s.len() <= max_len {
            return Loaded::new(s.to_owned(), LoadStatus::Ok);
        }
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        Loaded::new(s[..end].to_owned(), LoadStatus::Truncated)
    }
}
