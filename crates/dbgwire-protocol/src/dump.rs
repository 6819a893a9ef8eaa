//! Human and JSON renderings of a buffer, for debugging plugins.

use std::fmt::Write as _;

use dbgwire_core::describe_event;
use serde_json::{Value, json};
use tracing::trace;

use crate::cursor::Cursor;
use crate::error::{DecodeError, ReadError};
use crate::reader::{FieldValue, Reader};
use crate::record::Number;

const INDENT: usize = 2;

/// Deepest scope either walker follows. Writers never nest past an array
/// entry inside an event, so anything deeper is hostile input.
pub const MAX_DEPTH: usize = 8;

fn descend(level: usize, body: Cursor) -> Result<usize, ReadError> {
    if level >= MAX_DEPTH {
        return Err(DecodeError::TooDeep {
            offset: body.offset(),
            limit: MAX_DEPTH,
        }
        .into());
    }
    Ok(level + 1)
}

/// Renders every event in `buf` as an indented text tree.
pub fn render(buf: &[u8]) -> Result<String, ReadError> {
    let mut reader = Reader::new(buf)?;
    let mut out = String::new();
    while let Some(id) = reader.get_event()? {
        let _ = writeln!(out, "event {} ({id})", describe_event(id));
        render_scope(&reader, Cursor::EVENT, 1, &mut out)?;
    }
    Ok(out)
}

fn render_scope(
    reader: &Reader<'_>,
    scope: Cursor,
    level: usize,
    out: &mut String,
) -> Result<(), ReadError> {
    for field in reader.iterate(scope)? {
        let field = field?;
        let pad = " ".repeat(level * INDENT);
        match field.value {
            FieldValue::Number(n) => {
                let _ = writeln!(out, "{pad}{} {} = {n}", field.ty, field.key);
            }
            FieldValue::String(s) => {
                let _ = writeln!(out, "{pad}string {} = {s:?}", field.key);
            }
            FieldValue::Data(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                let _ = writeln!(out, "{pad}data {} = [{}]", field.key, hex.join(" "));
            }
            FieldValue::Array(mut cursor) => {
                let _ = writeln!(out, "{pad}array {}", field.key);
                let entry_pad = " ".repeat((level + 1) * INDENT);
                loop {
                    let count = reader.next_entry(&mut cursor)?;
                    if count == 0 {
                        break;
                    }
                    let noun = if count == 1 { "field" } else { "fields" };
                    let _ = writeln!(out, "{entry_pad}entry ({count} {noun})");
                    let inner = descend(level, cursor)?;
                    render_scope(reader, cursor, inner + 1, out)?;
                }
            }
            FieldValue::Entry { fields, body } => {
                let _ = writeln!(out, "{pad}entry ({fields})");
                render_scope(reader, body, descend(level, body)?, out)?;
            }
            FieldValue::Event { id, body } => {
                let _ = writeln!(out, "{pad}event {} ({id})", describe_event(id));
                render_scope(reader, body, descend(level, body)?, out)?;
            }
        }
    }
    Ok(())
}

/// Converts every event in `buf` to JSON.
///
/// Each event becomes `{"id", "name", "fields"}`; each field
/// `{"key", "type", "value"}`. Arrays become a list of entries, each a list
/// of fields.
pub fn to_json(buf: &[u8]) -> Result<Value, ReadError> {
    let mut reader = Reader::new(buf)?;
    let mut events = Vec::new();
    while let Some(id) = reader.get_event()? {
        events.push(json!({
            "id": id,
            "name": describe_event(id),
            "fields": scope_json(&reader, Cursor::EVENT, 1)?,
        }));
    }
    Ok(Value::Array(events))
}

fn scope_json(reader: &Reader<'_>, scope: Cursor, level: usize) -> Result<Value, ReadError> {
    let mut fields = Vec::new();
    for field in reader.iterate(scope)? {
        let field = field?;
        let value = match field.value {
            FieldValue::Number(n) => number_json(n),
            FieldValue::String(s) => Value::from(s),
            FieldValue::Data(bytes) => Value::from(bytes.to_vec()),
            FieldValue::Array(mut cursor) => {
                let mut entries = Vec::new();
                while reader.next_entry(&mut cursor)? != 0 {
                    entries.push(scope_json(reader, cursor, descend(level, cursor)?)?);
                }
                Value::Array(entries)
            }
            FieldValue::Entry { body, .. } | FieldValue::Event { body, .. } => {
                scope_json(reader, body, descend(level, body)?)?
            }
        };
        fields.push(json!({
            "key": field.key,
            "type": field.ty.name(),
            "value": value,
        }));
    }
    Ok(Value::Array(fields))
}

fn number_json(n: Number) -> Value {
    match n {
        Number::S8(v) => Value::from(v),
        Number::U8(v) => Value::from(v),
        Number::S16(v) => Value::from(v),
        Number::U16(v) => Value::from(v),
        Number::S32(v) => Value::from(v),
        Number::U32(v) => Value::from(v),
        Number::S64(v) => Value::from(v),
        Number::U64(v) => Value::from(v),
        Number::Float(v) => Value::from(f64::from(v)),
        Number::Double(v) => Value::from(v),
    }
}

/// Emits the text rendering of `buf` at trace level.
pub fn trace_buffer(label: &str, buf: &[u8]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    match render(buf) {
        Ok(text) => trace!(label, len = buf.len(), "\n{text}"),
        Err(e) => trace!(label, len = buf.len(), error = %e, "undecodable buffer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Writer;

    fn sample() -> Vec<u8> {
        let mut w = Writer::new();
        w.begin_event(18u16).unwrap();
        w.write_u32("state", 2).unwrap();
        w.end_event().unwrap();
        w.begin_event(2u16).unwrap();
        w.write_string("name", "argc").unwrap();
        w.write_data("raw", &[0xde, 0xad]).unwrap();
        w.begin_array("items").unwrap();
        w.begin_array_entry().unwrap();
        w.write_s8("a", -1).unwrap();
        w.end_array_entry().unwrap();
        w.begin_array_entry().unwrap();
        w.write_double("b", 2.5).unwrap();
        w.write_u8("c", 7).unwrap();
        w.end_array_entry().unwrap();
        w.end_array().unwrap();
        w.end_event().unwrap();
        w.finalize().unwrap();
        w.as_bytes().to_vec()
    }

    #[test]
    fn render_text_tree() {
        let text = render(&sample()).unwrap();
        insta::assert_snapshot!(text.trim_end(), @r#"
        event set_status (18)
          u32 state = 2
        event set_locals (2)
          string name = "argc"
          data raw = [de ad]
          array items
            entry (1 field)
              s8 a = -1
            entry (2 fields)
              double b = 2.5
              u8 c = 7
        "#);
    }

    #[test]
    fn json_view() {
        let value = to_json(&sample()).unwrap();
        assert_eq!(value[0]["name"], "set_status");
        assert_eq!(value[0]["fields"][0], json!({"key": "state", "type": "u32", "value": 2}));
        let items = &value[1]["fields"][2];
        assert_eq!(items["type"], "array");
        assert_eq!(
            items["value"],
            json!([
                [{"key": "a", "type": "s8", "value": -1}],
                [
                    {"key": "b", "type": "double", "value": 2.5},
                    {"key": "c", "type": "u8", "value": 7}
                ]
            ])
        );
        assert_eq!(value[1]["fields"][1]["value"], json!([0xde, 0xad]));
    }

    #[test]
    fn render_empty_buffer() {
        assert_eq!(render(&[0, 0, 0, 4]).unwrap(), "");
        assert_eq!(to_json(&[0, 0, 0, 4]).unwrap(), json!([]));
    }

    /// `count` event headers, each wrapping all the ones after it.
    fn nested_events(count: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 7 * count);
        buf.extend_from_slice(&((4 + 7 * count) as u32).to_be_bytes());
        for i in 0..count {
            buf.extend_from_slice(&[14, 0, 1]);
            buf.extend_from_slice(&((7 * (count - i)) as u32).to_be_bytes());
        }
        buf
    }

    #[test]
    fn deeply_nested_events_are_rejected() {
        let buf = nested_events(200_000);
        let too_deep =
            |err: ReadError| matches!(err, ReadError::Decode(DecodeError::TooDeep { .. }));
        assert!(too_deep(render(&buf).unwrap_err()));
        assert!(too_deep(to_json(&buf).unwrap_err()));
        trace_buffer("nested", &buf);
    }

    #[test]
    fn shallow_nesting_still_renders() {
        let text = render(&nested_events(3)).unwrap();
        insta::assert_snapshot!(text.trim_end(), @r"
        event get_locals (1)
          event get_locals (1)
            event get_locals (1)
        ");
    }

    #[test]
    fn render_reports_corruption() {
        let mut buf = sample();
        buf[13] = 0xff;
        assert!(render(&buf).is_err());
    }
}
