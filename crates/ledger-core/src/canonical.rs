//! Canonical JSON text used as the pre-image of block digests.
//!
//! Object keys are sorted at every level, items are separated by `", "` and
//! keys from values by `": "`. Every character outside printable ASCII is
//! written as a lowercase `\uXXXX` escape (UTF-16 units), and floats always
//! carry a fractional part (`50.0`), so equal field values hash identically
//! no matter which implementation produced the record.

use serde_json::{Number, Value};
use std::fmt::Write;

pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::with_capacity(256);
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &Number, out: &mut String) {
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(f) = n.as_f64() {
        // Debug is the shortest round-trip form and keeps the ".0" on integral values.
        let _ = write!(out, "{f:?}");
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_and_spaced() {
        let v = json!({ "b": 1, "a": [true, null], "c": { "z": "x", "y": 2.5 } });
        assert_eq!(
            to_canonical_string(&v),
            r#"{"a": [true, null], "b": 1, "c": {"y": 2.5, "z": "x"}}"#
        );
    }

    #[test]
    fn integral_floats_keep_fraction() {
        assert_eq!(to_canonical_string(&json!(50.0)), "50.0");
        assert_eq!(to_canonical_string(&json!(1_600_000_000.25)), "1600000000.25");
        assert_eq!(to_canonical_string(&json!(7u64)), "7");
        assert_eq!(to_canonical_string(&json!(-3i64)), "-3");
    }

    #[test]
    fn escapes_control_and_non_ascii() {
        assert_eq!(to_canonical_string(&json!("a\"b\\c\n")), r#""a\"b\\c\n""#);
        assert_eq!(to_canonical_string(&json!("é")), r#""\u00e9""#);
        assert_eq!(to_canonical_string(&json!("😀")), r#""\ud83d\ude00""#);
        assert_eq!(to_canonical_string(&json!("\u{7f}")), r#""\u007f""#);
    }
}
