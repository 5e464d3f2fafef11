//! The fixed filter set
//!
//! Copyright (c) 2025 Promptgate Team
//! Licensed under the Apache-2.0 license

use super::render::to_display_string;
use serde_json::Value;

/// Apply one filter to a value. Unknown filters pass the value through; the
/// strict-mode rejection happens at parse time, not here.
pub fn apply(name: &str, value: Value, args: &[Value]) -> Value {
    match name {
        "join" => join(value, args),
        "numbered" => numbered(value, args),
        "default" => default(value, args),
        "capitalize" => capitalize(value),
        "upcase" => map_string(value, |s| s.to_uppercase()),
        "downcase" => map_string(value, |s| s.to_lowercase()),
        "size" => size(value),
        _ => value,
    }
}

/// Join a sequence with a separator; pass-through for non-sequences.
fn join(value: Value, args: &[Value]) -> Value {
    let separator = args
        .first()
        .map(to_display_string)
        .unwrap_or_else(|| ", ".to_string());

    match value {
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(to_display_string)
                .collect::<Vec<_>>()
                .join(&separator);
            Value::String(joined)
        }
        other => other,
    }
}

/// `numbered` turns element *i* (1-indexed) into `"{prefix}{i}. {element}"`.
fn numbered(value: Value, args: &[Value]) -> Value {
    let prefix = args
        .first()
        .map(to_display_string)
        .unwrap_or_else(|| "  ".to_string());

    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    Value::String(format!("{}{}. {}", prefix, i + 1, to_display_string(item)))
                })
                .collect(),
        ),
        other => other,
    }
}

/// Substitute the fallback when the value is null, missing, or the empty
/// string. `0` and `false` are preserved.
fn default(value: Value, args: &[Value]) -> Value {
    let fallback = args.first().cloned().unwrap_or(Value::Null);
    match &value {
        Value::Null => fallback,
        Value::String(s) if s.is_empty() => fallback,
        _ => value,
    }
}

/// Upper-case the first code point; non-strings pass through.
fn capitalize(value: Value) -> Value {
    map_string(value, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    })
}

fn map_string(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

/// Length of a sequence or string, key count for a mapping, 0 otherwise.
fn size(value: Value) -> Value {
    let n = match &value {
        Value::Array(items) => items.len(),
        Value::String(s) => s.chars().count(),
        Value::Object(map) => map.len(),
        _ => 0,
    };
    Value::Number(n.into())
}
