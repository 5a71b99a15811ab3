//! Text helpers for picking values out of scraped pages and loose JSON.

use serde_json::{Map, Value};

/// Return the text between `start` and `end` in `input`.
///
/// Markers are matched case-insensitively (ASCII). An empty `start` means
/// "from the beginning"; an empty or missing `end` means "to the end".
/// Returns an empty string when `input` is empty or `start` is not found.
pub fn fetch_value(input: &str, start: &str, end: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let rest = if start.is_empty() {
        input
    } else {
        match find_ignore_case(input, start) {
            Some(pos) => &input[pos + start.len()..],
            None => return String::new(),
        }
    };

    if end.is_empty() {
        return rest.to_string();
    }

    match find_ignore_case(rest, end) {
        Some(pos) => rest[..pos].to_string(),
        None => rest.to_string(),
    }
}

/// Byte offset of `needle` in `haystack`, ignoring ASCII case.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets identical to the original string.
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Parse the integer at the start of `input`, ignoring whatever follows.
///
/// Returns `None` when no digits lead the (trimmed) input.
pub fn leading_int(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Normalize an arbitrary JSON value into an object map.
///
/// - null, empty and scalar values become an empty map
/// - objects are returned as-is
/// - arrays become a map keyed by index
/// - strings are decoded as JSON and normalized again
pub fn decode_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| (idx.to_string(), item.clone()))
            .collect(),
        Value::String(raw) => decode_str(raw),
        _ => Map::new(),
    }
}

/// Decode a raw response body into an object map, empty when it is not JSON.
pub fn decode_str(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => decode_object(&value),
        _ => Map::new(),
    }
}
