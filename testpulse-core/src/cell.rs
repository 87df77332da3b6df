//! Bitable cell value flattening
//!
//! Text cells arrive either as a plain string or as rich-text segments
//! (`[{"type": "text", "text": "..."}, {"type": "url", "text": "...", "link": "..."}]`).
//! Payload decoders only ever see the flattened string.

use serde_json::Value;

/// Flatten a cell value to its display text.
///
/// Strings are returned unchanged. Segment arrays are joined from each
/// segment's `text`; for `url` segments the visible text is kept, not the
/// link. Any other value has no text.
pub fn flatten_cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(segments) => Some(
            segments
                .iter()
                .filter_map(|segment| segment.get("text").and_then(Value::as_str))
                .collect(),
        ),
        _ => None,
    }
}

/// Turn raw input into payload text.
///
/// Input that parses as a string or a segment array is flattened. Anything
/// else (including a bare payload that is itself JSON) is returned as-is.
pub fn decode_cell_input(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if value.is_string() || value.as_array().is_some_and(|a| is_segment_list(a)) => {
            flatten_cell_text(&value).unwrap_or_default()
        }
        _ => raw.to_string(),
    }
}

/// True when every element looks like a rich-text segment
fn is_segment_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items.iter().all(|item| {
            item.get("type").is_some_and(Value::is_string)
                && item.get("text").is_some_and(Value::is_string)
        })
}
