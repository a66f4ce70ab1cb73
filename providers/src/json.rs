//! Key lookups over arbitrarily nested JSON.
//!
//! Providers put the generated text at different depths (`output[].content[].text`
//! for the Responses API, `content[].text` for Messages), so extraction walks
//! the whole tree instead of deserializing a fixed schema.

use serde_json::Value;

/// Every string value stored under `key`, depth-first.
///
/// Objects are visited in document order; each value is checked against the
/// key before its children are searched. Arrays are searched element by
/// element.
pub fn deep_list<'a>(value: &'a Value, key: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    collect(value, key, &mut found);
    found
}

fn collect<'a>(value: &'a Value, key: &str, found: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    if let Value::String(s) = v {
                        found.push(s);
                    }
                }
                collect(v, key, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, key, found);
            }
        }
        _ => {}
    }
}

/// The first `max` non-empty strings under `key`, concatenated.
///
/// A `max` of zero keeps every match.
pub fn deep_string(value: &Value, key: &str, max: usize) -> String {
    let matches = deep_list(value, key).into_iter().filter(|s| !s.is_empty());
    if max == 0 {
        matches.collect()
    } else {
        matches.take(max).collect()
    }
}
