//! Dotted-path access into JSON payloads.
//!
//! `properties.cart.total` walks object keys, numeric segments index arrays,
//! and `\.` escapes a literal dot inside a key.

use serde_json::{Map, Value};

/// Split a dotted path into its segments.
pub fn segments(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => out.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Look up a path. The empty path is the root itself.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    get_in(value, &segments(path))
}

/// Look up pre-split segments. No segments is the root.
pub fn get_in<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| child(current, segment))
}

/// Mutable variant of [`get`].
pub fn get_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in segments(path) {
        current = child_mut(current, &segment)?;
    }
    Some(current)
}

fn empty_container_for(next_segment: &str) -> Value {
    if next_segment.parse::<usize>().is_ok() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Existing element at `segment`, or a new trailing element when the index is
/// exactly one past the end. Anything further out is rejected.
fn slot_at<'a>(items: &'a mut Vec<Value>, segment: &str) -> Option<&'a mut Value> {
    let index = segment.parse::<usize>().ok()?;
    if index == items.len() {
        items.push(Value::Null);
    }
    items.get_mut(index)
}

/// Write `new_value` at `path`, creating missing intermediate containers.
///
/// Returns `false` without writing when the walk runs into a scalar or an
/// array index more than one past the end.
pub fn set(value: &mut Value, path: &str, new_value: Value) -> bool {
    let segs = segments(path);
    let Some((last, parents)) = segs.split_last() else {
        return false;
    };

    let mut current = value;
    for (i, segment) in parents.iter().enumerate() {
        let next = segs[i + 1].as_str();
        current = match current {
            Value::Object(map) => {
                let slot = map
                    .entry(segment.clone())
                    .or_insert_with(|| empty_container_for(next));
                if slot.is_null() {
                    *slot = empty_container_for(next);
                }
                slot
            }
            Value::Array(items) => {
                let Some(slot) = slot_at(items, segment) else {
                    return false;
                };
                if slot.is_null() {
                    *slot = empty_container_for(next);
                }
                slot
            }
            _ => return false,
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), new_value);
            true
        }
        Value::Array(items) => {
            match slot_at(items, last) {
                Some(slot) => {
                    *slot = new_value;
                    true
                }
                None => false,
            }
        }
        _ => false,
    }
}

/// Remove the value at `path`, returning it if it existed.
///
/// Array elements are removed in place, shifting the rest down.
pub fn remove(value: &mut Value, path: &str) -> Option<Value> {
    let segs = segments(path);
    let (last, parents) = segs.split_last()?;

    let mut current = value;
    for segment in parents {
        current = child_mut(current, segment)?;
    }

    match current {
        Value::Object(map) => map.remove(last.as_str()),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}
