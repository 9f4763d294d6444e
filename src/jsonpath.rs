//! Dotted token paths
//!
//! Supports:
//! - a.b.c (dot notation)
//! - a[0].b and a.0.b (array index)
//!
//! Does NOT support filters, wildcards or slices.

use serde_json::{Map, Value};

use crate::error::BindError;

/// A parsed path segment
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0]
    Index(usize),
}

fn unsupported(path: &str, position: usize, details: &str) -> BindError {
    BindError::TemplateParse {
        position,
        details: format!("path '{path}': {details}"),
    }
}

/// Parse a dotted path into segments
///
/// Examples:
/// - "order.customer" → [Field("order"), Field("customer")]
/// - "items[0].name" → [Field("items"), Index(0), Field("name")]
pub fn parse(path: &str) -> Result<Vec<Segment>, BindError> {
    if path.is_empty() {
        return Err(unsupported(path, 0, "empty path"));
    }

    let mut segments = Vec::new();
    let mut offset = 0;

    for part in path.split('.') {
        if part.is_empty() {
            return Err(unsupported(path, offset, "empty segment"));
        }

        if let Some(bracket_pos) = part.find('[') {
            let field = &part[..bracket_pos];
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }

            if !part.ends_with(']') {
                return Err(unsupported(path, offset + bracket_pos, "unclosed '['"));
            }

            let index_str = &part[bracket_pos + 1..part.len() - 1];
            let index: usize = index_str
                .parse()
                .map_err(|_| unsupported(path, offset + bracket_pos, "index must be a number"))?;

            segments.push(Segment::Index(index));
        } else if let Ok(index) = part.parse::<usize>() {
            // "items.0" is equivalent to "items[0]"
            segments.push(Segment::Index(index));
        } else {
            segments.push(Segment::Field(part.to_string()));
        }

        offset += part.len() + 1;
    }

    Ok(segments)
}

/// Apply segments to a JSON value without cloning intermediate nodes
pub fn apply<'v>(value: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    let mut current = value;

    for segment in segments {
        current = match segment {
            Segment::Field(name) => current.get(name)?,
            // Objects built by `insert` key indexes by their decimal form
            Segment::Index(idx) => match current {
                Value::Object(map) => map.get(&idx.to_string())?,
                _ => current.get(*idx)?,
            },
        };
    }

    Some(current)
}

/// Write `leaf` at a dotted field path, creating intermediate objects only
/// along the referenced path. Existing containers are reused.
///
/// Index segments are written as object keys, since replacement data is
/// addressed by name.
pub fn insert(root: &mut Map<String, Value>, segments: &[Segment], leaf: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        let slot = current
            .entry(segment_key(segment))
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }

    current.insert(segment_key(last), leaf);
}

fn segment_key(segment: &Segment) -> String {
    match segment {
        Segment::Field(name) => name.clone(),
        Segment::Index(idx) => idx.to_string(),
    }
}
