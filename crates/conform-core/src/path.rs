//! # Paths — Typed Locations in a Value Tree
//!
//! A `Path` is the ordered key sequence from the root of a validated value
//! down to one node. Paths are grown by exactly one segment per descent and
//! are what error records carry so failures map back to exact nested
//! locations.
//!
//! Segments are a closed union: object keys are `Segment::Key`, array
//! positions are `Segment::Index`. There are no stringly-typed pointer
//! fragments to parse at runtime.

use std::fmt;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// One step of a descent: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object member access by key.
    Key(String),
    /// Array element access by position.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{k}"),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Ordered key sequence from the root value to one node.
///
/// # Invariants
///
/// - The empty path denotes the root.
/// - Every descent extends the parent path by exactly one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The root path (no segments).
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Borrow the underlying segments.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extend by one object-key segment.
    pub fn child_key(&self, key: impl Into<String>) -> Path {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Path(segments)
    }

    /// Extend by one array-index segment.
    pub fn child_index(&self, index: usize) -> Path {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Path(segments)
    }

    /// The segments remaining after removing `prefix`, or `None` when this
    /// path does not start with `prefix`.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<&[Segment]> {
        if self.0.len() < prefix.0.len() {
            return None;
        }
        if self.0[..prefix.0.len()] != prefix.0[..] {
            return None;
        }
        Some(&self.0[prefix.0.len()..])
    }

    /// The path as a JSON array of keys (strings) and indices (integers).
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|s| match s {
                    Segment::Key(k) => Value::String(k.clone()),
                    Segment::Index(i) => Value::Number((*i).into()),
                })
                .collect(),
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                Segment::Key(k) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{k}")?;
                }
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for seg in &self.0 {
            match seg {
                Segment::Key(k) => seq.serialize_element(k)?,
                Segment::Index(i) => seq.serialize_element(i)?,
            }
        }
        seq.end()
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Path(segments)
    }
}

/// Read the value at `path` inside an optional value tree.
///
/// Returns `None` when any step of the descent is absent (missing key,
/// out-of-bounds index, or shape mismatch).
pub fn read_at(root: &Option<Value>, path: &Path) -> Option<Value> {
    let mut cursor = root.as_ref()?;
    for seg in path.segments() {
        cursor = match (seg, cursor) {
            (Segment::Key(k), Value::Object(map)) => map.get(k)?,
            (Segment::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    Some(cursor.clone())
}

/// Write `value` at `path` inside an optional value tree, creating
/// intermediate containers as needed.
///
/// A `None` value removes an object key, writes `null` into an array slot,
/// and clears the tree entirely at the root.
pub fn write_at(root: &mut Option<Value>, path: &Path, value: Option<Value>) {
    let segments = path.segments();
    if segments.is_empty() {
        *root = value;
        return;
    }

    let first = &segments[0];
    let mut cursor = root.get_or_insert_with(|| empty_container(first));
    for i in 0..segments.len() - 1 {
        let next = &segments[i + 1];
        cursor = slot(cursor, &segments[i], empty_container(next));
    }

    let last = &segments[segments.len() - 1];
    match (last, value) {
        (Segment::Key(k), None) => {
            if let Value::Object(map) = cursor {
                map.remove(k);
            }
        }
        (Segment::Index(_), None) => {
            *slot(cursor, last, Value::Null) = Value::Null;
        }
        (_, Some(v)) => {
            *slot(cursor, last, Value::Null) = v;
        }
    }
}

/// The empty container matching a segment kind.
fn empty_container(seg: &Segment) -> Value {
    match seg {
        Segment::Key(_) => Value::Object(serde_json::Map::new()),
        Segment::Index(_) => Value::Array(Vec::new()),
    }
}

/// Navigate one segment, coercing the current node into the matching
/// container shape and padding arrays with `null` up to the index.
fn slot<'a>(cursor: &'a mut Value, seg: &Segment, template: Value) -> &'a mut Value {
    match seg {
        Segment::Key(k) => {
            if !matches!(cursor, Value::Object(_)) {
                *cursor = Value::Object(serde_json::Map::new());
            }
            let Value::Object(map) = cursor else {
                unreachable!("cursor was just coerced to an object");
            };
            map.entry(k.clone()).or_insert(template)
        }
        Segment::Index(i) => {
            if !matches!(cursor, Value::Array(_)) {
                *cursor = Value::Array(Vec::new());
            }
            let Value::Array(arr) = cursor else {
                unreachable!("cursor was just coerced to an array");
            };
            while arr.len() <= *i {
                arr.push(Value::Null);
            }
            &mut arr[*i]
        }
    }
}
