//! # ValidationResult — The Carrier Threaded Through the Pipeline
//!
//! One `ValidationResult` exists per node per `validate()` call. It owns the
//! node's (deep-copied) value, the conformance flag, the ordered violation
//! list, and the short-circuit flag `is_finished`: once a node is finished no
//! further pipeline step may mutate it.
//!
//! All results of one call tree share a single **root arena** — the one
//! mutable top-level structure being assembled. Every node commits its value
//! into the arena at its path as soon as it finishes, which is what lets a
//! coercion on a later sibling read an earlier sibling's already-coerced
//! value. Visibility follows declaration order only; earlier siblings can
//! never see later ones.
//!
//! [`coalesce`] is the algebra that merges recursively-produced child results
//! back into their parent container result.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{CheckError, SchemaError, ValidationViolations, Violation};
use crate::path::{self, Path, Segment};

/// The shared, mutable top-level value being assembled by one call tree.
pub type RootArena = Rc<RefCell<Option<Value>>>;

/// Per-node validation state.
///
/// `value` is `None` when the node's value is missing (an absent object key
/// or an absent top-level input); `Some(Value::Null)` is an explicit null.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    value: Option<Value>,
    conforms: bool,
    errors: Vec<Violation>,
    is_finished: bool,
    root: RootArena,
    path: Path,
}

/// Serialized form of a result: the stable `{value, conforms, errors}`
/// contract. Violation causes (`source`) are never included.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// The final (coerced, defaulted, coalesced) value; `null` when missing.
    pub value: Option<Value>,
    /// Whether the value conforms to the schema.
    pub conforms: bool,
    /// Every violation collected, in pipeline order.
    pub errors: Vec<Violation>,
}

impl ValidationResult {
    /// Seed a fresh, open, conforming result — the standard way to start any
    /// recursive descent.
    pub fn from_value(value: Option<Value>, root: RootArena, path: Path) -> Self {
        ValidationResult {
            value,
            conforms: true,
            errors: Vec::new(),
            is_finished: false,
            root,
            path,
        }
    }

    /// The node's current value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether the node conforms so far.
    pub fn conforms(&self) -> bool {
        self.conforms
    }

    /// Violations collected so far, in order.
    pub fn errors(&self) -> &[Violation] {
        &self.errors
    }

    /// Whether the pipeline may still mutate this node.
    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    /// Location of this node relative to the validated root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle to the shared root arena (for seeding child results).
    pub fn root_handle(&self) -> RootArena {
        Rc::clone(&self.root)
    }

    /// Replace the node's value.
    pub fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }

    /// Set the short-circuit flag.
    pub fn set_finished(&mut self, finished: bool) {
        self.is_finished = finished;
    }

    /// Set conformance. `false` always forces `is_finished`.
    pub fn set_conforms(&mut self, conforms: bool) {
        self.conforms = conforms;
        if !conforms {
            self.is_finished = true;
        }
    }

    /// Replace the violation list.
    pub fn set_errors(&mut self, errors: Vec<Violation>) {
        self.errors = errors;
    }

    /// Record a violation: conforms becomes false, the node is finished, and
    /// the violation is appended. A violation without a path inherits this
    /// node's path.
    pub fn mark_errored(&mut self, mut violation: Violation) {
        if violation.path.is_none() {
            violation.path = Some(self.path.clone());
        }
        self.errors.push(violation);
        self.set_conforms(false);
    }

    /// Recognized assertion: `Err(CheckError::Violation)` when `cond` is
    /// false.
    pub fn assert(&self, cond: bool, message: impl Into<String>) -> Result<(), CheckError> {
        if cond {
            Ok(())
        } else {
            Err(CheckError::Violation(Violation::new(message)))
        }
    }

    /// A deep copy of this result's data sharing the same root arena.
    pub fn clone_result(&self) -> Self {
        self.clone()
    }

    /// A clone of the entire root arena value.
    pub fn root_value(&self) -> Option<Value> {
        self.root.borrow().clone()
    }

    /// Read the committed value at `path` inside the root arena.
    ///
    /// This is the declaration-order cross-read channel: a sibling processed
    /// earlier has already committed its coerced value there.
    pub fn root_at(&self, path: &Path) -> Option<Value> {
        path::read_at(&self.root.borrow(), path)
    }

    /// Write this node's value into the root arena at its path.
    pub fn commit(&self) {
        path::write_at(&mut self.root.borrow_mut(), &self.path, self.value.clone());
    }

    /// The stable `{value, conforms, errors}` report.
    pub fn to_report(&self) -> ValidationReport {
        ValidationReport {
            value: self.value.clone(),
            conforms: self.conforms,
            errors: self.errors.clone(),
        }
    }

    /// The report as a JSON value.
    pub fn to_json(&self) -> Value {
        // ValidationReport contains no non-serializable state.
        serde_json::to_value(self.to_report()).unwrap_or(Value::Null)
    }

    /// The violations as a displayable collection.
    pub fn violations(&self) -> ValidationViolations {
        ValidationViolations::from(self.errors.clone())
    }
}

/// Merge child results into a parent container result.
///
/// `conforms` is the AND over every input; `errors` are concatenated in
/// order. The value-merge policy branches on the root's value shape:
///
/// - array root — each result's path must extend the root path by exactly
///   one index segment, which selects the slot (arrays are padded with
///   `null`);
/// - object root — exactly one key segment, which selects the member
///   (missing child values leave the key absent);
/// - anything else — each result's path must equal the root path exactly,
///   and the last result's value replaces the root's.
///
/// The returned result's `is_finished` is `!conforms`: a fully-conforming
/// coalesced node is deliberately left open so later pipeline phases can
/// still run on it.
///
/// # Errors
///
/// `SchemaError::CoalesceOnFinished` when the root is already finished;
/// `SchemaError::CoalesceShape` when a result path does not fit the root's
/// shape. Both signal an engine-usage bug, not bad input.
pub fn coalesce(
    mut root: ValidationResult,
    results: Vec<ValidationResult>,
) -> Result<ValidationResult, SchemaError> {
    if root.is_finished {
        return Err(SchemaError::CoalesceOnFinished);
    }

    let mut conforms = root.conforms;
    for child in &results {
        conforms = conforms && child.conforms;
    }

    match &mut root.value {
        Some(Value::Array(slots)) => {
            for child in &results {
                let index = single_index_segment(&root.path, &child.path)?;
                while slots.len() <= index {
                    slots.push(Value::Null);
                }
                slots[index] = child.value.clone().unwrap_or(Value::Null);
            }
        }
        Some(Value::Object(members)) => {
            for child in &results {
                let key = single_key_segment(&root.path, &child.path)?;
                match &child.value {
                    Some(v) => {
                        members.insert(key, v.clone());
                    }
                    None => {
                        members.remove(&key);
                    }
                }
            }
        }
        _ => {
            for child in &results {
                if child.path != root.path {
                    return Err(SchemaError::CoalesceShape {
                        root: root.path.to_string(),
                        path: child.path.to_string(),
                        reason: "scalar root permits no further descent".into(),
                    });
                }
            }
            if let Some(last) = results.last() {
                root.value = last.value.clone();
            }
        }
    }

    for child in results {
        root.errors.extend(child.errors);
    }
    root.conforms = conforms;
    root.is_finished = !conforms;
    Ok(root)
}

/// The single additional index segment between `root` and `child`, or a
/// shape error.
fn single_index_segment(root: &Path, child: &Path) -> Result<usize, SchemaError> {
    match child.strip_prefix(root) {
        Some([Segment::Index(i)]) => Ok(*i),
        _ => Err(SchemaError::CoalesceShape {
            root: root.to_string(),
            path: child.to_string(),
            reason: "array root requires exactly one additional index segment".into(),
        }),
    }
}

/// The single additional key segment between `root` and `child`, or a shape
/// error.
fn single_key_segment(root: &Path, child: &Path) -> Result<String, SchemaError> {
    match child.strip_prefix(root) {
        Some([Segment::Key(k)]) => Ok(k.clone()),
        _ => Err(SchemaError::CoalesceShape {
            root: root.to_string(),
            path: child.to_string(),
            reason: "object root requires exactly one additional key segment".into(),
        }),
    }
}
