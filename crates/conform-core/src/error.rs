//! # Error Types — Two Channels, Never Mixed
//!
//! The engine distinguishes two kinds of failure:
//!
//! - **Validation failures** are expected, per-node events. They are
//!   represented as [`Violation`] records, collected into the result's error
//!   list, and never abort sibling processing.
//! - **Configuration errors** ([`SchemaError`]) signal a schema-authoring bug:
//!   an unknown type, a format outside the type's allowed set, an illegal
//!   children shape, coalescing on a finished result. These are returned as
//!   `Err` immediately and are never captured into a result.
//!
//! Predicate validations and coercions report through [`CheckError`], which
//! keeps the two channels separate at the closure boundary: a recognized
//! `Violation` folds into the current node, anything `Fatal` aborts the whole
//! `validate()` call.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::path::Path;

/// A single validation failure with structured context.
///
/// `source` carries the internal cause for debugging and is never serialized;
/// the stable output contract is `{message, path?, actual?, expected?,
/// details?}`.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// Human-readable description of the failure.
    pub message: String,
    /// Location of the failing node, relative to the validated root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,
    /// The offending value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    /// What the schema expected instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// Aggregated failures from subordinate checks (e.g. every enum option
    /// that was tried and rejected).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<Violation>>,
    /// Internal cause. Excluded from serialized reports.
    #[serde(skip)]
    pub source: Option<String>,
}

impl Violation {
    /// A violation with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Violation {
            message: message.into(),
            path: None,
            actual: None,
            expected: None,
            details: None,
            source: None,
        }
    }

    pub fn with_path(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_actual(mut self, actual: Value) -> Self {
        self.actual = Some(actual);
        self
    }

    pub fn with_expected(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }

    pub fn with_details(mut self, details: Vec<Violation>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) if !path.is_empty() => write!(f, "  {path}: {}", self.message),
            _ => write!(f, "  (root): {}", self.message),
        }
    }
}

/// Collection of violations, displayed one per line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationViolations(Vec<Violation>);

impl ValidationViolations {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Violation> {
        self.0
    }
}

impl From<Vec<Violation>> for ValidationViolations {
    fn from(violations: Vec<Violation>) -> Self {
        ValidationViolations(violations)
    }
}

impl fmt::Display for ValidationViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Configuration and authoring errors.
///
/// These signal a schema bug rather than bad input: they are returned
/// synchronously and never folded into a [`crate::ValidationResult`].
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The named type is not registered.
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// The format is not in the type's allowed format set.
    #[error("format '{format}' is not registered for type '{type_name}'")]
    UnknownFormat {
        /// The spec's declared type.
        type_name: String,
        /// The rejected format name.
        format: String,
    },

    /// An extension re-registered a format that the type already has.
    #[error("format '{format}' is already registered for type '{type_name}'")]
    DuplicateFormat {
        /// The type carrying the duplicate.
        type_name: String,
        /// The format registered twice.
        format: String,
    },

    /// A setter that needs the type ran before `with_type`.
    #[error("type must be set before '{0}'")]
    TypeNotSet(String),

    /// Children input shape is illegal for the spec's type.
    #[error("children: {0}")]
    ChildrenShape(String),

    /// Two children claim the same path.
    #[error("duplicate child path '{0}'")]
    DuplicateChildPath(String),

    /// Enum options mix literals and models.
    #[error("enum options must be all literals or all models")]
    MixedEnumOptions,

    /// A regex-valued validation rule failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern text.
        pattern: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// No extension method is registered under this name.
    #[error("unknown extension method '{0}'")]
    UnknownMethod(String),

    /// An extension method rejected its arguments.
    #[error("method '{method}': {reason}")]
    MethodArgs {
        /// The invoked method name.
        method: String,
        /// Why the arguments were rejected.
        reason: String,
    },

    /// No builder seed is registered for this format.
    #[error("no builder is registered for format '{0}'")]
    UnknownBuilder(String),

    /// No context factory is registered under this name.
    #[error("unknown context factory '{0}'")]
    UnknownFactory(String),

    /// `coalesce` was invoked on a result already marked finished.
    #[error("cannot coalesce on a finished result")]
    CoalesceOnFinished,

    /// A coalesced result's path does not descend from the root as the
    /// root's value shape requires.
    #[error("cannot coalesce result at '{path}' into '{root}': {reason}")]
    CoalesceShape {
        /// The root result's path.
        root: String,
        /// The offending child path.
        path: String,
        /// Why the shapes are incompatible.
        reason: String,
    },

    /// Terminal error for `fail_loudly` validation: the final result did not
    /// conform.
    #[error("validation failed:\n{violations}")]
    ValidationFailed {
        /// The (possibly partially coerced) output value.
        value: Option<Value>,
        /// Every violation collected by the run.
        violations: ValidationViolations,
    },
}

/// What a predicate validation or coercion returns on failure.
#[derive(Error, Debug)]
pub enum CheckError {
    /// A recognized validation failure. Folded into the node's error list;
    /// sibling processing continues.
    #[error("{0}")]
    Violation(Violation),

    /// Anything else. Aborts the entire top-level `validate()` call.
    #[error(transparent)]
    Fatal(#[from] SchemaError),
}

impl From<Violation> for CheckError {
    fn from(v: Violation) -> Self {
        CheckError::Violation(v)
    }
}
