//! # conform-core — Schema Builder and Validation Engine
//!
//! This crate is the engine of the Conform stack: a declarative schema
//! builder plus a multi-phase validation and coercion pipeline over
//! `serde_json::Value` trees. Extension crates (such as `conform-std`)
//! contribute types, formats, coercions, and validations; this crate owns
//! the machinery that compiles and runs them.
//!
//! ## Key Design Principles
//!
//! 1. **Explicit registry snapshots.** There is no global registry. A
//!    [`Context`] accumulates [`Extension`] contributions and hands every
//!    model an immutable compiled snapshot (`Rc<Registry>`). Extensions
//!    registered later never mutate schemas already built.
//!
//! 2. **Closed unions over validated strings.** Pipeline phases
//!    ([`Phase`]), format keys ([`FormatKey`]), children shapes, and enum
//!    options are enums. An unknown phase or a mixed enum list is
//!    unrepresentable or rejected at build time, not validation time.
//!
//! 3. **Two error channels, never mixed.** Schema-authoring bugs are
//!    [`SchemaError`] values returned as `Err`; validation failures are
//!    [`Violation`] records collected into the [`ValidationResult`]. A
//!    closure reports through [`CheckError`] to pick its channel.
//!
//! 4. **Missing is not null.** A node value is `Option<serde_json::Value>`:
//!    `None` is a missing input (absent object key), `Some(Value::Null)` is
//!    an explicit null. `required` and `nullable` act on different states.
//!
//! 5. **Declaration order is visibility order.** All results of one
//!    `validate()` call share a root arena; each node commits its coerced
//!    value there when it finishes. A later sibling can read an earlier
//!    sibling's committed value, never the reverse.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - Caller data is never aliased: `validate` deep-copies its input.

pub mod context;
pub mod error;
pub mod model;
pub mod path;
pub mod phase;
pub mod registry;
pub mod result;
pub mod validator;

// Re-export primary types for ergonomic imports.
pub use context::Context;
pub use error::{CheckError, SchemaError, ValidationViolations, Violation};
pub use model::{
    Children, ChildrenInput, EnumOption, Field, Model, Spec, ValidateOptions, ValidationRule,
};
pub use path::{Path, Segment};
pub use phase::Phase;
pub use registry::{
    AppliesFn, CoercionFn, ContextFn, Extension, FormatKey, HookFn, HookKind, MethodFn,
    PredicateFn, Registry, SpecDefaults,
};
pub use result::{coalesce, RootArena, ValidationReport, ValidationResult};
pub use validator::Validator;
