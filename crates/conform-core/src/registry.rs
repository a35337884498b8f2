//! # Registry — Compiled Options
//!
//! The registry merges extension contributions (types, formats, coercions,
//! validations, builder seeds, extension methods, spec defaults, lifecycle
//! hooks) into fast per-type/per-format lookup tables.
//!
//! Lookup layering for both coercions and validations:
//! [`FormatKey::All`] entries always apply; the declared format's entries
//! apply when any exist, otherwise [`FormatKey::Fallback`] entries do.
//!
//! Every closure is stored behind `Rc`, so a `Registry` clone is a cheap
//! compiled snapshot: data is copied, functions are shared.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::{CheckError, SchemaError};
use crate::model::{Model, ValidationRule};
use crate::phase::Phase;
use crate::result::ValidationResult;

/// A coercion: mutates the live result's value at a pipeline phase.
///
/// A returned `CheckError::Violation` folds into the node; `CheckError::Fatal`
/// aborts the whole `validate()` call.
pub type CoercionFn = Rc<dyn Fn(&mut ValidationResult) -> Result<(), CheckError>>;

/// A predicate validation over the live result.
pub type PredicateFn = Rc<dyn Fn(&mut ValidationResult) -> Result<(), CheckError>>;

/// Per-enum-option discriminator predicate. Receives the in-progress result,
/// which exposes the root arena for cross-field reads.
pub type AppliesFn = Rc<dyn Fn(&ValidationResult) -> bool>;

/// An extension-contributed model method, resolved through the capability
/// table by [`Model::call`].
pub type MethodFn = Rc<dyn Fn(Model, &[Value]) -> Result<Model, SchemaError>>;

/// A lifecycle hook running over a model under construction.
pub type HookFn = Rc<dyn Fn(&mut Model) -> Result<(), SchemaError>>;

/// A composite builder factory attached to the context by an extension.
pub type ContextFn = Rc<dyn Fn(&Context) -> Result<Model, SchemaError>>;

/// Format lookup key: the two sentinels plus named formats.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatKey {
    /// Applies regardless of the spec's declared format.
    All,
    /// Applies only when neither a named entry nor the declared format
    /// matches.
    Fallback,
    /// Applies to one declared format.
    Named(String),
}

/// Lifecycle phases at which registered hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookKind {
    /// After a fresh model is constructed and defaults were applied.
    Construction,
    /// After a model's children were assigned.
    SetChildren,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Construction => "construction",
            HookKind::SetChildren => "set-children",
        }
    }
}

/// Partial spec fragment merged into every new model.
///
/// Fields left `None` keep the engine default; merging two fragments is
/// field-wise last-write-wins.
#[derive(Clone, Default)]
pub struct SpecDefaults {
    pub required: Option<bool>,
    pub nullable: Option<bool>,
    pub strict: Option<bool>,
    pub annotations: BTreeMap<String, Value>,
}

impl SpecDefaults {
    fn merge_from(&mut self, other: SpecDefaults) {
        if other.required.is_some() {
            self.required = other.required;
        }
        if other.nullable.is_some() {
            self.nullable = other.nullable;
        }
        if other.strict.is_some() {
            self.strict = other.strict;
        }
        self.annotations.extend(other.annotations);
    }
}

/// A format block contributed by an extension.
#[derive(Clone)]
pub struct FormatSet {
    /// The type the formats belong to.
    pub type_name: String,
    /// The declared format names.
    pub formats: Vec<String>,
    /// When true, one builder seed is synthesized per declared format.
    pub builders: bool,
}

/// One coercion contribution.
#[derive(Clone)]
pub struct CoercionEntry {
    pub type_name: String,
    pub format: FormatKey,
    pub phase: Phase,
    pub coerce: CoercionFn,
}

/// One validation contribution.
#[derive(Clone)]
pub struct ValidationEntry {
    pub type_name: String,
    pub format: FormatKey,
    pub rule: ValidationRule,
}

/// A bundle of contributions registered through `Context::use_extension`.
#[derive(Clone, Default)]
pub struct Extension {
    pub types: Vec<String>,
    pub formats: Vec<FormatSet>,
    pub coercions: Vec<CoercionEntry>,
    pub validations: Vec<ValidationEntry>,
    pub methods: Vec<(String, MethodFn)>,
    pub defaults: SpecDefaults,
    pub hooks: Vec<(HookKind, HookFn)>,
    pub extend_context: Vec<(String, ContextFn)>,
}

impl Extension {
    pub fn new() -> Self {
        Extension::default()
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.types.push(name.into());
        self
    }

    pub fn with_formats(
        mut self,
        type_name: impl Into<String>,
        formats: &[&str],
        builders: bool,
    ) -> Self {
        self.formats.push(FormatSet {
            type_name: type_name.into(),
            formats: formats.iter().map(|f| f.to_string()).collect(),
            builders,
        });
        self
    }

    pub fn with_coercion(
        mut self,
        type_name: impl Into<String>,
        format: FormatKey,
        phase: Phase,
        coerce: CoercionFn,
    ) -> Self {
        self.coercions.push(CoercionEntry {
            type_name: type_name.into(),
            format,
            phase,
            coerce,
        });
        self
    }

    pub fn with_validation(
        mut self,
        type_name: impl Into<String>,
        format: FormatKey,
        rule: ValidationRule,
    ) -> Self {
        self.validations.push(ValidationEntry {
            type_name: type_name.into(),
            format,
            rule,
        });
        self
    }

    pub fn with_method(mut self, name: impl Into<String>, method: MethodFn) -> Self {
        self.methods.push((name.into(), method));
        self
    }

    pub fn with_defaults(mut self, defaults: SpecDefaults) -> Self {
        self.defaults.merge_from(defaults);
        self
    }

    pub fn with_hook(mut self, kind: HookKind, hook: HookFn) -> Self {
        self.hooks.push((kind, hook));
        self
    }

    pub fn with_context_factory(mut self, name: impl Into<String>, factory: ContextFn) -> Self {
        self.extend_context.push((name.into(), factory));
        self
    }
}

/// The compiled option tables shared by every model and validator.
#[derive(Clone, Default)]
pub struct Registry {
    types: Vec<String>,
    formats: BTreeMap<String, Vec<String>>,
    coercions: BTreeMap<String, BTreeMap<FormatKey, BTreeMap<Phase, Vec<CoercionFn>>>>,
    validations: BTreeMap<String, BTreeMap<FormatKey, Vec<ValidationRule>>>,
    methods: BTreeMap<String, MethodFn>,
    builder_seeds: BTreeMap<String, String>,
    defaults: SpecDefaults,
    hooks: BTreeMap<HookKind, Vec<HookFn>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Merge one extension's contributions.
    ///
    /// List-valued fields concatenate (with structural-equality dedupe for
    /// types and validations), defaults are last-write-wins, hooks always
    /// concatenate, and re-registering an existing format for a type is a
    /// configuration error.
    ///
    /// # Errors
    ///
    /// `SchemaError::UnknownType` for a format block naming an unregistered
    /// type; `SchemaError::DuplicateFormat` for a repeated format.
    pub fn merge(&mut self, extension: Extension) -> Result<(), SchemaError> {
        debug!(types = ?extension.types, "merging extension into registry");

        for t in extension.types {
            if !self.types.contains(&t) {
                self.types.push(t);
            }
        }

        for set in extension.formats {
            if !self.types.contains(&set.type_name) {
                return Err(SchemaError::UnknownType(set.type_name));
            }
            let known = self.formats.entry(set.type_name.clone()).or_default();
            for format in &set.formats {
                if known.contains(format) {
                    return Err(SchemaError::DuplicateFormat {
                        type_name: set.type_name.clone(),
                        format: format.clone(),
                    });
                }
                known.push(format.clone());
            }
            if set.builders {
                for format in set.formats {
                    self.builder_seeds.insert(format, set.type_name.clone());
                }
            }
        }

        for entry in extension.coercions {
            if !self.types.contains(&entry.type_name) {
                return Err(SchemaError::UnknownType(entry.type_name));
            }
            self.coercions
                .entry(entry.type_name)
                .or_default()
                .entry(entry.format)
                .or_default()
                .entry(entry.phase)
                .or_default()
                .push(entry.coerce);
        }

        for entry in extension.validations {
            if !self.types.contains(&entry.type_name) {
                return Err(SchemaError::UnknownType(entry.type_name));
            }
            let slot = self
                .validations
                .entry(entry.type_name)
                .or_default()
                .entry(entry.format)
                .or_default();
            if !slot.iter().any(|r| r.same_rule(&entry.rule)) {
                slot.push(entry.rule);
            }
        }

        for (name, method) in extension.methods {
            self.methods.insert(name, method);
        }

        self.defaults.merge_from(extension.defaults);

        for (kind, hook) in extension.hooks {
            self.hooks.entry(kind).or_default().push(hook);
        }

        Ok(())
    }

    /// Whether `name` is a registered type.
    pub fn has_type(&self, name: &str) -> bool {
        self.types.iter().any(|t| t == name)
    }

    /// Registered type names, in registration order.
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// The allowed format set for a type.
    pub fn formats_for(&self, type_name: &str) -> &[String] {
        self.formats.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The type seeded by a `builders: true` format, if any.
    pub fn builder_seed(&self, format: &str) -> Option<&str> {
        self.builder_seeds.get(format).map(String::as_str)
    }

    /// Look up an extension method by name.
    pub fn method(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }

    /// The default spec fragment merged into every new model.
    pub fn defaults(&self) -> &SpecDefaults {
        &self.defaults
    }

    /// Hooks registered for one lifecycle phase.
    pub fn hooks(&self, kind: HookKind) -> &[HookFn] {
        self.hooks.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registry coercions for one node and phase: `All` entries first, then
    /// the declared format's entries when any exist, otherwise `Fallback`
    /// entries.
    pub fn coercions_for(
        &self,
        type_name: &str,
        format: Option<&str>,
        phase: Phase,
    ) -> Vec<CoercionFn> {
        let Some(by_format) = self.coercions.get(type_name) else {
            return Vec::new();
        };
        let mut out: Vec<CoercionFn> = Vec::new();
        if let Some(by_phase) = by_format.get(&FormatKey::All) {
            if let Some(fns) = by_phase.get(&phase) {
                out.extend(fns.iter().cloned());
            }
        }
        let named = format
            .and_then(|f| by_format.get(&FormatKey::Named(f.to_string())))
            .and_then(|by_phase| by_phase.get(&phase))
            .filter(|fns| !fns.is_empty());
        match named {
            Some(fns) => out.extend(fns.iter().cloned()),
            None => {
                if let Some(by_phase) = by_format.get(&FormatKey::Fallback) {
                    if let Some(fns) = by_phase.get(&phase) {
                        out.extend(fns.iter().cloned());
                    }
                }
            }
        }
        out
    }

    /// Registry validations for one node, with the same layering as
    /// [`Registry::coercions_for`].
    pub fn validations_for(&self, type_name: &str, format: Option<&str>) -> Vec<ValidationRule> {
        let Some(by_format) = self.validations.get(type_name) else {
            return Vec::new();
        };
        let mut out: Vec<ValidationRule> = Vec::new();
        if let Some(rules) = by_format.get(&FormatKey::All) {
            out.extend(rules.iter().cloned());
        }
        let named = format
            .and_then(|f| by_format.get(&FormatKey::Named(f.to_string())))
            .filter(|rules| !rules.is_empty());
        match named {
            Some(rules) => out.extend(rules.iter().cloned()),
            None => {
                if let Some(rules) = by_format.get(&FormatKey::Fallback) {
                    out.extend(rules.iter().cloned());
                }
            }
        }
        out
    }
}
