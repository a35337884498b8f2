//! # Model — Fluent Schema Builder
//!
//! A `Model` is a fluent builder producing a specification tree (`spec`).
//! Every setter validates its argument against the registry snapshot the
//! model was constructed with, mutates the spec, and hands the instance back
//! for chaining; fallible setters return `Result` so callers chain with `?`.
//!
//! The spec is a transparent structure: downstream packages read
//! `model.spec` directly (including the `annotations` side-channel) to derive
//! their own metadata, and call `validate` to run the pipeline.
//!
//! By convention the spec is frozen once handed to `validate()`; `clone()`
//! deep-copies the spec — including every nested child and enum model — so a
//! clone can be mutated by an independent owner without affecting the
//! original.

use std::collections::BTreeMap;
use std::rc::Rc;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{CheckError, SchemaError, Violation};
use crate::path::Path;
use crate::phase::Phase;
use crate::registry::{AppliesFn, CoercionFn, HookKind, PredicateFn, Registry};
use crate::result::ValidationResult;
use crate::validator::Validator;

/// An ordered validation entry: a pattern or a predicate.
///
/// A pattern implicitly asserts the value is a string matching it. A
/// predicate receives the live result and reports through [`CheckError`].
#[derive(Clone)]
pub enum ValidationRule {
    Pattern(Regex),
    Predicate(PredicateFn),
}

impl ValidationRule {
    /// Compile a pattern rule.
    ///
    /// # Errors
    ///
    /// `SchemaError::InvalidPattern` when the regex does not compile.
    pub fn pattern(pattern: &str) -> Result<Self, SchemaError> {
        Regex::new(pattern)
            .map(ValidationRule::Pattern)
            .map_err(|e| SchemaError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Wrap a predicate closure.
    pub fn predicate(
        f: impl Fn(&mut ValidationResult) -> Result<(), CheckError> + 'static,
    ) -> Self {
        ValidationRule::Predicate(Rc::new(f))
    }

    /// Structural equality: pattern text, or predicate identity.
    pub(crate) fn same_rule(&self, other: &ValidationRule) -> bool {
        match (self, other) {
            (ValidationRule::Pattern(a), ValidationRule::Pattern(b)) => a.as_str() == b.as_str(),
            (ValidationRule::Predicate(a), ValidationRule::Predicate(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// One enum option: a literal value or a nested model.
#[derive(Clone)]
pub enum EnumOption {
    Literal(Value),
    Model(Box<Model>),
}

/// One declared object field: a key and the model validating it.
#[derive(Clone)]
pub struct Field {
    pub path: String,
    pub model: Model,
}

/// Children of a model node: a single element model (arrays) or an ordered
/// field list (objects). Never both.
#[derive(Clone)]
pub enum Children {
    Element(Box<Model>),
    Fields(Vec<Field>),
}

/// Accepted inputs for [`Model::children`].
pub enum ChildrenInput {
    /// Array element model. Legal only for `type == "array"`.
    Element(Model),
    /// Keyed map of fields, normalized into an ordered list preserving
    /// insertion order. Legal only for `type == "object"`.
    Keyed(Vec<(String, Model)>),
    /// Already-ordered field list. Legal only for `type == "object"`.
    Ordered(Vec<Field>),
}

/// The declarative schema tree describing one model node.
///
/// Transparent on purpose: consumers read it directly.
#[derive(Clone, Default)]
pub struct Spec {
    /// Registered type name. Must be set before most other fields.
    pub type_name: Option<String>,
    /// Declared format; must belong to the type's allowed format set.
    pub format: Option<String>,
    pub required: bool,
    pub nullable: bool,
    /// For objects: forbid input keys outside the declared child set.
    pub strict: bool,
    /// Substituted when the input value is missing (never for null).
    pub default: Option<Value>,
    /// The spec's own ordered validations, run after registry validations.
    pub validations: Vec<ValidationRule>,
    /// The spec's own per-phase coercions, run after registry coercions.
    pub coercions: BTreeMap<Phase, Vec<CoercionFn>>,
    /// Enum options. Homogeneous: all literals or all models.
    pub options: Vec<EnumOption>,
    /// Discriminator predicate consulted when this model is an enum option.
    pub applies: Option<AppliesFn>,
    pub children: Option<Children>,
    /// Namespaced metadata for downstream extensions. The engine never
    /// interprets it.
    pub annotations: BTreeMap<String, Value>,
}

/// Options for a validation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Convert a non-conforming terminal result into
    /// `SchemaError::ValidationFailed`.
    pub fail_loudly: bool,
}

/// Fluent schema builder bound to a compiled registry snapshot.
#[derive(Clone)]
pub struct Model {
    registry: Rc<Registry>,
    pub spec: Spec,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").finish_non_exhaustive()
    }
}

impl Model {
    /// A fresh model: registry defaults applied, construction hooks run.
    ///
    /// # Errors
    ///
    /// Any error raised by a construction hook.
    pub fn new(registry: Rc<Registry>) -> Result<Self, SchemaError> {
        let mut model = Model {
            registry: Rc::clone(&registry),
            spec: Spec::default(),
        };
        let defaults = registry.defaults();
        if let Some(required) = defaults.required {
            model.spec.required = required;
        }
        if let Some(nullable) = defaults.nullable {
            model.spec.nullable = nullable;
        }
        if let Some(strict) = defaults.strict {
            model.spec.strict = strict;
        }
        model
            .spec
            .annotations
            .extend(defaults.annotations.clone());
        for hook in registry.hooks(HookKind::Construction) {
            hook(&mut model)?;
        }
        Ok(model)
    }

    /// The registry snapshot this model is bound to.
    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    fn type_name(&self, setter: &str) -> Result<&str, SchemaError> {
        self.spec
            .type_name
            .as_deref()
            .ok_or_else(|| SchemaError::TypeNotSet(setter.to_string()))
    }

    /// Set the node type. Must be a registered type.
    pub fn with_type(mut self, type_name: &str) -> Result<Self, SchemaError> {
        if !self.registry.has_type(type_name) {
            return Err(SchemaError::UnknownType(type_name.to_string()));
        }
        self.spec.type_name = Some(type_name.to_string());
        Ok(self)
    }

    /// Set the node format. The type must already be set and the format must
    /// belong to its allowed set.
    pub fn with_format(mut self, format: &str) -> Result<Self, SchemaError> {
        let type_name = self.type_name("format")?.to_string();
        if !self.registry.formats_for(&type_name).iter().any(|f| f == format) {
            return Err(SchemaError::UnknownFormat {
                type_name,
                format: format.to_string(),
            });
        }
        self.spec.format = Some(format.to_string());
        Ok(self)
    }

    /// Require the value to be defined.
    pub fn required(mut self) -> Self {
        self.spec.required = true;
        self
    }

    /// Allow the value to be missing.
    pub fn optional(mut self) -> Self {
        self.spec.required = false;
        self
    }

    /// Allow explicit null.
    pub fn nullable(mut self) -> Self {
        self.spec.nullable = true;
        self
    }

    /// Forbid object keys outside the declared child set.
    pub fn strict(mut self) -> Self {
        self.spec.strict = true;
        self
    }

    /// Value substituted when the input is missing.
    pub fn with_default(mut self, value: Value) -> Self {
        self.spec.default = Some(value);
        self
    }

    /// Lower bound on string/array length or numeric value.
    pub fn min(mut self, bound: f64) -> Self {
        self.spec.validations.push(bound_rule(bound, Bound::Min));
        self
    }

    /// Upper bound on string/array length or numeric value.
    pub fn max(mut self, bound: f64) -> Self {
        self.spec.validations.push(bound_rule(bound, Bound::Max));
        self
    }

    /// Exact string/array length.
    pub fn size(mut self, expected: usize) -> Self {
        let rule = ValidationRule::predicate(move |r: &mut ValidationResult| {
            let actual = match r.value() {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(a)) => a.len(),
                _ => return Ok(()),
            };
            if actual != expected {
                return Err(CheckError::Violation(
                    Violation::new(format!("expected length to be {expected}"))
                        .with_actual(json!(actual))
                        .with_expected(json!(expected)),
                ));
            }
            Ok(())
        });
        self.spec.validations.push(rule);
        self
    }

    /// Set the enum option list. Options must be homogeneous: all literals
    /// or all models.
    ///
    /// # Errors
    ///
    /// `SchemaError::TypeNotSet` before the type; `SchemaError::MixedEnumOptions`
    /// for a heterogeneous list.
    pub fn options(mut self, options: Vec<EnumOption>) -> Result<Self, SchemaError> {
        self.type_name("enum")?;
        let literals = options.iter().filter(|o| matches!(o, EnumOption::Literal(_))).count();
        if literals != 0 && literals != options.len() {
            return Err(SchemaError::MixedEnumOptions);
        }
        self.spec.options = options;
        Ok(self)
    }

    /// Discriminator predicate used when this model is an enum option.
    pub fn applies(mut self, predicate: AppliesFn) -> Self {
        self.spec.applies = Some(predicate);
        self
    }

    /// Assign children. The input shape must match the node type: a single
    /// element model for arrays, a keyed map or ordered field list for
    /// objects. `set-children` hooks run after assignment.
    ///
    /// # Errors
    ///
    /// `SchemaError::ChildrenShape` on a type/shape mismatch;
    /// `SchemaError::DuplicateChildPath` when an ordered list repeats a path.
    pub fn children(mut self, input: ChildrenInput) -> Result<Self, SchemaError> {
        let type_name = self.type_name("children")?.to_string();
        let children = match input {
            ChildrenInput::Element(model) => {
                if type_name != "array" {
                    return Err(SchemaError::ChildrenShape(format!(
                        "a bare element model is only legal for type 'array', not '{type_name}'"
                    )));
                }
                Children::Element(Box::new(model))
            }
            ChildrenInput::Keyed(entries) => {
                if type_name != "object" {
                    return Err(SchemaError::ChildrenShape(format!(
                        "a keyed field map is only legal for type 'object', not '{type_name}'"
                    )));
                }
                let fields = entries
                    .into_iter()
                    .map(|(path, model)| Field { path, model })
                    .collect::<Vec<_>>();
                ensure_unique_paths(&fields)?;
                Children::Fields(fields)
            }
            ChildrenInput::Ordered(fields) => {
                if type_name != "object" {
                    return Err(SchemaError::ChildrenShape(format!(
                        "an ordered field list is only legal for type 'object', not '{type_name}'"
                    )));
                }
                ensure_unique_paths(&fields)?;
                Children::Fields(fields)
            }
        };
        self.spec.children = Some(children);
        let registry = Rc::clone(&self.registry);
        for hook in registry.hooks(HookKind::SetChildren) {
            hook(&mut self)?;
        }
        Ok(self)
    }

    /// Keep only the named object fields, preserving declaration order.
    /// Names not present are ignored.
    ///
    /// # Errors
    ///
    /// `SchemaError::ChildrenShape` when the model has no object field list.
    pub fn pick(mut self, paths: &[&str]) -> Result<Self, SchemaError> {
        let fields = self.take_fields("pick")?;
        self.spec.children = Some(Children::Fields(
            fields
                .into_iter()
                .filter(|f| paths.contains(&f.path.as_str()))
                .collect(),
        ));
        Ok(self)
    }

    /// Drop the named object fields.
    ///
    /// # Errors
    ///
    /// `SchemaError::ChildrenShape` when the model has no object field list.
    pub fn omit(mut self, paths: &[&str]) -> Result<Self, SchemaError> {
        let fields = self.take_fields("omit")?;
        self.spec.children = Some(Children::Fields(
            fields
                .into_iter()
                .filter(|f| !paths.contains(&f.path.as_str()))
                .collect(),
        ));
        Ok(self)
    }

    /// Concatenate another object model's field list onto this one.
    ///
    /// # Errors
    ///
    /// `SchemaError::ChildrenShape` unless both models are objects with field
    /// lists; `SchemaError::DuplicateChildPath` when the union repeats a path.
    pub fn merge(mut self, other: &Model) -> Result<Self, SchemaError> {
        let mut fields = self.take_fields("merge")?;
        match &other.spec.children {
            Some(Children::Fields(theirs)) => fields.extend(theirs.iter().cloned()),
            _ => {
                return Err(SchemaError::ChildrenShape(
                    "merge requires an object model with declared fields".into(),
                ))
            }
        }
        ensure_unique_paths(&fields)?;
        self.spec.children = Some(Children::Fields(fields));
        Ok(self)
    }

    /// Append one coercion at a phase.
    pub fn coerce(mut self, phase: Phase, coercion: CoercionFn) -> Self {
        self.spec.coercions.entry(phase).or_default().push(coercion);
        self
    }

    /// Reset all spec coercions and register the given entries, one
    /// [`Model::coerce`] call per entry.
    pub fn coercions(mut self, entries: Vec<(Phase, CoercionFn)>) -> Self {
        self.spec.coercions.clear();
        for (phase, coercion) in entries {
            self = self.coerce(phase, coercion);
        }
        self
    }

    /// Append one validation rule.
    pub fn validation(mut self, rule: ValidationRule) -> Self {
        self.spec.validations.push(rule);
        self
    }

    /// Append several validation rules, in order.
    pub fn validations(mut self, rules: Vec<ValidationRule>) -> Self {
        self.spec.validations.extend(rules);
        self
    }

    /// Attach namespaced metadata for downstream extensions.
    pub fn annotate(mut self, key: impl Into<String>, value: Value) -> Self {
        self.spec.annotations.insert(key.into(), value);
        self
    }

    /// Invoke an extension method from the registry's capability table.
    ///
    /// # Errors
    ///
    /// `SchemaError::UnknownMethod` when no method is registered under
    /// `name`; any error from the method itself.
    pub fn call(self, name: &str, args: &[Value]) -> Result<Self, SchemaError> {
        let method = self
            .registry
            .method(name)
            .ok_or_else(|| SchemaError::UnknownMethod(name.to_string()))?;
        method(self, args)
    }

    /// Validate a value against this model. `None` is a missing input.
    ///
    /// The input is copied into the run; caller data is never aliased or
    /// mutated.
    ///
    /// # Errors
    ///
    /// Configuration errors only; validation failures land in the result.
    pub fn validate(&self, value: Option<&Value>) -> Result<ValidationResult, SchemaError> {
        self.validate_with(value, ValidateOptions::default())
    }

    /// Validate with options.
    ///
    /// # Errors
    ///
    /// Configuration errors, plus `SchemaError::ValidationFailed` when
    /// `fail_loudly` is set and the final result does not conform.
    pub fn validate_with(
        &self,
        value: Option<&Value>,
        options: ValidateOptions,
    ) -> Result<ValidationResult, SchemaError> {
        let root = Rc::new(std::cell::RefCell::new(value.cloned()));
        let seed = ValidationResult::from_value(value.cloned(), root, Path::root());
        let result = Validator::new(Rc::clone(&self.registry)).run(&self.spec, seed)?;
        if options.fail_loudly && !result.conforms() {
            return Err(SchemaError::ValidationFailed {
                value: result.value().cloned(),
                violations: result.violations(),
            });
        }
        Ok(result)
    }

    fn take_fields(&mut self, setter: &str) -> Result<Vec<Field>, SchemaError> {
        let type_name = self.type_name(setter)?;
        if type_name != "object" {
            return Err(SchemaError::ChildrenShape(format!(
                "'{setter}' is only legal for type 'object', not '{type_name}'"
            )));
        }
        match self.spec.children.take() {
            Some(Children::Fields(fields)) => Ok(fields),
            Some(other) => {
                self.spec.children = Some(other);
                Err(SchemaError::ChildrenShape(format!(
                    "'{setter}' requires a declared field list"
                )))
            }
            None => Ok(Vec::new()),
        }
    }
}

enum Bound {
    Min,
    Max,
}

/// A min/max validation compiled from the builder shorthand: string and
/// array inputs are measured by length, numbers by value, everything else
/// passes.
fn bound_rule(bound: f64, kind: Bound) -> ValidationRule {
    ValidationRule::predicate(move |r: &mut ValidationResult| {
        let (actual, label) = match r.value() {
            Some(Value::String(s)) => (s.chars().count() as f64, "length"),
            Some(Value::Array(a)) => (a.len() as f64, "length"),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) => (f, "value"),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        let (ok, word) = match kind {
            Bound::Min => (actual >= bound, "at least"),
            Bound::Max => (actual <= bound, "at most"),
        };
        if !ok {
            return Err(CheckError::Violation(
                Violation::new(format!("expected {label} to be {word} {bound}"))
                    .with_actual(json!(actual))
                    .with_expected(json!(bound)),
            ));
        }
        Ok(())
    })
}

fn ensure_unique_paths(fields: &[Field]) -> Result<(), SchemaError> {
    let mut seen = std::collections::BTreeSet::new();
    for field in fields {
        if !seen.insert(field.path.as_str()) {
            return Err(SchemaError::DuplicateChildPath(field.path.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Extension;

    fn registry() -> Rc<Registry> {
        let mut reg = Registry::new();
        reg.merge(
            Extension::new()
                .with_type("string")
                .with_type("number")
                .with_type("object")
                .with_type("array")
                .with_formats("string", &["email"], false),
        )
        .unwrap();
        Rc::new(reg)
    }

    fn model(type_name: &str) -> Model {
        Model::new(registry()).unwrap().with_type(type_name).unwrap()
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Model::new(registry()).unwrap().with_type("ghost").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType(_)));
    }

    #[test]
    fn test_format_requires_type_first() {
        let err = Model::new(registry()).unwrap().with_format("email").unwrap_err();
        assert!(matches!(err, SchemaError::TypeNotSet(_)));
    }

    #[test]
    fn test_format_must_belong_to_type() {
        assert!(model("string").with_format("email").is_ok());
        let err = model("number").with_format("email").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownFormat { .. }));
    }

    #[test]
    fn test_flag_setters() {
        let m = model("string").required().nullable().strict();
        assert!(m.spec.required && m.spec.nullable && m.spec.strict);
        let m = m.optional();
        assert!(!m.spec.required);
    }

    #[test]
    fn test_element_children_only_for_array() {
        let element = model("number");
        assert!(model("array").children(ChildrenInput::Element(element.clone())).is_ok());
        let err = model("object")
            .children(ChildrenInput::Element(element))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ChildrenShape(_)));
    }

    #[test]
    fn test_keyed_children_normalize_in_order() {
        let m = model("object")
            .children(ChildrenInput::Keyed(vec![
                ("z".into(), model("number")),
                ("a".into(), model("string")),
            ]))
            .unwrap();
        let Some(Children::Fields(fields)) = &m.spec.children else {
            panic!("expected fields");
        };
        let order: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(order, vec!["z", "a"]);
    }

    #[test]
    fn test_keyed_children_only_for_object() {
        let err = model("array")
            .children(ChildrenInput::Keyed(vec![("a".into(), model("number"))]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ChildrenShape(_)));
    }

    #[test]
    fn test_ordered_children_duplicate_path() {
        let err = model("object")
            .children(ChildrenInput::Ordered(vec![
                Field { path: "a".into(), model: model("number") },
                Field { path: "a".into(), model: model("string") },
            ]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateChildPath(p) if p == "a"));
    }

    #[test]
    fn test_merge_concatenates_and_rejects_duplicates() {
        let left = model("object")
            .children(ChildrenInput::Keyed(vec![("a".into(), model("number"))]))
            .unwrap();
        let right = model("object")
            .children(ChildrenInput::Keyed(vec![("b".into(), model("string"))]))
            .unwrap();
        let merged = left.clone().merge(&right).unwrap();
        let Some(Children::Fields(fields)) = &merged.spec.children else {
            panic!("expected fields");
        };
        assert_eq!(fields.len(), 2);

        let err = merged.merge(&right).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateChildPath(_)));
    }

    #[test]
    fn test_merge_is_object_only() {
        let arr = model("array");
        let obj = model("object");
        assert!(arr.merge(&obj).is_err());
    }

    #[test]
    fn test_pick_and_omit() {
        let m = model("object")
            .children(ChildrenInput::Keyed(vec![
                ("a".into(), model("number")),
                ("b".into(), model("string")),
                ("c".into(), model("string")),
            ]))
            .unwrap();
        let picked = m.clone().pick(&["c", "a"]).unwrap();
        let Some(Children::Fields(fields)) = &picked.spec.children else {
            panic!("expected fields");
        };
        // pick preserves declaration order, not argument order.
        let order: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(order, vec!["a", "c"]);

        let omitted = m.omit(&["b"]).unwrap();
        let Some(Children::Fields(fields)) = &omitted.spec.children else {
            panic!("expected fields");
        };
        let order: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(order, vec!["a", "c"]);
    }

    #[test]
    fn test_options_must_be_homogeneous() {
        let err = model("string")
            .options(vec![
                EnumOption::Literal(json!("a")),
                EnumOption::Model(Box::new(model("string"))),
            ])
            .unwrap_err();
        assert!(matches!(err, SchemaError::MixedEnumOptions));
        assert!(model("string")
            .options(vec![EnumOption::Literal(json!("a")), EnumOption::Literal(json!("b"))])
            .is_ok());
    }

    #[test]
    fn test_coercions_reset_then_register() {
        let noop: CoercionFn = Rc::new(|_r: &mut ValidationResult| Ok(()));
        let m = model("string")
            .coerce(Phase::Parse, noop.clone())
            .coerce(Phase::Parse, noop.clone())
            .coercions(vec![(Phase::ValidateValue, noop)]);
        assert!(m.spec.coercions.get(&Phase::Parse).is_none());
        assert_eq!(m.spec.coercions.get(&Phase::ValidateValue).map(Vec::len), Some(1));
    }

    #[test]
    fn test_clone_is_deep_for_nested_models() {
        let original = model("object")
            .children(ChildrenInput::Keyed(vec![("n".into(), model("number"))]))
            .unwrap();
        let mut cloned = original.clone();
        let Some(Children::Fields(fields)) = &mut cloned.spec.children else {
            panic!("expected fields");
        };
        fields[0].model.spec.required = true;
        fields[0].path = "renamed".into();

        let Some(Children::Fields(fields)) = &original.spec.children else {
            panic!("expected fields");
        };
        assert_eq!(fields[0].path, "n");
        assert!(!fields[0].model.spec.required);
    }

    #[test]
    fn test_clone_is_deep_for_enum_models() {
        let original = model("string")
            .options(vec![EnumOption::Model(Box::new(model("string")))])
            .unwrap();
        let mut cloned = original.clone();
        let EnumOption::Model(inner) = &mut cloned.spec.options[0] else {
            panic!("expected model option");
        };
        inner.spec.required = true;
        let EnumOption::Model(inner) = &original.spec.options[0] else {
            panic!("expected model option");
        };
        assert!(!inner.spec.required);
    }

    #[test]
    fn test_call_unknown_method() {
        let err = model("string").call("primary", &[]).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownMethod(_)));
    }

    #[test]
    fn test_annotate() {
        let m = model("string").annotate("orm:column", json!("name"));
        assert_eq!(m.spec.annotations.get("orm:column"), Some(&json!("name")));
    }
}
