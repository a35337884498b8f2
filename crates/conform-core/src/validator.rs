//! # Validator — The Ten-Step Pipeline
//!
//! A validator is stateless per call: given a spec and a registry snapshot it
//! runs a fixed, ordered pipeline over one input value, recursing into child
//! models through fresh results that share the same root arena.
//!
//! Pipeline order per node (every step is a no-op once the result is
//! finished):
//!
//! 1. coerce @ parse
//! 2. validate-definition (required / default / nullable; null and missing
//!    values are terminal)
//! 3. coerce @ validate-definition
//! 4. coerce @ coerce-type
//! 5. validate-children (recursive descent, coalesced back)
//! 6. coerce @ validate-children
//! 7. validate-enum (exclusive discriminator, then ordered trial)
//! 8. coerce @ validate-enum
//! 9. validate-value (registry rules, then the spec's own)
//! 10. coerce @ validate-value
//!
//! After step 10 the node's value is committed into the root arena at its
//! path. Siblings are processed in declaration order, so a coercion running
//! for a later field can read an earlier field's committed value off the
//! arena; earlier siblings can never see later ones.
//!
//! Recognized violations fold into the node's error list and never abort
//! sibling processing. Anything fatal propagates, aborting the whole
//! `validate()` call with no result.

use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::error::{CheckError, SchemaError, Violation};
use crate::model::{Children, EnumOption, Model, Spec, ValidationRule};
use crate::phase::Phase;
use crate::registry::Registry;
use crate::result::{coalesce, ValidationResult};

/// Stateless pipeline executor bound to a registry snapshot.
pub struct Validator {
    registry: Rc<Registry>,
}

impl Validator {
    pub fn new(registry: Rc<Registry>) -> Self {
        Validator { registry }
    }

    /// Run the full pipeline for one node and return its result.
    ///
    /// # Errors
    ///
    /// Configuration errors only (unset type, coalesce shape bugs, fatal
    /// check errors). Validation failures land in the returned result.
    pub fn run(
        &self,
        spec: &Spec,
        result: ValidationResult,
    ) -> Result<ValidationResult, SchemaError> {
        let type_name = spec
            .type_name
            .clone()
            .ok_or_else(|| SchemaError::TypeNotSet("validate".to_string()))?;
        trace!(path = %result.path(), node_type = %type_name, "validating node");

        let mut r = result;
        r = self.coerce_phase(spec, &type_name, r, Phase::Parse)?;
        validate_definition(spec, &mut r);
        r = self.coerce_phase(spec, &type_name, r, Phase::ValidateDefinition)?;
        r = self.coerce_phase(spec, &type_name, r, Phase::CoerceType)?;
        r = self.validate_children(spec, r)?;
        r = self.coerce_phase(spec, &type_name, r, Phase::ValidateChildren)?;
        r = self.validate_enum(spec, r)?;
        r = self.coerce_phase(spec, &type_name, r, Phase::ValidateEnum)?;
        r = self.validate_value(spec, &type_name, r)?;
        r = self.coerce_phase(spec, &type_name, r, Phase::ValidateValue)?;

        r.commit();
        Ok(r)
    }

    /// Run every coercion registered for this node at `phase`: registry
    /// entries (`All`, then the declared format's or `Fallback`), then the
    /// spec's own entries.
    fn coerce_phase(
        &self,
        spec: &Spec,
        type_name: &str,
        mut r: ValidationResult,
        phase: Phase,
    ) -> Result<ValidationResult, SchemaError> {
        if r.is_finished() {
            return Ok(r);
        }
        let mut coercions = self
            .registry
            .coercions_for(type_name, spec.format.as_deref(), phase);
        if let Some(own) = spec.coercions.get(&phase) {
            coercions.extend(own.iter().cloned());
        }
        for coercion in coercions {
            if r.is_finished() {
                break;
            }
            match coercion(&mut r) {
                Ok(()) => {}
                Err(CheckError::Violation(v)) => r.mark_errored(v),
                Err(CheckError::Fatal(e)) => return Err(e),
            }
        }
        Ok(r)
    }

    /// Step 5: recurse into children and coalesce their results back.
    fn validate_children(
        &self,
        spec: &Spec,
        mut r: ValidationResult,
    ) -> Result<ValidationResult, SchemaError> {
        if r.is_finished() {
            return Ok(r);
        }
        let Some(children) = &spec.children else {
            return Ok(r);
        };
        match children {
            Children::Element(element) => {
                let Some(Value::Array(items)) = r.value() else {
                    // Shape mismatch is validate-value's to report.
                    return Ok(r);
                };
                let items = items.clone();
                let mut results = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let seed = ValidationResult::from_value(
                        Some(item),
                        r.root_handle(),
                        r.path().child_index(index),
                    );
                    results.push(self.run(&element.spec, seed)?);
                }
                r.set_value(Some(Value::Array(Vec::new())));
                r = coalesce(r, results)?;
            }
            Children::Fields(fields) => {
                let Some(Value::Object(members)) = r.value() else {
                    return Ok(r);
                };
                let members = members.clone();
                let mut results = Vec::with_capacity(fields.len());
                for field in fields {
                    let seed = ValidationResult::from_value(
                        members.get(&field.path).cloned(),
                        r.root_handle(),
                        r.path().child_key(&field.path),
                    );
                    results.push(self.run(&field.model.spec, seed)?);
                }

                let declared: BTreeSet<&str> = fields.iter().map(|f| f.path.as_str()).collect();
                let mut leftovers = serde_json::Map::new();
                let mut unknown = Vec::new();
                for (key, value) in members {
                    if !declared.contains(key.as_str()) {
                        if spec.strict {
                            unknown.push(key.clone());
                        }
                        // Leftovers pass through unexamined.
                        leftovers.insert(key, value);
                    }
                }
                r.set_value(Some(Value::Object(leftovers)));
                r = coalesce(r, results)?;
                for key in unknown {
                    let path = r.path().child_key(&key);
                    r.mark_errored(
                        Violation::new(format!("unexpected key '{key}'")).with_path(path),
                    );
                }
            }
        }
        Ok(r)
    }

    /// Step 7: enum membership. Literal options use exact equality. Model
    /// options resolve in two independent stages: the exclusive
    /// discriminator, then the ordered trial over the remaining options.
    fn validate_enum(
        &self,
        spec: &Spec,
        mut r: ValidationResult,
    ) -> Result<ValidationResult, SchemaError> {
        if r.is_finished() || spec.options.is_empty() {
            return Ok(r);
        }

        if spec
            .options
            .iter()
            .all(|o| matches!(o, EnumOption::Literal(_)))
        {
            let matched = spec.options.iter().any(
                |o| matches!(o, EnumOption::Literal(literal) if Some(literal) == r.value()),
            );
            if !matched {
                let expected = Value::Array(
                    spec.options
                        .iter()
                        .filter_map(|o| match o {
                            EnumOption::Literal(l) => Some(l.clone()),
                            EnumOption::Model(_) => None,
                        })
                        .collect(),
                );
                let actual = r.value().cloned().unwrap_or(Value::Null);
                r.mark_errored(
                    Violation::new("expected value to be one of the enum options")
                        .with_actual(actual)
                        .with_expected(expected),
                );
            }
            return Ok(r);
        }

        // Stage one: exclusive discriminator. At most one option should
        // apply; its result is used unconditionally, pass or fail.
        if let Some(option) = self.discriminate(spec, &r) {
            let sub = self.run(&option.spec, self.option_seed(&r))?;
            let conforms = sub.conforms();
            r.set_value(sub.value().cloned());
            if !conforms {
                let mut errors = r.errors().to_vec();
                errors.extend(sub.errors().iter().cloned());
                r.set_errors(errors);
                r.set_conforms(false);
            }
            return Ok(r);
        }

        // Stage two: ordered trial over the options without a discriminator.
        let mut failures: Vec<Violation> = Vec::new();
        for option in &spec.options {
            let EnumOption::Model(model) = option else {
                continue;
            };
            if model.spec.applies.is_some() {
                continue;
            }
            let sub = self.run(&model.spec, self.option_seed(&r))?;
            if sub.conforms() {
                r.set_value(sub.value().cloned());
                return Ok(r);
            }
            failures.extend(sub.errors().iter().cloned());
        }
        let actual = r.value().cloned().unwrap_or(Value::Null);
        r.mark_errored(
            Violation::new("expected value to match one of the enum options")
                .with_actual(actual)
                .with_details(failures),
        );
        Ok(r)
    }

    /// The first model option whose `applies` predicate accepts the live
    /// result.
    fn discriminate<'a>(&self, spec: &'a Spec, r: &ValidationResult) -> Option<&'a Model> {
        for option in &spec.options {
            let EnumOption::Model(model) = option else {
                continue;
            };
            if let Some(applies) = &model.spec.applies {
                if applies(r) {
                    return Some(model.as_ref());
                }
            }
        }
        None
    }

    /// Seed for an enum option's sub-validation: same value, same path, same
    /// arena (no descent).
    fn option_seed(&self, r: &ValidationResult) -> ValidationResult {
        ValidationResult::from_value(r.value().cloned(), r.root_handle(), r.path().clone())
    }

    /// Step 9: run registry validations (`All`, then format-specific or
    /// `Fallback`), then the spec's own list, in order.
    fn validate_value(
        &self,
        spec: &Spec,
        type_name: &str,
        mut r: ValidationResult,
    ) -> Result<ValidationResult, SchemaError> {
        if r.is_finished() {
            return Ok(r);
        }
        let mut rules = self
            .registry
            .validations_for(type_name, spec.format.as_deref());
        rules.extend(spec.validations.iter().cloned());
        for rule in rules {
            if r.is_finished() {
                break;
            }
            match rule {
                ValidationRule::Pattern(re) => {
                    let violation = match r.value() {
                        Some(Value::String(s)) if re.is_match(s) => None,
                        Some(Value::String(s)) => Some(
                            Violation::new(format!(
                                "expected value to match pattern '{}'",
                                re.as_str()
                            ))
                            .with_actual(Value::String(s.clone()))
                            .with_expected(Value::String(re.as_str().to_string())),
                        ),
                        other => Some(
                            Violation::new("expected value to be a string")
                                .with_actual(other.cloned().unwrap_or(Value::Null)),
                        ),
                    };
                    if let Some(v) = violation {
                        r.mark_errored(v);
                    }
                }
                ValidationRule::Predicate(predicate) => match predicate(&mut r) {
                    Ok(()) => {}
                    Err(CheckError::Violation(v)) => r.mark_errored(v),
                    Err(CheckError::Fatal(e)) => return Err(e),
                },
            }
        }
        Ok(r)
    }
}

/// Step 2: the built-in definition checks.
///
/// Required is checked before default substitution; the default is
/// substituted only for a missing value, never for null; a missing or null
/// value is terminal for the node.
fn validate_definition(spec: &Spec, r: &mut ValidationResult) {
    if r.is_finished() {
        return;
    }
    if spec.required && r.value().is_none() {
        r.mark_errored(Violation::new("expected value to be defined"));
        return;
    }
    if r.value().is_none() {
        if let Some(default) = &spec.default {
            r.set_value(Some(default.clone()));
        }
    }
    let is_null = matches!(r.value(), Some(Value::Null));
    if is_null && !spec.nullable {
        r.mark_errored(Violation::new("expected value to be non-null"));
        return;
    }
    if is_null || r.value().is_none() {
        r.set_finished(true);
    }
}
