//! # conform-std — Builtin Types for the Conform Engine
//!
//! The standard extension: the six builtin types (`string`, `number`,
//! `boolean`, `object`, `array`, `date`), their formats, parse coercions,
//! and value validations. Installing it is the normal way to start:
//!
//! ```
//! use serde_json::json;
//!
//! let ctx = conform_std::context().unwrap();
//! let schema = ctx
//!     .model("object")
//!     .unwrap()
//!     .children(conform_core::ChildrenInput::Keyed(vec![
//!         ("email".into(), ctx.builder("email").unwrap().required()),
//!         ("age".into(), ctx.model("number").unwrap()),
//!     ]))
//!     .unwrap();
//!
//! let result = schema
//!     .validate(Some(&json!({"email": "a@b.co", "age": "30"})))
//!     .unwrap();
//! assert!(result.conforms());
//! assert_eq!(result.value(), Some(&json!({"email": "a@b.co", "age": 30})));
//! ```
//!
//! ## What the extension registers
//!
//! - **Shape validations** under [`FormatKey::All`] for every type: a
//!   number model rejects non-numbers no matter which format it declares.
//! - **Formats with builders**: `string: email, uuid`, `number: integer`,
//!   `date: iso8601`. Each seeds `Context::builder`.
//! - **Parse coercions**: numeric strings become numbers, `"true"`/`"false"`
//!   become booleans, and RFC 3339 date-times normalize to UTC.
//! - **Spec defaults**: models start optional, non-nullable, non-strict.
//! - The `between` extension method and the `trimmed` context factory.

use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use conform_core::{
    CheckError, CoercionFn, Context, ContextFn, Extension, FormatKey, MethodFn, Model, Phase,
    SchemaError, SpecDefaults, ValidationResult, ValidationRule, Violation,
};

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";
const UUID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

/// A context with the standard extension installed.
///
/// # Errors
///
/// Propagates [`extension`] build errors and registry merge errors.
pub fn context() -> Result<Context, SchemaError> {
    let mut ctx = Context::new();
    ctx.use_extension(extension()?)?;
    Ok(ctx)
}

/// The standard extension bundle.
///
/// # Errors
///
/// `SchemaError::InvalidPattern` if a builtin pattern fails to compile.
pub fn extension() -> Result<Extension, SchemaError> {
    Ok(Extension::new()
        .with_type("string")
        .with_type("number")
        .with_type("boolean")
        .with_type("object")
        .with_type("array")
        .with_type("date")
        .with_validation("string", FormatKey::All, shape("a string", Value::is_string))
        .with_validation("number", FormatKey::All, shape("a number", Value::is_number))
        .with_validation(
            "boolean",
            FormatKey::All,
            shape("a boolean", Value::is_boolean),
        )
        .with_validation("object", FormatKey::All, shape("an object", Value::is_object))
        .with_validation("array", FormatKey::All, shape("an array", Value::is_array))
        .with_validation("date", FormatKey::All, shape("a string", Value::is_string))
        .with_formats("string", &["email", "uuid"], true)
        .with_formats("number", &["integer"], true)
        .with_formats("date", &["iso8601"], true)
        .with_validation(
            "string",
            FormatKey::Named("email".into()),
            ValidationRule::pattern(EMAIL_PATTERN)?,
        )
        .with_validation(
            "string",
            FormatKey::Named("uuid".into()),
            ValidationRule::pattern(UUID_PATTERN)?,
        )
        .with_validation(
            "number",
            FormatKey::Named("integer".into()),
            integer_rule(),
        )
        // The RFC 3339 check runs for bare date models (fallback) and for
        // the named format alike.
        .with_validation("date", FormatKey::Fallback, rfc3339_rule())
        .with_validation("date", FormatKey::Named("iso8601".into()), rfc3339_rule())
        .with_coercion("number", FormatKey::All, Phase::Parse, numeric_string())
        .with_coercion("boolean", FormatKey::All, Phase::Parse, boolean_string())
        .with_coercion("date", FormatKey::All, Phase::Parse, normalize_rfc3339())
        .with_defaults(SpecDefaults {
            required: Some(false),
            nullable: Some(false),
            strict: Some(false),
            ..Default::default()
        })
        .with_method("between", between_method())
        .with_context_factory("trimmed", trimmed_factory()))
}

/// A type-shape predicate: missing values pass (definition checks own
/// those), anything present must satisfy `check`.
fn shape(label: &'static str, check: fn(&Value) -> bool) -> ValidationRule {
    ValidationRule::predicate(move |r: &mut ValidationResult| match r.value() {
        Some(v) if check(v) => Ok(()),
        Some(v) => Err(CheckError::Violation(
            Violation::new(format!("expected value to be {label}")).with_actual(v.clone()),
        )),
        None => Ok(()),
    })
}

fn integer_rule() -> ValidationRule {
    ValidationRule::predicate(|r: &mut ValidationResult| match r.value() {
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(()),
        Some(Value::Number(n)) => Err(CheckError::Violation(
            Violation::new("expected value to be an integer").with_actual(Value::Number(n.clone())),
        )),
        // Non-numbers are the shape validation's to report.
        _ => Ok(()),
    })
}

fn rfc3339_rule() -> ValidationRule {
    ValidationRule::predicate(|r: &mut ValidationResult| match r.value() {
        Some(Value::String(s)) if DateTime::parse_from_rfc3339(s).is_ok() => Ok(()),
        Some(Value::String(s)) => Err(CheckError::Violation(
            Violation::new("expected value to be an RFC 3339 date-time")
                .with_actual(Value::String(s.clone())),
        )),
        _ => Ok(()),
    })
}

/// Parse-phase coercion turning numeric strings into numbers. Integer text
/// stays integral; anything unparseable is left alone.
fn numeric_string() -> CoercionFn {
    Rc::new(|r: &mut ValidationResult| {
        let parsed = match r.value() {
            Some(Value::String(s)) => {
                let text = s.trim();
                text.parse::<i64>()
                    .ok()
                    .map(serde_json::Number::from)
                    .or_else(|| {
                        text.parse::<f64>()
                            .ok()
                            .filter(|f| f.is_finite())
                            .and_then(serde_json::Number::from_f64)
                    })
            }
            _ => None,
        };
        if let Some(n) = parsed {
            r.set_value(Some(Value::Number(n)));
        }
        Ok(())
    })
}

/// Parse-phase coercion turning the exact strings `"true"` and `"false"`
/// into booleans.
fn boolean_string() -> CoercionFn {
    Rc::new(|r: &mut ValidationResult| {
        let parsed = match r.value() {
            Some(Value::String(s)) if s == "true" => Some(true),
            Some(Value::String(s)) if s == "false" => Some(false),
            _ => None,
        };
        if let Some(b) = parsed {
            r.set_value(Some(Value::Bool(b)));
        }
        Ok(())
    })
}

/// Parse-phase coercion normalizing any RFC 3339 date-time string to UTC
/// with seconds precision and a `Z` suffix.
fn normalize_rfc3339() -> CoercionFn {
    Rc::new(|r: &mut ValidationResult| {
        let normalized = match r.value() {
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s).ok().map(|dt| {
                dt.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Secs, true)
            }),
            _ => None,
        };
        if let Some(s) = normalized {
            r.set_value(Some(Value::String(s)));
        }
        Ok(())
    })
}

/// `model.call("between", &[lo, hi])`: inclusive numeric/length bounds.
fn between_method() -> MethodFn {
    Rc::new(|model: Model, args: &[Value]| {
        let bounds = (
            args.first().and_then(Value::as_f64),
            args.get(1).and_then(Value::as_f64),
        );
        let (Some(lo), Some(hi)) = bounds else {
            return Err(SchemaError::MethodArgs {
                method: "between".to_string(),
                reason: "expected two numeric arguments".to_string(),
            });
        };
        Ok(model.min(lo).max(hi))
    })
}

/// `ctx.factory("trimmed")`: a string model whose parse phase strips
/// surrounding whitespace.
fn trimmed_factory() -> ContextFn {
    Rc::new(|ctx: &Context| {
        let trim: CoercionFn = Rc::new(|r: &mut ValidationResult| {
            let stripped = match r.value() {
                Some(Value::String(s)) => Some(s.trim().to_string()),
                _ => None,
            };
            if let Some(s) = stripped {
                r.set_value(Some(Value::String(s)));
            }
            Ok(())
        });
        Ok(ctx.model("string")?.coerce(Phase::Parse, trim))
    })
}
